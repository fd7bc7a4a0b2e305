use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::quote::QuoteId;
use crate::errors::CoreError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoidApplicationId(pub String);

/// Audit decisions are a closed set; there is no invalid-string path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditDecision {
    Pass,
    Reject,
}

impl AuditDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Reject => "REJECT",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "PASS" => Ok(Self::Pass),
            "REJECT" => Ok(Self::Reject),
            other => Err(CoreError::validation(format!("unknown audit decision `{other}`"))),
        }
    }
}

/// A collector's request to cancel a confirmed quote, reviewed by finance.
/// At most one application per quote may be under review at a time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoidApplication {
    pub id: VoidApplicationId,
    pub quote_id: QuoteId,
    pub applicant_id: String,
    pub apply_reason: String,
    pub apply_time: DateTime<Utc>,
    pub attachment_urls: Vec<String>,
    pub auditor_id: Option<String>,
    pub audit_time: Option<DateTime<Utc>>,
    pub audit_result: Option<AuditDecision>,
    pub audit_note: Option<String>,
}

impl VoidApplication {
    pub fn is_audited(&self) -> bool {
        self.audit_result.is_some()
    }
}
