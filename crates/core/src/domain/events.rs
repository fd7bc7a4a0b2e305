use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::quote::{QuoteId, QuoteStatus};
use crate::errors::CoreError;

/// What a workflow event records. The event log is append-only and written in
/// the same transaction as the state change it describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowAction {
    Submit,
    Approve,
    Reject,
    Fallback,
    Void,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "SUBMIT",
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
            Self::Fallback => "FALLBACK",
            Self::Void => "VOID",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "SUBMIT" => Ok(Self::Submit),
            "APPROVE" => Ok(Self::Approve),
            "REJECT" => Ok(Self::Reject),
            "FALLBACK" => Ok(Self::Fallback),
            "VOID" => Ok(Self::Void),
            other => Err(CoreError::validation(format!("unknown workflow action `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub quote_id: QuoteId,
    pub operator_id: String,
    pub action: WorkflowAction,
    pub previous_status: QuoteStatus,
    pub current_status: QuoteStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectorChangeEvent {
    pub quote_id: QuoteId,
    pub from_user_id: Option<String>,
    pub to_user_id: String,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}
