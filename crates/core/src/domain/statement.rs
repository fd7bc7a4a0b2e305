use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::payment::PaymentId;
use crate::domain::quote::{Currency, QuoteId};
use crate::errors::CoreError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementStatus {
    Pending,
    Reconciled,
}

impl StatementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Reconciled => "RECONCILED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "RECONCILED" => Ok(Self::Reconciled),
            other => Err(CoreError::validation(format!("unknown statement status `{other}`"))),
        }
    }
}

/// One included quote, with the amounts frozen at generation time. These are
/// point-in-time financial snapshots and never change when the source quote
/// later changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountStatementItem {
    pub statement_id: StatementId,
    pub quote_id: QuoteId,
    pub quote_no: String,
    pub quote_total: Decimal,
    pub quote_paid: Decimal,
    pub quote_unpaid: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountStatement {
    pub id: StatementId,
    pub statement_no: String,
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub currency: Currency,
    pub total_amount: Decimal,
    pub status: StatementStatus,
    pub payment_id: Option<PaymentId>,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
}

/// Statement total is the sum of the included quote totals, recomputed
/// whenever the item set changes.
pub fn statement_total(items: &[AccountStatementItem]) -> Decimal {
    items.iter().map(|item| item.quote_total).sum()
}
