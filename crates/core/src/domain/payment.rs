use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quote::{Currency, QuoteId};
use crate::domain::statement::StatementId;
use crate::errors::CoreError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Draft,
    Confirmed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "DRAFT" => Ok(Self::Draft),
            "CONFIRMED" => Ok(Self::Confirmed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(CoreError::validation(format!("unknown payment status `{other}`"))),
        }
    }
}

/// How a confirmation handles an allocation that would push a quote past its
/// item total. `Reject` fails the whole confirmation atomically;
/// `CreateBalance` carries the excess forward as a balance quote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverpaymentStrategy {
    Reject,
    CreateBalance,
}

/// The portion of one payment applied to one quote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub quote_id: QuoteId,
    pub allocated_amount: Decimal,
    pub period: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub payment_no: String,
    pub customer_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub received_at: NaiveDate,
    pub status: PaymentStatus,
    pub statement_id: Option<StatementId>,
    pub allocations: Vec<PaymentAllocation>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Creation-time invariant: the payment amount equals the allocation sum
    /// exactly. Fixed-point comparison, no rounding tolerance.
    pub fn check_allocation_sum(
        amount: Decimal,
        allocations: &[PaymentAllocation],
    ) -> Result<(), CoreError> {
        if allocations.is_empty() {
            return Err(CoreError::validation("at least one allocation is required"));
        }
        let sum: Decimal = allocations.iter().map(|a| a.allocated_amount).sum();
        if sum != amount {
            return Err(CoreError::validation(format!(
                "payment amount must equal sum of allocations; got payment={amount}, sum={sum}"
            )));
        }
        Ok(())
    }
}
