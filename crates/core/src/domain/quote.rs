use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteItemId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStatus {
    Draft,
    ApprovalPending,
    Confirmed,
    Returned,
    Cancelled,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::ApprovalPending => "APPROVAL_PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Returned => "RETURNED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "DRAFT" => Ok(Self::Draft),
            "APPROVAL_PENDING" => Ok(Self::ApprovalPending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "RETURNED" => Ok(Self::Returned),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(CoreError::validation(format!("unknown quote status `{other}`"))),
        }
    }

    /// Draft and Returned quotes are the only editable ones: header fields
    /// and items can change, and submission to finance is allowed.
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft | Self::Returned)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteSourceType {
    Manual,
    WorkOrder,
    Shipment,
}

impl QuoteSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::WorkOrder => "WORK_ORDER",
            Self::Shipment => "SHIPMENT",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "MANUAL" => Ok(Self::Manual),
            "WORK_ORDER" => Ok(Self::WorkOrder),
            "SHIPMENT" => Ok(Self::Shipment),
            other => Err(CoreError::validation(format!("unknown source type `{other}`"))),
        }
    }

    /// Quote number prefix for this source.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Manual => "BJ",
            Self::WorkOrder => "WO",
            Self::Shipment => "SH",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Currency {
    Cny,
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cny => "CNY",
            Self::Usd => "USD",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "CNY" => Ok(Self::Cny),
            "USD" => Ok(Self::Usd),
            other => Err(CoreError::validation(format!("unknown currency `{other}`"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuotePaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

impl QuotePaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "UNPAID",
            Self::Partial => "PARTIAL",
            Self::Paid => "PAID",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "UNPAID" => Ok(Self::Unpaid),
            "PARTIAL" => Ok(Self::Partial),
            "PAID" => Ok(Self::Paid),
            other => Err(CoreError::validation(format!("unknown payment status `{other}`"))),
        }
    }

    /// Derive from the amounts: zero paid is Unpaid, covering the item total
    /// (or exceeding it) is Paid, anything in between is Partial.
    pub fn derive(paid: Decimal, total: Decimal) -> Self {
        if paid <= Decimal::ZERO {
            Self::Unpaid
        } else if paid >= total {
            Self::Paid
        } else {
            Self::Partial
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoidStatus {
    None,
    Applying,
    Voided,
    Rejected,
}

impl VoidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Applying => "APPLYING",
            Self::Voided => "VOIDED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "NONE" => Ok(Self::None),
            "APPLYING" => Ok(Self::Applying),
            "VOIDED" => Ok(Self::Voided),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(CoreError::validation(format!("unknown void status `{other}`"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownstreamType {
    WorkOrder,
    Shipment,
}

impl DownstreamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkOrder => "WORK_ORDER",
            Self::Shipment => "SHIPMENT",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "WORK_ORDER" => Ok(Self::WorkOrder),
            "SHIPMENT" => Ok(Self::Shipment),
            other => Err(CoreError::validation(format!("unknown downstream type `{other}`"))),
        }
    }
}

/// Expense type of a quote line. The fixed set the fee dictionary validates
/// against; `Platform` has its own price-resolution strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseType {
    Platform,
    DataPlan,
    Repair,
    Shipping,
    Parts,
    OnSite,
}

impl ExpenseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Platform => "PLATFORM",
            Self::DataPlan => "DATA_PLAN",
            Self::Repair => "REPAIR",
            Self::Shipping => "SHIPPING",
            Self::Parts => "PARTS",
            Self::OnSite => "ON_SITE",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "PLATFORM" => Ok(Self::Platform),
            "DATA_PLAN" => Ok(Self::DataPlan),
            "REPAIR" => Ok(Self::Repair),
            "SHIPPING" => Ok(Self::Shipping),
            "PARTS" => Ok(Self::Parts),
            "ON_SITE" => Ok(Self::OnSite),
            other => Err(CoreError::validation(format!("unknown expense type `{other}`"))),
        }
    }
}

/// Line amount is always `quantity × unit_price` at two decimal places,
/// never independently settable.
pub fn line_amount(quantity: u32, unit_price: Decimal) -> Decimal {
    (unit_price * Decimal::from(quantity))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteItem {
    pub id: QuoteItemId,
    pub quote_id: QuoteId,
    pub line_order: i32,
    pub expense_type: ExpenseType,
    pub description: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub standard_price: Option<Decimal>,
    pub is_price_deviated: bool,
    pub amount: Decimal,
    pub manual_price_reason: Option<String>,
    pub price_source_info: Option<String>,
}

impl QuoteItem {
    /// Recompute the derived fields after any quantity/price mutation.
    pub fn recompute(&mut self) {
        self.amount = line_amount(self.quantity, self.unit_price);
        self.is_price_deviated = match self.standard_price {
            Some(standard) => standard != self.unit_price,
            None => false,
        };
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub quote_no: String,
    pub status: QuoteStatus,
    pub source_type: QuoteSourceType,
    pub source_ref_id: Option<String>,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub currency: Currency,
    pub recipient: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub assignee_id: Option<String>,
    pub collector_id: Option<String>,
    pub customer_confirmer_id: Option<String>,
    pub first_submission_time: Option<DateTime<Utc>>,
    pub paid_amount: Decimal,
    pub payment_status: QuotePaymentStatus,
    pub void_status: VoidStatus,
    pub downstream_type: Option<DownstreamType>,
    pub downstream_id: Option<String>,
    pub parent_quote_id: Option<QuoteId>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    /// Lifecycle transitions of the approval workflow. Fallback and void
    /// transitions have their own entry points below.
    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        matches!(
            (self.status, next),
            (QuoteStatus::Draft, QuoteStatus::ApprovalPending)
                | (QuoteStatus::Returned, QuoteStatus::ApprovalPending)
                | (QuoteStatus::ApprovalPending, QuoteStatus::Confirmed)
                | (QuoteStatus::ApprovalPending, QuoteStatus::Returned)
                | (QuoteStatus::Confirmed, QuoteStatus::Cancelled)
        )
    }

    pub fn transition_to(&mut self, next: QuoteStatus) -> Result<(), CoreError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }
        Err(CoreError::state_conflict(format!(
            "quote {} cannot move from {} to {}",
            self.quote_no,
            self.status.as_str(),
            next.as_str()
        )))
    }

    /// Logical predecessor used by the fallback operation. Statuses without a
    /// predecessor reject the fallback.
    pub fn fallback_target(&self) -> Result<QuoteStatus, CoreError> {
        match self.status {
            QuoteStatus::ApprovalPending => Ok(QuoteStatus::Draft),
            QuoteStatus::Confirmed => Ok(QuoteStatus::ApprovalPending),
            QuoteStatus::Returned => Ok(QuoteStatus::Draft),
            other => Err(CoreError::state_conflict(format!(
                "fallback not allowed from status {}",
                other.as_str()
            ))),
        }
    }

    /// Mutations are frozen while a void application is under review.
    pub fn ensure_not_frozen(&self) -> Result<(), CoreError> {
        if self.void_status == VoidStatus::Applying {
            return Err(CoreError::state_conflict(format!(
                "quote {} is frozen while a void application is under review",
                self.quote_no
            )));
        }
        Ok(())
    }

    pub fn ensure_editable(&self) -> Result<(), CoreError> {
        self.ensure_not_frozen()?;
        if !self.status.is_editable() {
            return Err(CoreError::state_conflict(format!(
                "quote {} cannot be edited in status {}",
                self.quote_no,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    /// At most one downstream document may ever be created from a confirmed
    /// quote.
    pub fn register_downstream(
        &mut self,
        downstream_type: DownstreamType,
        downstream_id: impl Into<String>,
    ) -> Result<(), CoreError> {
        if self.status != QuoteStatus::Confirmed {
            return Err(CoreError::state_conflict(format!(
                "quote {} must be CONFIRMED before a downstream document is created",
                self.quote_no
            )));
        }
        if self.downstream_id.is_some() {
            return Err(CoreError::state_conflict(format!(
                "quote {} already has a downstream document",
                self.quote_no
            )));
        }
        self.downstream_type = Some(downstream_type);
        self.downstream_id = Some(downstream_id.into());
        Ok(())
    }
}
