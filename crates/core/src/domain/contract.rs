use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quote::{Currency, ExpenseType};
use crate::errors::CoreError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Active,
    Inactive,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            other => Err(CoreError::validation(format!("unknown contract status `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractPriceItem {
    pub expense_type: ExpenseType,
    pub unit_price: Decimal,
    pub currency: Currency,
}

/// A customer-specific price book with a priority and a validity window.
/// Multiple headers may apply to the same customer at once; the resolver in
/// `pricing` decides which one wins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractPriceHeader {
    pub id: ContractId,
    pub customer_id: String,
    pub name: String,
    pub priority: i32,
    pub effective_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub status: ContractStatus,
    pub items: Vec<ContractPriceItem>,
}

impl ContractPriceHeader {
    pub fn covers(&self, as_of: NaiveDate) -> bool {
        if self.status != ContractStatus::Active {
            return false;
        }
        if as_of < self.effective_date {
            return false;
        }
        match self.expiration_date {
            Some(expiry) => as_of <= expiry,
            None => true,
        }
    }
}
