//! Contract price resolution.
//!
//! Pure functions over already-loaded contract data; no side effects and no
//! writes. The persistence layer loads a customer's headers and delegates
//! here.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::contract::{ContractId, ContractPriceHeader};
use crate::domain::quote::{Currency, ExpenseType};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceStrategy {
    LowestPrice,
    Priority,
}

impl PriceStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowestPrice => "LOWEST_PRICE",
            Self::Priority => "PRIORITY",
        }
    }
}

/// Audit trail of where a suggestion came from. Serialized to JSON and kept
/// on the quote line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSourceInfo {
    pub contract_id: ContractId,
    pub strategy: PriceStrategy,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceSuggestion {
    pub price: Decimal,
    pub currency: Currency,
    pub source: PriceSourceInfo,
}

struct Candidate<'a> {
    header: &'a ContractPriceHeader,
    price: Decimal,
    currency: Currency,
}

/// Suggest a unit price for `expense_type` from the customer's contract
/// price books valid on `as_of`.
///
/// `PLATFORM` lines take the lowest price on offer; every other expense type
/// takes the highest-priority contract, ties broken by the earliest
/// effective date. No candidate means the caller must price manually.
pub fn suggest(
    headers: &[ContractPriceHeader],
    as_of: NaiveDate,
    expense_type: ExpenseType,
) -> Option<PriceSuggestion> {
    let mut candidates: Vec<Candidate<'_>> = Vec::new();
    for header in headers {
        if !header.covers(as_of) {
            continue;
        }
        for item in &header.items {
            if item.expense_type == expense_type {
                candidates.push(Candidate { header, price: item.unit_price, currency: item.currency });
            }
        }
    }

    let strategy = match expense_type {
        ExpenseType::Platform => PriceStrategy::LowestPrice,
        _ => PriceStrategy::Priority,
    };

    let best = match strategy {
        PriceStrategy::LowestPrice => candidates.into_iter().min_by(|a, b| {
            a.price
                .cmp(&b.price)
                .then(b.header.priority.cmp(&a.header.priority))
                .then(a.header.effective_date.cmp(&b.header.effective_date))
        }),
        PriceStrategy::Priority => candidates.into_iter().min_by(|a, b| {
            b.header
                .priority
                .cmp(&a.header.priority)
                .then(a.header.effective_date.cmp(&b.header.effective_date))
        }),
    }?;

    Some(PriceSuggestion {
        price: best.price,
        currency: best.currency,
        source: PriceSourceInfo {
            contract_id: best.header.id.clone(),
            strategy,
        },
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use crate::domain::contract::{ContractPriceItem, ContractStatus};
    use crate::domain::quote::{Currency, ExpenseType};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn header(
        id: &str,
        priority: i32,
        price_cents: i64,
        expense_type: ExpenseType,
    ) -> ContractPriceHeader {
        ContractPriceHeader {
            id: ContractId(id.to_string()),
            customer_id: "cust-1".to_string(),
            name: format!("contract {id}"),
            priority,
            effective_date: date(2026, 1, 1),
            expiration_date: None,
            status: ContractStatus::Active,
            items: vec![ContractPriceItem {
                expense_type,
                unit_price: Decimal::new(price_cents, 2),
                currency: Currency::Cny,
            }],
        }
    }

    #[test]
    fn platform_takes_the_lowest_price() {
        let headers = vec![
            header("c-a", 10, 10000, ExpenseType::Platform),
            header("c-b", 1, 5000, ExpenseType::Platform),
        ];
        let suggestion =
            suggest(&headers, date(2026, 6, 1), ExpenseType::Platform).expect("candidates exist");
        assert_eq!(suggestion.price, Decimal::new(5000, 2));
        assert_eq!(suggestion.source.contract_id.0, "c-b");
        assert_eq!(suggestion.source.strategy, PriceStrategy::LowestPrice);
    }

    #[test]
    fn other_types_take_the_highest_priority() {
        let headers = vec![
            header("c-a", 10, 10000, ExpenseType::Repair),
            header("c-b", 1, 5000, ExpenseType::Repair),
        ];
        let suggestion =
            suggest(&headers, date(2026, 6, 1), ExpenseType::Repair).expect("candidates exist");
        assert_eq!(suggestion.price, Decimal::new(10000, 2));
        assert_eq!(suggestion.source.contract_id.0, "c-a");
        assert_eq!(suggestion.source.strategy, PriceStrategy::Priority);
    }

    #[test]
    fn priority_ties_break_on_earliest_effective_date() {
        let mut older = header("c-old", 5, 7000, ExpenseType::Shipping);
        older.effective_date = date(2025, 3, 1);
        let newer = header("c-new", 5, 9000, ExpenseType::Shipping);
        let suggestion = suggest(&[newer, older], date(2026, 6, 1), ExpenseType::Shipping)
            .expect("candidates exist");
        assert_eq!(suggestion.source.contract_id.0, "c-old");
        assert_eq!(suggestion.price, Decimal::new(7000, 2));
    }

    #[test]
    fn expired_and_inactive_headers_are_skipped() {
        let mut expired = header("c-expired", 10, 1000, ExpenseType::Repair);
        expired.expiration_date = Some(date(2026, 2, 1));
        let mut inactive = header("c-inactive", 20, 2000, ExpenseType::Repair);
        inactive.status = ContractStatus::Inactive;
        let live = header("c-live", 1, 8000, ExpenseType::Repair);

        let suggestion = suggest(&[expired, inactive, live], date(2026, 6, 1), ExpenseType::Repair)
            .expect("one live candidate");
        assert_eq!(suggestion.source.contract_id.0, "c-live");
    }

    #[test]
    fn not_yet_effective_headers_are_skipped() {
        let mut future = header("c-future", 10, 1000, ExpenseType::Repair);
        future.effective_date = date(2026, 12, 1);
        assert!(suggest(&[future], date(2026, 6, 1), ExpenseType::Repair).is_none());
    }

    #[test]
    fn no_candidates_means_manual_pricing() {
        let headers = vec![header("c-a", 10, 10000, ExpenseType::Repair)];
        assert!(suggest(&headers, date(2026, 6, 1), ExpenseType::Platform).is_none());
    }

    #[test]
    fn source_info_serializes_for_audit() {
        let info = PriceSourceInfo {
            contract_id: ContractId("c-a".to_string()),
            strategy: PriceStrategy::LowestPrice,
        };
        let json = serde_json::to_string(&info).expect("serializable");
        assert!(json.contains("LOWEST_PRICE"));
        assert!(json.contains("contractId"));
    }
}
