//! Document number formats.
//!
//! Sequence state lives in the database (one row per operator per month for
//! quotes, one counter per day for statements); only the formatting rules
//! live here.

use chrono::NaiveDate;

use crate::domain::quote::QuoteSourceType;

/// Scope key for the quote sequence: same operator + same month share a
/// counter, a new month resets it, different operators never collide.
pub fn quote_sequence_scope(operator: &str, date: NaiveDate) -> (String, String) {
    let operator = if operator.trim().is_empty() { "sys" } else { operator.trim() };
    (operator.to_string(), date.format("%y%m").to_string())
}

/// Quote number: source prefix + operator + YYMMDD + 3-digit sequence.
pub fn quote_no(source: QuoteSourceType, operator: &str, date: NaiveDate, seq: u32) -> String {
    let operator = if operator.trim().is_empty() { "sys" } else { operator.trim() };
    format!("{}{}{}{:03}", source.prefix(), operator, date.format("%y%m%d"), seq)
}

/// Statement number: `ST-YYYYMMDD-###`, sequence scoped per day.
pub fn statement_no(date: NaiveDate, seq: u32) -> String {
    format!("ST-{}-{:03}", date.format("%Y%m%d"), seq)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::domain::quote::QuoteSourceType;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn quote_no_layout() {
        let no = quote_no(QuoteSourceType::Manual, "alice", date(2026, 1, 9), 7);
        assert_eq!(no, "BJalice260109007");
        let no = quote_no(QuoteSourceType::WorkOrder, "bob", date(2026, 12, 31), 123);
        assert_eq!(no, "WObob261231123");
    }

    #[test]
    fn blank_operator_falls_back_to_sys() {
        let no = quote_no(QuoteSourceType::Manual, "  ", date(2026, 1, 9), 1);
        assert!(no.starts_with("BJsys"));
        let (operator, _) = quote_sequence_scope("", date(2026, 1, 9));
        assert_eq!(operator, "sys");
    }

    #[test]
    fn sequence_scope_is_per_operator_per_month() {
        let (op_a, ym_a) = quote_sequence_scope("alice", date(2026, 1, 9));
        let (op_b, ym_b) = quote_sequence_scope("alice", date(2026, 2, 1));
        assert_eq!(op_a, op_b);
        assert_ne!(ym_a, ym_b);

        let (op_c, ym_c) = quote_sequence_scope("bob", date(2026, 1, 20));
        assert_ne!(op_a, op_c);
        assert_eq!(ym_a, ym_c);
    }

    #[test]
    fn statement_no_layout() {
        assert_eq!(statement_no(date(2026, 3, 5), 12), "ST-20260305-012");
    }
}
