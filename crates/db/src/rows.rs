//! Row-to-domain mapping. Decimals travel as TEXT and timestamps as RFC 3339
//! TEXT; every decode failure is a `ServiceError::Decode` naming the field.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use settly_core::domain::contract::{ContractId, ContractPriceHeader, ContractStatus};
use settly_core::domain::events::{CollectorChangeEvent, WorkflowAction, WorkflowEvent};
use settly_core::domain::payment::{Payment, PaymentAllocation, PaymentId, PaymentStatus};
use settly_core::domain::quote::{
    Currency, DownstreamType, ExpenseType, Quote, QuoteId, QuoteItem, QuoteItemId,
    QuotePaymentStatus, QuoteSourceType, QuoteStatus, VoidStatus,
};
use settly_core::domain::statement::{
    AccountStatement, AccountStatementItem, StatementId, StatementStatus,
};
use settly_core::domain::void::{AuditDecision, VoidApplication, VoidApplicationId};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::services::ServiceError;

pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Decimal, ServiceError> {
    Decimal::from_str(value)
        .map_err(|error| ServiceError::Decode(format!("{field}: invalid decimal `{value}`: {error}")))
}

pub(crate) fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, ServiceError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| {
            ServiceError::Decode(format!("{field}: invalid timestamp `{value}`: {error}"))
        })
}

pub(crate) fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ServiceError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|error| ServiceError::Decode(format!("{field}: invalid date `{value}`: {error}")))
}

fn optional_decimal(field: &str, value: Option<String>) -> Result<Option<Decimal>, ServiceError> {
    value.map(|text| parse_decimal(field, &text)).transpose()
}

fn optional_timestamp(
    field: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, ServiceError> {
    value.map(|text| parse_timestamp(field, &text)).transpose()
}

pub(crate) fn quote_from_row(row: &SqliteRow) -> Result<Quote, ServiceError> {
    Ok(Quote {
        id: QuoteId(row.get::<String, _>("id")),
        quote_no: row.get::<String, _>("quote_no"),
        status: QuoteStatus::parse(&row.get::<String, _>("status"))?,
        source_type: QuoteSourceType::parse(&row.get::<String, _>("source_type"))?,
        source_ref_id: row.get::<Option<String>, _>("source_ref_id"),
        customer_id: row.get::<Option<String>, _>("customer_id"),
        customer_name: row.get::<Option<String>, _>("customer_name"),
        currency: Currency::parse(&row.get::<String, _>("currency"))?,
        recipient: row.get::<Option<String>, _>("recipient"),
        phone: row.get::<Option<String>, _>("phone"),
        address: row.get::<Option<String>, _>("address"),
        assignee_id: row.get::<Option<String>, _>("assignee_id"),
        collector_id: row.get::<Option<String>, _>("collector_id"),
        customer_confirmer_id: row.get::<Option<String>, _>("customer_confirmer_id"),
        first_submission_time: optional_timestamp(
            "first_submission_time",
            row.get::<Option<String>, _>("first_submission_time"),
        )?,
        paid_amount: parse_decimal("paid_amount", &row.get::<String, _>("paid_amount"))?,
        payment_status: QuotePaymentStatus::parse(&row.get::<String, _>("payment_status"))?,
        void_status: VoidStatus::parse(&row.get::<String, _>("void_status"))?,
        downstream_type: row
            .get::<Option<String>, _>("downstream_type")
            .as_deref()
            .map(DownstreamType::parse)
            .transpose()?,
        downstream_id: row.get::<Option<String>, _>("downstream_id"),
        parent_quote_id: row.get::<Option<String>, _>("parent_quote_id").map(QuoteId),
        version: row.get::<i64, _>("version"),
        created_at: parse_timestamp("created_at", &row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp("updated_at", &row.get::<String, _>("updated_at"))?,
    })
}

pub(crate) fn quote_item_from_row(row: &SqliteRow) -> Result<QuoteItem, ServiceError> {
    let quantity = row.get::<i64, _>("quantity");
    Ok(QuoteItem {
        id: QuoteItemId(row.get::<String, _>("id")),
        quote_id: QuoteId(row.get::<String, _>("quote_id")),
        line_order: row.get::<i32, _>("line_order"),
        expense_type: ExpenseType::parse(&row.get::<String, _>("expense_type"))?,
        description: row.get::<Option<String>, _>("description"),
        quantity: u32::try_from(quantity)
            .map_err(|_| ServiceError::Decode(format!("quantity: out of range `{quantity}`")))?,
        unit_price: parse_decimal("unit_price", &row.get::<String, _>("unit_price"))?,
        standard_price: optional_decimal(
            "standard_price",
            row.get::<Option<String>, _>("standard_price"),
        )?,
        is_price_deviated: row.get::<i64, _>("is_price_deviated") != 0,
        amount: parse_decimal("amount", &row.get::<String, _>("amount"))?,
        manual_price_reason: row.get::<Option<String>, _>("manual_price_reason"),
        price_source_info: row.get::<Option<String>, _>("price_source_info"),
    })
}

pub(crate) fn contract_header_from_row(row: &SqliteRow) -> Result<ContractPriceHeader, ServiceError> {
    Ok(ContractPriceHeader {
        id: ContractId(row.get::<String, _>("id")),
        customer_id: row.get::<String, _>("customer_id"),
        name: row.get::<String, _>("name"),
        priority: row.get::<i32, _>("priority"),
        effective_date: parse_date("effective_date", &row.get::<String, _>("effective_date"))?,
        expiration_date: row
            .get::<Option<String>, _>("expiration_date")
            .as_deref()
            .map(|text| parse_date("expiration_date", text))
            .transpose()?,
        status: ContractStatus::parse(&row.get::<String, _>("status"))?,
        items: Vec::new(),
    })
}

pub(crate) fn payment_from_row(row: &SqliteRow) -> Result<Payment, ServiceError> {
    Ok(Payment {
        id: PaymentId(row.get::<String, _>("id")),
        payment_no: row.get::<String, _>("payment_no"),
        customer_id: row.get::<String, _>("customer_id"),
        amount: parse_decimal("amount", &row.get::<String, _>("amount"))?,
        currency: Currency::parse(&row.get::<String, _>("currency"))?,
        received_at: parse_date("received_at", &row.get::<String, _>("received_at"))?,
        status: PaymentStatus::parse(&row.get::<String, _>("status"))?,
        statement_id: row.get::<Option<String>, _>("statement_id").map(StatementId),
        allocations: Vec::new(),
        created_at: parse_timestamp("created_at", &row.get::<String, _>("created_at"))?,
    })
}

pub(crate) fn allocation_from_row(row: &SqliteRow) -> Result<PaymentAllocation, ServiceError> {
    Ok(PaymentAllocation {
        quote_id: QuoteId(row.get::<String, _>("quote_id")),
        allocated_amount: parse_decimal(
            "allocated_amount",
            &row.get::<String, _>("allocated_amount"),
        )?,
        period: row.get::<Option<String>, _>("period"),
    })
}

pub(crate) fn statement_from_row(row: &SqliteRow) -> Result<AccountStatement, ServiceError> {
    Ok(AccountStatement {
        id: StatementId(row.get::<String, _>("id")),
        statement_no: row.get::<String, _>("statement_no"),
        customer_id: row.get::<String, _>("customer_id"),
        customer_name: row.get::<Option<String>, _>("customer_name"),
        currency: Currency::parse(&row.get::<String, _>("currency"))?,
        total_amount: parse_decimal("total_amount", &row.get::<String, _>("total_amount"))?,
        status: StatementStatus::parse(&row.get::<String, _>("status"))?,
        payment_id: row.get::<Option<String>, _>("payment_id").map(PaymentId),
        creator_id: row.get::<String, _>("creator_id"),
        created_at: parse_timestamp("created_at", &row.get::<String, _>("created_at"))?,
    })
}

pub(crate) fn statement_item_from_row(
    row: &SqliteRow,
) -> Result<AccountStatementItem, ServiceError> {
    Ok(AccountStatementItem {
        statement_id: StatementId(row.get::<String, _>("statement_id")),
        quote_id: QuoteId(row.get::<String, _>("quote_id")),
        quote_no: row.get::<String, _>("quote_no"),
        quote_total: parse_decimal("quote_total", &row.get::<String, _>("quote_total"))?,
        quote_paid: parse_decimal("quote_paid", &row.get::<String, _>("quote_paid"))?,
        quote_unpaid: parse_decimal("quote_unpaid", &row.get::<String, _>("quote_unpaid"))?,
    })
}

pub(crate) fn workflow_event_from_row(row: &SqliteRow) -> Result<WorkflowEvent, ServiceError> {
    Ok(WorkflowEvent {
        quote_id: QuoteId(row.get::<String, _>("quote_id")),
        operator_id: row.get::<String, _>("operator_id"),
        action: WorkflowAction::parse(&row.get::<String, _>("action"))?,
        previous_status: QuoteStatus::parse(&row.get::<String, _>("previous_status"))?,
        current_status: QuoteStatus::parse(&row.get::<String, _>("current_status"))?,
        reason: row.get::<Option<String>, _>("reason"),
        created_at: parse_timestamp("created_at", &row.get::<String, _>("created_at"))?,
    })
}

pub(crate) fn collector_event_from_row(
    row: &SqliteRow,
) -> Result<CollectorChangeEvent, ServiceError> {
    Ok(CollectorChangeEvent {
        quote_id: QuoteId(row.get::<String, _>("quote_id")),
        from_user_id: row.get::<Option<String>, _>("from_user_id"),
        to_user_id: row.get::<String, _>("to_user_id"),
        changed_by: row.get::<String, _>("changed_by"),
        changed_at: parse_timestamp("changed_at", &row.get::<String, _>("changed_at"))?,
    })
}

pub(crate) fn void_application_from_row(row: &SqliteRow) -> Result<VoidApplication, ServiceError> {
    let urls_json = row.get::<String, _>("attachment_urls");
    let attachment_urls: Vec<String> = serde_json::from_str(&urls_json).map_err(|error| {
        ServiceError::Decode(format!("attachment_urls: invalid json `{urls_json}`: {error}"))
    })?;
    Ok(VoidApplication {
        id: VoidApplicationId(row.get::<String, _>("id")),
        quote_id: QuoteId(row.get::<String, _>("quote_id")),
        applicant_id: row.get::<String, _>("applicant_id"),
        apply_reason: row.get::<String, _>("apply_reason"),
        apply_time: parse_timestamp("apply_time", &row.get::<String, _>("apply_time"))?,
        attachment_urls,
        auditor_id: row.get::<Option<String>, _>("auditor_id"),
        audit_time: optional_timestamp("audit_time", row.get::<Option<String>, _>("audit_time"))?,
        audit_result: row
            .get::<Option<String>, _>("audit_result")
            .as_deref()
            .map(AuditDecision::parse)
            .transpose()?,
        audit_note: row.get::<Option<String>, _>("audit_note"),
    })
}
