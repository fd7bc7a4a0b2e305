#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use settly_core::domain::contract::ContractPriceItem;
use settly_core::domain::quote::{Currency, ExpenseType, Quote, QuoteSourceType};
use settly_core::domain::void::AuditDecision;
use settly_core::errors::CoreError;
use settly_core::ports::{CustomerDirectory, InMemoryNotificationSink, StandardAttachmentRules};
use settly_db::services::PriceBookCommand;
use settly_db::{
    connect_with_settings, migrations, ContractPriceBook, CreateDraftCommand, DbPool, ItemCommand,
    PaymentService, QuoteService, QuoteVoidService, QuoteWorkflowService, ServiceError,
    StatementService,
};

pub const CUSTOMER: &str = "cust-1";
pub const COLLECTOR: &str = "collector-1";
pub const FINANCE: &str = "finance-1";

/// Directory that knows every customer by a predictable display name.
pub struct TestCustomerDirectory;

impl CustomerDirectory for TestCustomerDirectory {
    fn resolve_name(&self, customer_id: &str) -> Option<String> {
        Some(format!("customer {customer_id}"))
    }

    fn exists(&self, _customer_id: &str) -> bool {
        true
    }
}

pub struct TestEnv {
    pub pool: DbPool,
    pub quotes: QuoteService,
    pub workflow: QuoteWorkflowService,
    pub voids: QuoteVoidService,
    pub payments: PaymentService,
    pub statements: StatementService,
    pub contracts: ContractPriceBook,
    pub sink: Arc<InMemoryNotificationSink>,
}

pub async fn env() -> TestEnv {
    // A single pooled connection keeps every service on the same in-memory
    // database.
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("run migrations");

    let directory = Arc::new(TestCustomerDirectory);
    let sink = Arc::new(InMemoryNotificationSink::default());

    TestEnv {
        quotes: QuoteService::new(pool.clone(), directory.clone()),
        workflow: QuoteWorkflowService::new(pool.clone(), sink.clone(), FINANCE),
        voids: QuoteVoidService::new(
            pool.clone(),
            Arc::new(StandardAttachmentRules),
            sink.clone(),
        ),
        payments: PaymentService::new(pool.clone()),
        statements: StatementService::new(pool.clone(), directory),
        contracts: ContractPriceBook::new(pool.clone()),
        sink,
        pool,
    }
}

pub fn draft_cmd(customer_id: &str) -> CreateDraftCommand {
    CreateDraftCommand {
        source_type: QuoteSourceType::Manual,
        source_ref_id: None,
        customer_id: Some(customer_id.to_string()),
        customer_name: None,
        currency: Currency::Cny,
        recipient: None,
        phone: None,
        address: None,
        assignee_id: Some("assignee-1".to_string()),
        collector_id: Some(COLLECTOR.to_string()),
    }
}

pub fn manual_item(price_cents: i64, quantity: u32) -> ItemCommand {
    ItemCommand {
        expense_type: ExpenseType::Repair,
        description: Some("bench repair".to_string()),
        quantity,
        unit_price: Some(Decimal::new(price_cents, 2)),
        manual_price_reason: None,
    }
}

/// Draft with one manual line, pushed through submission and finance approval.
pub async fn confirmed_quote(env: &TestEnv, customer_id: &str, price_cents: i64) -> Quote {
    let quote = env.quotes.create_draft(draft_cmd(customer_id), "alice").await.expect("draft");
    env.quotes.add_item(&quote.id, manual_item(price_cents, 1)).await.expect("item");
    env.workflow.submit(&quote.id, "alice", "confirmer-1").await.expect("submit");
    env.workflow
        .finance_audit(&quote.id, FINANCE, AuditDecision::Pass, None, None)
        .await
        .expect("approve")
}

pub fn price_book(customer_id: &str, priority: i32, items: Vec<ContractPriceItem>) -> PriceBookCommand {
    PriceBookCommand {
        customer_id: customer_id.to_string(),
        name: format!("price book p{priority}"),
        priority,
        effective_date: NaiveDate::from_ymd_opt(2020, 1, 1).expect("date"),
        expiration_date: None,
        items,
    }
}

pub fn price_item(expense_type: ExpenseType, cents: i64) -> ContractPriceItem {
    ContractPriceItem {
        expense_type,
        unit_price: Decimal::new(cents, 2),
        currency: Currency::Cny,
    }
}

pub fn assert_validation(error: &ServiceError) {
    assert!(
        matches!(error.as_domain(), Some(CoreError::Validation(_))),
        "expected validation error, got {error:?}"
    );
}

pub fn assert_not_found(error: &ServiceError) {
    assert!(
        matches!(error.as_domain(), Some(CoreError::NotFound(_))),
        "expected not-found error, got {error:?}"
    );
}

pub fn assert_state_conflict(error: &ServiceError) {
    assert!(
        matches!(error.as_domain(), Some(CoreError::StateConflict(_))),
        "expected state-conflict error, got {error:?}"
    );
}

pub fn assert_permission(error: &ServiceError) {
    assert!(
        matches!(error.as_domain(), Some(CoreError::Permission(_))),
        "expected permission error, got {error:?}"
    );
}
