mod common;

use rust_decimal::Decimal;
use settly_core::domain::events::WorkflowAction;
use settly_core::domain::quote::{DownstreamType, QuotePaymentStatus, QuoteStatus};
use settly_core::domain::void::AuditDecision;

use common::{confirmed_quote, draft_cmd, env, manual_item, CUSTOMER, FINANCE};

#[tokio::test]
async fn draft_without_items_cannot_be_submitted() {
    let env = env().await;
    let quote = env.quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect("draft");

    let error = env.workflow.submit(&quote.id, "alice", "confirmer-1").await.expect_err("no items");
    common::assert_validation(&error);
}

#[tokio::test]
async fn draft_needs_a_customer() {
    let env = env().await;
    let mut cmd = draft_cmd(CUSTOMER);
    cmd.customer_id = None;
    cmd.customer_name = Some("   ".to_string());

    let error = env.quotes.create_draft(cmd, "alice").await.expect_err("blank customer");
    common::assert_validation(&error);
}

#[tokio::test]
async fn unknown_customer_ids_are_rejected() {
    let env = env().await;
    let quotes = settly_db::QuoteService::new(
        env.pool.clone(),
        std::sync::Arc::new(settly_core::ports::EmptyCustomerDirectory),
    );

    let error = quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect_err("unknown id");
    common::assert_validation(&error);

    let mut cmd = draft_cmd(CUSTOMER);
    cmd.customer_id = None;
    cmd.customer_name = Some("Walk-in Wang".to_string());
    let quote = quotes.create_draft(cmd, "alice").await.expect("name-only draft");
    assert_eq!(quote.customer_name.as_deref(), Some("Walk-in Wang"));
}

#[tokio::test]
async fn submit_and_approve_confirms_the_quote() {
    let env = env().await;
    let quote = env.quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect("draft");
    env.quotes.add_item(&quote.id, manual_item(10000, 2)).await.expect("item");

    let submitted = env.workflow.submit(&quote.id, "alice", "confirmer-1").await.expect("submit");
    assert_eq!(submitted.status, QuoteStatus::ApprovalPending);
    assert!(submitted.first_submission_time.is_some());
    assert_eq!(submitted.customer_confirmer_id.as_deref(), Some("confirmer-1"));

    let confirmed = env
        .workflow
        .finance_audit(&quote.id, FINANCE, AuditDecision::Pass, None, None)
        .await
        .expect("approve");
    assert_eq!(confirmed.status, QuoteStatus::Confirmed);

    let events = env.workflow.workflow_events(&quote.id).await.expect("events");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, WorkflowAction::Approve);
    assert_eq!(events[1].action, WorkflowAction::Submit);
    assert_eq!(events[1].previous_status, QuoteStatus::Draft);
    assert_eq!(events[1].current_status, QuoteStatus::ApprovalPending);

    let sent = env.sink.sent();
    assert!(sent.iter().any(|n| n.user_id == FINANCE), "finance should hear about submission");
}

#[tokio::test]
async fn rejection_needs_a_reason_and_resubmission_keeps_first_submission_time() {
    let env = env().await;
    let quote = env.quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect("draft");
    env.quotes.add_item(&quote.id, manual_item(10000, 1)).await.expect("item");
    let submitted = env.workflow.submit(&quote.id, "alice", "confirmer-1").await.expect("submit");
    let original_time = submitted.first_submission_time.expect("set on first submit");

    let error = env
        .workflow
        .finance_audit(&quote.id, FINANCE, AuditDecision::Reject, None, None)
        .await
        .expect_err("reject without reason");
    common::assert_validation(&error);

    let returned = env
        .workflow
        .finance_audit(&quote.id, FINANCE, AuditDecision::Reject, Some("price too low"), None)
        .await
        .expect("reject");
    assert_eq!(returned.status, QuoteStatus::Returned);

    let resubmitted =
        env.workflow.submit(&quote.id, "alice", "confirmer-1").await.expect("resubmit");
    assert_eq!(resubmitted.first_submission_time, Some(original_time));
}

#[tokio::test]
async fn approving_a_draft_is_a_state_conflict() {
    let env = env().await;
    let quote = env.quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect("draft");
    env.quotes.add_item(&quote.id, manual_item(10000, 1)).await.expect("item");

    let error = env
        .workflow
        .finance_audit(&quote.id, FINANCE, AuditDecision::Pass, None, None)
        .await
        .expect_err("not pending");
    common::assert_state_conflict(&error);
}

#[tokio::test]
async fn approval_can_reassign_the_collector() {
    let env = env().await;
    let quote = env.quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect("draft");
    env.quotes.add_item(&quote.id, manual_item(10000, 1)).await.expect("item");
    env.workflow.submit(&quote.id, "alice", "confirmer-1").await.expect("submit");

    let confirmed = env
        .workflow
        .finance_audit(&quote.id, FINANCE, AuditDecision::Pass, None, Some("collector-2"))
        .await
        .expect("approve");
    assert_eq!(confirmed.collector_id.as_deref(), Some("collector-2"));

    let changes = env.quotes.collector_changes(&quote.id).await.expect("changes");
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].to_user_id, "collector-2");
    assert_eq!(changes[0].changed_by, FINANCE);
}

#[tokio::test]
async fn confirmed_quote_rejects_edits() {
    let env = env().await;
    let quote = confirmed_quote(&env, CUSTOMER, 10000).await;

    let error =
        env.quotes.add_item(&quote.id, manual_item(5000, 1)).await.expect_err("not editable");
    common::assert_state_conflict(&error);
}

#[tokio::test]
async fn fallback_steps_back_and_needs_a_reason() {
    let env = env().await;
    let quote = env.quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect("draft");
    env.quotes.add_item(&quote.id, manual_item(10000, 1)).await.expect("item");
    env.workflow.submit(&quote.id, "alice", "confirmer-1").await.expect("submit");

    let error = env.workflow.fallback(&quote.id, FINANCE, "  ").await.expect_err("blank reason");
    common::assert_validation(&error);

    let stepped = env.workflow.fallback(&quote.id, FINANCE, "wrong customer").await.expect("fallback");
    assert_eq!(stepped.status, QuoteStatus::Draft);

    let error = env.workflow.fallback(&quote.id, FINANCE, "again").await.expect_err("draft has no predecessor");
    common::assert_state_conflict(&error);
}

#[tokio::test]
async fn fallback_from_confirmed_is_blocked_by_a_downstream_document() {
    let env = env().await;
    let quote = confirmed_quote(&env, CUSTOMER, 10000).await;
    env.quotes
        .register_downstream(&quote.id, DownstreamType::WorkOrder, "wo-1")
        .await
        .expect("downstream");

    let error = env
        .workflow
        .fallback(&quote.id, FINANCE, "undo confirmation")
        .await
        .expect_err("downstream exists");
    common::assert_state_conflict(&error);
}

#[tokio::test]
async fn downstream_registration_is_once_only() {
    let env = env().await;
    let quote = confirmed_quote(&env, CUSTOMER, 10000).await;

    env.quotes
        .register_downstream(&quote.id, DownstreamType::WorkOrder, "wo-1")
        .await
        .expect("first registration");
    let error = env
        .quotes
        .register_downstream(&quote.id, DownstreamType::Shipment, "ship-1")
        .await
        .expect_err("second registration");
    common::assert_state_conflict(&error);
}

#[tokio::test]
async fn quote_numbers_sequence_per_operator() {
    let env = env().await;
    let first = env.quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect("draft 1");
    let second = env.quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect("draft 2");
    let other = env.quotes.create_draft(draft_cmd(CUSTOMER), "bob").await.expect("draft 3");

    assert!(first.quote_no.starts_with("BJalice"));
    assert!(first.quote_no.ends_with("001"));
    assert!(second.quote_no.ends_with("002"));
    assert!(other.quote_no.starts_with("BJbob"));
    assert!(other.quote_no.ends_with("001"), "operators have independent sequences");
}

#[tokio::test]
async fn update_header_only_while_editable() {
    let env = env().await;
    let quote = env.quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect("draft");

    let updated = env
        .quotes
        .update_header(
            &quote.id,
            settly_db::UpdateHeaderCommand {
                recipient: Some("Wang".to_string()),
                phone: Some("555-0100".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.recipient.as_deref(), Some("Wang"));
    assert!(updated.version > quote.version);

    let confirmed = confirmed_quote(&env, CUSTOMER, 10000).await;
    let error = env
        .quotes
        .update_header(
            &confirmed.id,
            settly_db::UpdateHeaderCommand {
                recipient: Some("Li".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect_err("confirmed header is frozen");
    common::assert_state_conflict(&error);
}

#[tokio::test]
async fn item_amounts_and_deviation_are_derived() {
    let env = env().await;
    let quote = env.quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect("draft");

    let item = env.quotes.add_item(&quote.id, manual_item(2550, 3)).await.expect("item");
    assert_eq!(item.amount, Decimal::new(7650, 2));
    assert!(!item.is_price_deviated, "no contract price, nothing to deviate from");
    assert_eq!(env.quotes.item_total(&quote.id).await.expect("total"), Decimal::new(7650, 2));

    env.quotes.delete_item(&item.id).await.expect("delete");
    assert_eq!(env.quotes.item_total(&quote.id).await.expect("total"), Decimal::ZERO);
}

#[tokio::test]
async fn zero_quantity_is_rejected() {
    let env = env().await;
    let quote = env.quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect("draft");

    let mut cmd = manual_item(10000, 1);
    cmd.quantity = 0;
    let error = env.quotes.add_item(&quote.id, cmd).await.expect_err("zero quantity");
    common::assert_validation(&error);
}

#[tokio::test]
async fn collector_change_is_logged_and_frozen_once_paid() {
    let env = env().await;
    let quote = confirmed_quote(&env, CUSTOMER, 10000).await;

    let updated =
        env.quotes.change_collector(&quote.id, "collector-2", "manager-1").await.expect("change");
    assert_eq!(updated.collector_id.as_deref(), Some("collector-2"));
    assert_eq!(updated.payment_status, QuotePaymentStatus::Unpaid);

    let changes = env.quotes.collector_changes(&quote.id).await.expect("changes");
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].from_user_id.as_deref(), Some(common::COLLECTOR));

    let payment = env
        .payments
        .create(settly_db::CreatePaymentCommand {
            customer_id: CUSTOMER.to_string(),
            amount: Decimal::new(10000, 2),
            currency: settly_core::domain::quote::Currency::Cny,
            received_at: chrono::NaiveDate::from_ymd_opt(2026, 8, 1).expect("date"),
            allocations: vec![settly_core::domain::payment::PaymentAllocation {
                quote_id: quote.id.clone(),
                allocated_amount: Decimal::new(10000, 2),
                period: None,
            }],
        })
        .await
        .expect("payment");
    env.payments.confirm(&payment.id, None).await.expect("confirm");

    let error = env
        .quotes
        .change_collector(&quote.id, "collector-3", "manager-1")
        .await
        .expect_err("paid quotes keep their collector");
    common::assert_state_conflict(&error);
}
