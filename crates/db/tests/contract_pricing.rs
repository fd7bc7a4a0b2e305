mod common;

use chrono::Utc;
use rust_decimal::Decimal;
use settly_core::domain::contract::ContractStatus;
use settly_core::domain::quote::{Currency, ExpenseType};
use settly_core::pricing::PriceStrategy;
use settly_db::ItemCommand;

use common::{draft_cmd, env, price_book, price_item, CUSTOMER};

#[tokio::test]
async fn platform_lines_take_the_lowest_price_on_offer() {
    let env = env().await;
    env.contracts
        .create(price_book(CUSTOMER, 10, vec![price_item(ExpenseType::Platform, 8000)]))
        .await
        .expect("high priority book");
    let cheap = env
        .contracts
        .create(price_book(CUSTOMER, 1, vec![price_item(ExpenseType::Platform, 6500)]))
        .await
        .expect("low priority book");

    let suggestion = env
        .contracts
        .suggest(CUSTOMER, Utc::now().date_naive(), ExpenseType::Platform)
        .await
        .expect("suggest")
        .expect("a suggestion");
    assert_eq!(suggestion.price, Decimal::new(6500, 2));
    assert_eq!(suggestion.source.strategy, PriceStrategy::LowestPrice);
    assert_eq!(suggestion.source.contract_id, cheap.id);
}

#[tokio::test]
async fn other_lines_follow_the_highest_priority_book() {
    let env = env().await;
    env.contracts
        .create(price_book(CUSTOMER, 1, vec![price_item(ExpenseType::Repair, 4000)]))
        .await
        .expect("fallback book");
    let preferred = env
        .contracts
        .create(price_book(CUSTOMER, 10, vec![price_item(ExpenseType::Repair, 9000)]))
        .await
        .expect("preferred book");

    let suggestion = env
        .contracts
        .suggest(CUSTOMER, Utc::now().date_naive(), ExpenseType::Repair)
        .await
        .expect("suggest")
        .expect("a suggestion");
    assert_eq!(suggestion.price, Decimal::new(9000, 2));
    assert_eq!(suggestion.source.strategy, PriceStrategy::Priority);
    assert_eq!(suggestion.source.contract_id, preferred.id);
}

#[tokio::test]
async fn contract_priced_items_carry_their_source() {
    let env = env().await;
    env.contracts
        .create(price_book(CUSTOMER, 5, vec![price_item(ExpenseType::Repair, 12000)]))
        .await
        .expect("book");
    let quote = env.quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect("draft");

    let item = env
        .quotes
        .add_item(
            &quote.id,
            ItemCommand {
                expense_type: ExpenseType::Repair,
                description: None,
                quantity: 2,
                unit_price: None,
                manual_price_reason: None,
            },
        )
        .await
        .expect("contract priced item");
    assert_eq!(item.unit_price, Decimal::new(12000, 2));
    assert_eq!(item.standard_price, Some(Decimal::new(12000, 2)));
    assert_eq!(item.amount, Decimal::new(24000, 2));
    assert!(!item.is_price_deviated);
    let source = item.price_source_info.as_deref().expect("source info");
    assert!(source.contains("PRIORITY"), "unexpected source {source}");
}

#[tokio::test]
async fn deviating_from_the_contract_price_needs_a_reason() {
    let env = env().await;
    env.contracts
        .create(price_book(CUSTOMER, 5, vec![price_item(ExpenseType::Repair, 12000)]))
        .await
        .expect("book");
    let quote = env.quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect("draft");

    let silent_deviation = ItemCommand {
        expense_type: ExpenseType::Repair,
        description: None,
        quantity: 1,
        unit_price: Some(Decimal::new(10000, 2)),
        manual_price_reason: None,
    };
    let error = env.quotes.add_item(&quote.id, silent_deviation).await.expect_err("no reason");
    common::assert_validation(&error);

    let item = env
        .quotes
        .add_item(
            &quote.id,
            ItemCommand {
                expense_type: ExpenseType::Repair,
                description: None,
                quantity: 1,
                unit_price: Some(Decimal::new(10000, 2)),
                manual_price_reason: Some("goodwill discount".to_string()),
            },
        )
        .await
        .expect("deviation with a reason");
    assert!(item.is_price_deviated);
    assert_eq!(item.standard_price, Some(Decimal::new(12000, 2)));
    assert_eq!(item.manual_price_reason.as_deref(), Some("goodwill discount"));
    assert!(item.price_source_info.is_none());
}

#[tokio::test]
async fn matching_the_contract_price_is_not_a_deviation() {
    let env = env().await;
    env.contracts
        .create(price_book(CUSTOMER, 5, vec![price_item(ExpenseType::Repair, 12000)]))
        .await
        .expect("book");
    let quote = env.quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect("draft");

    let item = env
        .quotes
        .add_item(
            &quote.id,
            ItemCommand {
                expense_type: ExpenseType::Repair,
                description: None,
                quantity: 1,
                unit_price: Some(Decimal::new(12000, 2)),
                manual_price_reason: Some("not needed".to_string()),
            },
        )
        .await
        .expect("matching price");
    assert!(!item.is_price_deviated);
    assert!(item.manual_price_reason.is_none());
    assert!(item.price_source_info.is_some());
}

#[tokio::test]
async fn suggestions_skip_books_in_another_currency() {
    let env = env().await;
    let mut book = price_book(CUSTOMER, 5, vec![price_item(ExpenseType::Repair, 12000)]);
    book.items[0].currency = Currency::Usd;
    env.contracts.create(book).await.expect("usd book");

    let quote = env.quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect("cny draft");
    let error = env
        .quotes
        .add_item(
            &quote.id,
            ItemCommand {
                expense_type: ExpenseType::Repair,
                description: None,
                quantity: 1,
                unit_price: None,
                manual_price_reason: None,
            },
        )
        .await
        .expect_err("no usable suggestion");
    common::assert_validation(&error);
}

#[tokio::test]
async fn returned_quotes_reprice_against_their_snapshot() {
    let env = env().await;
    let header = env
        .contracts
        .create(price_book(CUSTOMER, 5, vec![price_item(ExpenseType::Repair, 12000)]))
        .await
        .expect("book");
    let quote = env.quotes.create_draft(draft_cmd(CUSTOMER), "alice").await.expect("draft");
    let item = env
        .quotes
        .add_item(
            &quote.id,
            ItemCommand {
                expense_type: ExpenseType::Repair,
                description: None,
                quantity: 1,
                unit_price: None,
                manual_price_reason: None,
            },
        )
        .await
        .expect("contract priced item");

    env.workflow.submit(&quote.id, "alice", "confirmer-1").await.expect("submit");
    env.workflow
        .finance_audit(
            &quote.id,
            "finance-1",
            settly_core::domain::void::AuditDecision::Reject,
            Some("price needs another look"),
            None,
        )
        .await
        .expect("reject");

    // The book going away no longer matters; the line carries its own
    // standard-price snapshot.
    env.contracts.deactivate(&header.id).await.expect("deactivate");

    let error = env
        .quotes
        .update_item(
            &item.id,
            ItemCommand {
                expense_type: ExpenseType::Repair,
                description: None,
                quantity: 1,
                unit_price: Some(Decimal::new(10000, 2)),
                manual_price_reason: None,
            },
        )
        .await
        .expect_err("deviation from the snapshot");
    common::assert_validation(&error);

    let updated = env
        .quotes
        .update_item(
            &item.id,
            ItemCommand {
                expense_type: ExpenseType::Repair,
                description: None,
                quantity: 1,
                unit_price: Some(Decimal::new(10000, 2)),
                manual_price_reason: Some("negotiated after the return".to_string()),
            },
        )
        .await
        .expect("deviation with a reason");
    assert!(updated.is_price_deviated);
    assert_eq!(updated.standard_price, Some(Decimal::new(12000, 2)));
}

#[tokio::test]
async fn a_deactivated_book_stops_suggesting() {
    let env = env().await;
    let header = env
        .contracts
        .create(price_book(CUSTOMER, 5, vec![price_item(ExpenseType::Repair, 12000)]))
        .await
        .expect("book");
    assert_eq!(header.status, ContractStatus::Active);

    env.contracts.deactivate(&header.id).await.expect("deactivate");
    let suggestion = env
        .contracts
        .suggest(CUSTOMER, Utc::now().date_naive(), ExpenseType::Repair)
        .await
        .expect("suggest");
    assert!(suggestion.is_none());

    let error = env
        .contracts
        .update(&header.id, price_book(CUSTOMER, 5, vec![price_item(ExpenseType::Repair, 500)]))
        .await
        .expect_err("inactive book");
    common::assert_state_conflict(&error);
}

#[tokio::test]
async fn price_books_are_validated_on_entry() {
    let env = env().await;

    let empty = price_book(CUSTOMER, 1, Vec::new());
    common::assert_validation(&env.contracts.create(empty).await.expect_err("no items"));

    let duplicated = price_book(
        CUSTOMER,
        1,
        vec![price_item(ExpenseType::Repair, 100), price_item(ExpenseType::Repair, 200)],
    );
    common::assert_validation(&env.contracts.create(duplicated).await.expect_err("duplicate line"));

    let negative = price_book(CUSTOMER, 1, vec![price_item(ExpenseType::Repair, -100)]);
    common::assert_validation(&env.contracts.create(negative).await.expect_err("negative price"));
}
