//! Quote and line-item store. Every mutation runs in one immediate
//! transaction and writes the quote row back through a version
//! compare-and-swap; a CAS miss surfaces as a state conflict.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use settly_core::domain::events::CollectorChangeEvent;
use settly_core::domain::quote::{
    line_amount, Currency, DownstreamType, ExpenseType, Quote, QuoteId, QuoteItem, QuoteItemId,
    QuotePaymentStatus, QuoteSourceType, QuoteStatus, VoidStatus,
};
use settly_core::errors::CoreError;
use settly_core::numbering;
use settly_core::ports::CustomerDirectory;
use settly_core::pricing::{self, PriceSuggestion};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{contract, ServiceError};
use crate::rows;
use crate::DbPool;

#[derive(Clone, Debug)]
pub struct CreateDraftCommand {
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
}

/// Header fields that stay editable while the quote is `Draft`/`Returned`.
/// `None` leaves a field unchanged.
#[derive(Clone, Debug, Default)]
pub struct UpdateHeaderCommand {
    pub customer_name: Option<String>,
    pub recipient: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub assignee_id: Option<String>,
}

/// Line-item input for add and update. A `None` unit price means "take the
/// contract suggestion".
#[derive(Clone, Debug)]
pub struct ItemCommand {
    pub expense_type: ExpenseType,
    pub description: Option<String>,
    pub quantity: u32,
    pub unit_price: Option<Decimal>,
    pub manual_price_reason: Option<String>,
}

pub struct QuoteService {
    pool: DbPool,
    directory: Arc<dyn CustomerDirectory>,
}

impl QuoteService {
    pub fn new(pool: DbPool, directory: Arc<dyn CustomerDirectory>) -> Self {
        Self { pool, directory }
    }

    pub async fn create_draft(
        &self,
        cmd: CreateDraftCommand,
        operator_id: &str,
    ) -> Result<Quote, ServiceError> {
        let has_name = cmd.customer_name.as_deref().is_some_and(|name| !name.trim().is_empty());
        if cmd.customer_id.is_none() && !has_name {
            return Err(CoreError::validation(
                "a customer id or a non-blank customer name is required",
            )
            .into());
        }
        if let Some(customer_id) = cmd.customer_id.as_deref() {
            if !self.directory.exists(customer_id) {
                return Err(CoreError::validation(format!(
                    "customer {customer_id} is not known to master data"
                ))
                .into());
            }
        }

        let customer_name = match (&cmd.customer_id, cmd.customer_name.clone()) {
            (_, Some(name)) if !name.trim().is_empty() => Some(name),
            (Some(customer_id), _) => self.directory.resolve_name(customer_id),
            _ => None,
        };

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let now = Utc::now();
        let today = now.date_naive();
        let seq = next_quote_seq(&mut tx, operator_id, today).await?;

        let quote = Quote {
            id: QuoteId(Uuid::new_v4().to_string()),
            quote_no: numbering::quote_no(cmd.source_type, operator_id, today, seq),
            status: QuoteStatus::Draft,
            source_type: cmd.source_type,
            source_ref_id: cmd.source_ref_id,
            customer_id: cmd.customer_id,
            customer_name,
            currency: cmd.currency,
            recipient: cmd.recipient,
            phone: cmd.phone,
            address: cmd.address,
            assignee_id: cmd.assignee_id,
            collector_id: cmd.collector_id,
            customer_confirmer_id: None,
            first_submission_time: None,
            paid_amount: Decimal::ZERO,
            payment_status: QuotePaymentStatus::Unpaid,
            void_status: VoidStatus::None,
            downstream_type: None,
            downstream_id: None,
            parent_quote_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        insert_quote(&mut tx, &quote).await?;
        tx.commit().await?;

        tracing::info!(quote_no = %quote.quote_no, operator = operator_id, "quote draft created");
        Ok(quote)
    }

    pub async fn get(&self, quote_id: &QuoteId) -> Result<Quote, ServiceError> {
        let mut conn = self.pool.acquire().await?;
        load_quote(&mut conn, quote_id).await
    }

    pub async fn items(&self, quote_id: &QuoteId) -> Result<Vec<QuoteItem>, ServiceError> {
        let mut conn = self.pool.acquire().await?;
        load_items(&mut conn, quote_id).await
    }

    pub async fn item_total(&self, quote_id: &QuoteId) -> Result<Decimal, ServiceError> {
        let mut conn = self.pool.acquire().await?;
        quote_item_total(&mut conn, quote_id).await
    }

    pub async fn update_header(
        &self,
        quote_id: &QuoteId,
        cmd: UpdateHeaderCommand,
    ) -> Result<Quote, ServiceError> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut quote = load_quote(&mut tx, quote_id).await?;
        quote.ensure_editable()?;

        if let Some(customer_name) = cmd.customer_name {
            quote.customer_name = Some(customer_name);
        }
        if let Some(recipient) = cmd.recipient {
            quote.recipient = Some(recipient);
        }
        if let Some(phone) = cmd.phone {
            quote.phone = Some(phone);
        }
        if let Some(address) = cmd.address {
            quote.address = Some(address);
        }
        if let Some(assignee_id) = cmd.assignee_id {
            quote.assignee_id = Some(assignee_id);
        }

        store_quote(&mut tx, &mut quote).await?;
        tx.commit().await?;
        Ok(quote)
    }

    pub async fn add_item(
        &self,
        quote_id: &QuoteId,
        cmd: ItemCommand,
    ) -> Result<QuoteItem, ServiceError> {
        if cmd.quantity < 1 {
            return Err(CoreError::validation("quantity must be at least 1").into());
        }

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut quote = load_quote(&mut tx, quote_id).await?;
        quote.ensure_editable()?;

        let suggestion = self.suggestion_for(&mut tx, &quote, cmd.expense_type).await?;
        let pricing = resolve_item_pricing(suggestion, cmd.unit_price, cmd.manual_price_reason)?;

        let next_order = sqlx::query(
            "SELECT IFNULL(MAX(line_order), 0) AS max_order FROM quote_items WHERE quote_id = ?",
        )
        .bind(&quote.id.0)
        .fetch_one(&mut *tx)
        .await?
        .get::<i32, _>("max_order")
            + 1;

        let mut item = QuoteItem {
            id: QuoteItemId(Uuid::new_v4().to_string()),
            quote_id: quote.id.clone(),
            line_order: next_order,
            expense_type: cmd.expense_type,
            description: cmd.description,
            quantity: cmd.quantity,
            unit_price: pricing.unit_price,
            standard_price: pricing.standard_price,
            is_price_deviated: false,
            amount: Decimal::ZERO,
            manual_price_reason: pricing.manual_price_reason,
            price_source_info: pricing.price_source_info,
        };
        item.recompute();

        insert_item(&mut tx, &item).await?;
        store_quote(&mut tx, &mut quote).await?;
        tx.commit().await?;
        Ok(item)
    }

    pub async fn update_item(
        &self,
        item_id: &QuoteItemId,
        cmd: ItemCommand,
    ) -> Result<QuoteItem, ServiceError> {
        if cmd.quantity < 1 {
            return Err(CoreError::validation("quantity must be at least 1").into());
        }

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut item = load_item(&mut tx, item_id).await?;
        let mut quote = load_quote(&mut tx, &item.quote_id).await?;
        quote.ensure_editable()?;

        let pricing = if quote.first_submission_time.is_none() {
            let suggestion = self.suggestion_for(&mut tx, &quote, cmd.expense_type).await?;
            resolve_item_pricing(suggestion, cmd.unit_price, cmd.manual_price_reason)?
        } else {
            // After the first submission the resolver is no longer consulted;
            // the line keeps its standard-price snapshot and deviation from it
            // still needs a reason.
            repriced_against_snapshot(&item, cmd.unit_price, cmd.manual_price_reason)?
        };

        item.expense_type = cmd.expense_type;
        item.description = cmd.description;
        item.quantity = cmd.quantity;
        item.unit_price = pricing.unit_price;
        item.standard_price = pricing.standard_price;
        item.manual_price_reason = pricing.manual_price_reason;
        item.price_source_info = pricing.price_source_info;
        item.recompute();

        update_item_row(&mut tx, &item).await?;
        store_quote(&mut tx, &mut quote).await?;
        tx.commit().await?;
        Ok(item)
    }

    pub async fn delete_item(&self, item_id: &QuoteItemId) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let item = load_item(&mut tx, item_id).await?;
        let mut quote = load_quote(&mut tx, &item.quote_id).await?;
        quote.ensure_editable()?;

        sqlx::query("DELETE FROM quote_items WHERE id = ?")
            .bind(&item.id.0)
            .execute(&mut *tx)
            .await?;
        store_quote(&mut tx, &mut quote).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn register_downstream(
        &self,
        quote_id: &QuoteId,
        downstream_type: DownstreamType,
        downstream_id: &str,
    ) -> Result<Quote, ServiceError> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut quote = load_quote(&mut tx, quote_id).await?;
        quote.register_downstream(downstream_type, downstream_id)?;
        store_quote(&mut tx, &mut quote).await?;
        tx.commit().await?;

        tracing::info!(
            quote_no = %quote.quote_no,
            downstream_type = downstream_type.as_str(),
            downstream_id,
            "downstream document registered"
        );
        Ok(quote)
    }

    pub async fn change_collector(
        &self,
        quote_id: &QuoteId,
        new_collector_id: &str,
        changed_by: &str,
    ) -> Result<Quote, ServiceError> {
        if new_collector_id.trim().is_empty() {
            return Err(CoreError::validation("new collector id must not be blank").into());
        }

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut quote = load_quote(&mut tx, quote_id).await?;
        if quote.payment_status == QuotePaymentStatus::Paid {
            return Err(CoreError::state_conflict(format!(
                "quote {} is fully paid; collector can no longer change",
                quote.quote_no
            ))
            .into());
        }

        let previous = quote.collector_id.clone();
        quote.collector_id = Some(new_collector_id.to_string());
        store_quote(&mut tx, &mut quote).await?;

        sqlx::query(
            "INSERT INTO collector_change_events
                 (quote_id, from_user_id, to_user_id, changed_by, changed_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&quote.id.0)
        .bind(previous.as_deref())
        .bind(new_collector_id)
        .bind(changed_by)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(quote)
    }

    pub async fn collector_changes(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Vec<CollectorChangeEvent>, ServiceError> {
        let rows = sqlx::query(
            "SELECT quote_id, from_user_id, to_user_id, changed_by, changed_at
             FROM collector_change_events
             WHERE quote_id = ?
             ORDER BY id DESC",
        )
        .bind(&quote_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(rows::collector_event_from_row).collect()
    }

    /// Carry-forward draft for an overpayment excess; see the payment
    /// ledger's `CreateBalance` strategy.
    pub async fn create_balance_quote(
        &self,
        parent_quote_id: &QuoteId,
        amount: Decimal,
        operator_id: &str,
    ) -> Result<Quote, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::validation("balance amount must be positive").into());
        }
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let parent = load_quote(&mut tx, parent_quote_id).await?;
        let balance = create_balance_quote_in(&mut tx, &parent, amount, operator_id).await?;
        tx.commit().await?;
        Ok(balance)
    }

    async fn suggestion_for(
        &self,
        conn: &mut SqliteConnection,
        quote: &Quote,
        expense_type: ExpenseType,
    ) -> Result<Option<PriceSuggestion>, ServiceError> {
        if quote.first_submission_time.is_some() {
            return Ok(None);
        }
        let Some(customer_id) = quote.customer_id.as_deref() else {
            return Ok(None);
        };
        let headers = contract::load_active_headers(conn, customer_id).await?;
        let suggestion = pricing::suggest(&headers, Utc::now().date_naive(), expense_type)
            .filter(|suggestion| suggestion.currency == quote.currency);
        Ok(suggestion)
    }
}

struct ResolvedItemPricing {
    unit_price: Decimal,
    standard_price: Option<Decimal>,
    manual_price_reason: Option<String>,
    price_source_info: Option<String>,
}

fn resolve_item_pricing(
    suggestion: Option<PriceSuggestion>,
    caller_price: Option<Decimal>,
    manual_price_reason: Option<String>,
) -> Result<ResolvedItemPricing, ServiceError> {
    match (suggestion, caller_price) {
        (Some(suggestion), None) => Ok(ResolvedItemPricing {
            unit_price: suggestion.price,
            standard_price: Some(suggestion.price),
            manual_price_reason: None,
            price_source_info: Some(source_info_json(&suggestion)?),
        }),
        (Some(suggestion), Some(price)) if price == suggestion.price => Ok(ResolvedItemPricing {
            unit_price: price,
            standard_price: Some(suggestion.price),
            manual_price_reason: None,
            price_source_info: Some(source_info_json(&suggestion)?),
        }),
        (Some(suggestion), Some(price)) => {
            require_reason(&manual_price_reason, suggestion.price, price)?;
            Ok(ResolvedItemPricing {
                unit_price: price,
                standard_price: Some(suggestion.price),
                manual_price_reason,
                price_source_info: None,
            })
        }
        (None, Some(price)) => Ok(ResolvedItemPricing {
            unit_price: price,
            standard_price: None,
            manual_price_reason,
            price_source_info: None,
        }),
        (None, None) => Err(CoreError::validation(
            "no contract price is available; a unit price is required",
        )
        .into()),
    }
}

fn repriced_against_snapshot(
    item: &QuoteItem,
    caller_price: Option<Decimal>,
    manual_price_reason: Option<String>,
) -> Result<ResolvedItemPricing, ServiceError> {
    let Some(price) = caller_price else {
        return Err(CoreError::validation("a unit price is required").into());
    };
    let mut reason = manual_price_reason;
    if let Some(standard) = item.standard_price {
        if price != standard {
            require_reason(&reason, standard, price)?;
        } else {
            reason = None;
        }
    }
    Ok(ResolvedItemPricing {
        unit_price: price,
        standard_price: item.standard_price,
        manual_price_reason: reason,
        price_source_info: item.price_source_info.clone(),
    })
}

fn require_reason(
    reason: &Option<String>,
    standard: Decimal,
    price: Decimal,
) -> Result<(), CoreError> {
    if reason.as_deref().map_or(true, |text| text.trim().is_empty()) {
        return Err(CoreError::validation(format!(
            "price {price} deviates from the contract price {standard}; a manual price reason is required"
        )));
    }
    Ok(())
}

fn source_info_json(suggestion: &PriceSuggestion) -> Result<String, ServiceError> {
    serde_json::to_string(&suggestion.source)
        .map_err(|error| ServiceError::Decode(format!("price_source_info: {error}")))
}

async fn next_quote_seq(
    conn: &mut SqliteConnection,
    operator_id: &str,
    today: chrono::NaiveDate,
) -> Result<u32, ServiceError> {
    let (operator, period) = numbering::quote_sequence_scope(operator_id, today);
    let seq = sqlx::query(
        "INSERT INTO quote_sequences (operator, period, next_seq) VALUES (?, ?, 1)
         ON CONFLICT (operator, period) DO UPDATE SET next_seq = next_seq + 1
         RETURNING next_seq",
    )
    .bind(&operator)
    .bind(&period)
    .fetch_one(conn)
    .await?
    .get::<i64, _>("next_seq");
    u32::try_from(seq).map_err(|_| ServiceError::Decode(format!("next_seq: out of range `{seq}`")))
}

pub(crate) async fn load_quote(
    conn: &mut SqliteConnection,
    quote_id: &QuoteId,
) -> Result<Quote, ServiceError> {
    let row = sqlx::query("SELECT * FROM quotes WHERE id = ?")
        .bind(&quote_id.0)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("quote {} does not exist", quote_id.0)))?;
    rows::quote_from_row(&row)
}

pub(crate) async fn load_items(
    conn: &mut SqliteConnection,
    quote_id: &QuoteId,
) -> Result<Vec<QuoteItem>, ServiceError> {
    let rows = sqlx::query("SELECT * FROM quote_items WHERE quote_id = ? ORDER BY line_order")
        .bind(&quote_id.0)
        .fetch_all(conn)
        .await?;
    rows.iter().map(rows::quote_item_from_row).collect()
}

async fn load_item(
    conn: &mut SqliteConnection,
    item_id: &QuoteItemId,
) -> Result<QuoteItem, ServiceError> {
    let row = sqlx::query("SELECT * FROM quote_items WHERE id = ?")
        .bind(&item_id.0)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("quote item {} does not exist", item_id.0)))?;
    rows::quote_item_from_row(&row)
}

/// Item total of a quote, summed in fixed point.
pub(crate) async fn quote_item_total(
    conn: &mut SqliteConnection,
    quote_id: &QuoteId,
) -> Result<Decimal, ServiceError> {
    let items = load_items(conn, quote_id).await?;
    Ok(items.iter().map(|item| item.amount).sum())
}

async fn insert_quote(conn: &mut SqliteConnection, quote: &Quote) -> Result<(), ServiceError> {
    sqlx::query(
        "INSERT INTO quotes (
             id, quote_no, status, source_type, source_ref_id,
             customer_id, customer_name, currency, recipient, phone, address,
             assignee_id, collector_id, customer_confirmer_id, first_submission_time,
             paid_amount, payment_status, void_status,
             downstream_type, downstream_id, parent_quote_id,
             version, created_at, updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&quote.id.0)
    .bind(&quote.quote_no)
    .bind(quote.status.as_str())
    .bind(quote.source_type.as_str())
    .bind(quote.source_ref_id.as_deref())
    .bind(quote.customer_id.as_deref())
    .bind(quote.customer_name.as_deref())
    .bind(quote.currency.as_str())
    .bind(quote.recipient.as_deref())
    .bind(quote.phone.as_deref())
    .bind(quote.address.as_deref())
    .bind(quote.assignee_id.as_deref())
    .bind(quote.collector_id.as_deref())
    .bind(quote.customer_confirmer_id.as_deref())
    .bind(quote.first_submission_time.map(|time| time.to_rfc3339()))
    .bind(quote.paid_amount.to_string())
    .bind(quote.payment_status.as_str())
    .bind(quote.void_status.as_str())
    .bind(quote.downstream_type.map(|downstream| downstream.as_str()))
    .bind(quote.downstream_id.as_deref())
    .bind(quote.parent_quote_id.as_ref().map(|parent| parent.0.as_str()))
    .bind(quote.version)
    .bind(quote.created_at.to_rfc3339())
    .bind(quote.updated_at.to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

/// Write the quote back with a version compare-and-swap. Bumps the in-memory
/// version on success; a miss means a concurrent writer got there first.
pub(crate) async fn store_quote(
    conn: &mut SqliteConnection,
    quote: &mut Quote,
) -> Result<(), ServiceError> {
    let expected_version = quote.version;
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE quotes SET
             status = ?, customer_id = ?, customer_name = ?, recipient = ?, phone = ?,
             address = ?, assignee_id = ?, collector_id = ?, customer_confirmer_id = ?,
             first_submission_time = ?, paid_amount = ?, payment_status = ?, void_status = ?,
             downstream_type = ?, downstream_id = ?, version = ?, updated_at = ?
         WHERE id = ? AND version = ?",
    )
    .bind(quote.status.as_str())
    .bind(quote.customer_id.as_deref())
    .bind(quote.customer_name.as_deref())
    .bind(quote.recipient.as_deref())
    .bind(quote.phone.as_deref())
    .bind(quote.address.as_deref())
    .bind(quote.assignee_id.as_deref())
    .bind(quote.collector_id.as_deref())
    .bind(quote.customer_confirmer_id.as_deref())
    .bind(quote.first_submission_time.map(|time| time.to_rfc3339()))
    .bind(quote.paid_amount.to_string())
    .bind(quote.payment_status.as_str())
    .bind(quote.void_status.as_str())
    .bind(quote.downstream_type.map(|downstream| downstream.as_str()))
    .bind(quote.downstream_id.as_deref())
    .bind(expected_version + 1)
    .bind(now.to_rfc3339())
    .bind(&quote.id.0)
    .bind(expected_version)
    .execute(conn)
    .await?;

    if result.rows_affected() != 1 {
        return Err(CoreError::state_conflict(format!(
            "quote {} was modified concurrently",
            quote.quote_no
        ))
        .into());
    }
    quote.version = expected_version + 1;
    quote.updated_at = now;
    Ok(())
}

async fn insert_item(conn: &mut SqliteConnection, item: &QuoteItem) -> Result<(), ServiceError> {
    sqlx::query(
        "INSERT INTO quote_items (
             id, quote_id, line_order, expense_type, description, quantity,
             unit_price, standard_price, is_price_deviated, amount,
             manual_price_reason, price_source_info
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&item.id.0)
    .bind(&item.quote_id.0)
    .bind(item.line_order)
    .bind(item.expense_type.as_str())
    .bind(item.description.as_deref())
    .bind(i64::from(item.quantity))
    .bind(item.unit_price.to_string())
    .bind(item.standard_price.map(|price| price.to_string()))
    .bind(item.is_price_deviated)
    .bind(item.amount.to_string())
    .bind(item.manual_price_reason.as_deref())
    .bind(item.price_source_info.as_deref())
    .execute(conn)
    .await?;
    Ok(())
}

async fn update_item_row(
    conn: &mut SqliteConnection,
    item: &QuoteItem,
) -> Result<(), ServiceError> {
    sqlx::query(
        "UPDATE quote_items SET
             expense_type = ?, description = ?, quantity = ?, unit_price = ?,
             standard_price = ?, is_price_deviated = ?, amount = ?,
             manual_price_reason = ?, price_source_info = ?
         WHERE id = ?",
    )
    .bind(item.expense_type.as_str())
    .bind(item.description.as_deref())
    .bind(i64::from(item.quantity))
    .bind(item.unit_price.to_string())
    .bind(item.standard_price.map(|price| price.to_string()))
    .bind(item.is_price_deviated)
    .bind(item.amount.to_string())
    .bind(item.manual_price_reason.as_deref())
    .bind(item.price_source_info.as_deref())
    .bind(&item.id.0)
    .execute(conn)
    .await?;
    Ok(())
}

/// Create the carry-forward draft inside the caller's transaction. The
/// balance arrives as prepaid credit: a single line for the excess with the
/// paid amount already covering it.
pub(crate) async fn create_balance_quote_in(
    conn: &mut SqliteConnection,
    parent: &Quote,
    amount: Decimal,
    operator_id: &str,
) -> Result<Quote, ServiceError> {
    let now = Utc::now();
    let today = now.date_naive();
    let seq = next_quote_seq(conn, operator_id, today).await?;

    let quote = Quote {
        id: QuoteId(Uuid::new_v4().to_string()),
        quote_no: numbering::quote_no(QuoteSourceType::Manual, operator_id, today, seq),
        status: QuoteStatus::Draft,
        source_type: QuoteSourceType::Manual,
        source_ref_id: None,
        customer_id: parent.customer_id.clone(),
        customer_name: parent.customer_name.clone(),
        currency: parent.currency,
        recipient: parent.recipient.clone(),
        phone: parent.phone.clone(),
        address: parent.address.clone(),
        assignee_id: parent.assignee_id.clone(),
        collector_id: parent.collector_id.clone(),
        customer_confirmer_id: None,
        first_submission_time: None,
        paid_amount: amount,
        payment_status: QuotePaymentStatus::Paid,
        void_status: VoidStatus::None,
        downstream_type: None,
        downstream_id: None,
        parent_quote_id: Some(parent.id.clone()),
        version: 0,
        created_at: now,
        updated_at: now,
    };
    insert_quote(conn, &quote).await?;

    let mut item = QuoteItem {
        id: QuoteItemId(Uuid::new_v4().to_string()),
        quote_id: quote.id.clone(),
        line_order: 1,
        expense_type: ExpenseType::Platform,
        description: Some(format!("balance carried forward from {}", parent.quote_no)),
        quantity: 1,
        unit_price: amount,
        standard_price: None,
        is_price_deviated: false,
        amount: line_amount(1, amount),
        manual_price_reason: None,
        price_source_info: None,
    };
    item.recompute();
    insert_item(conn, &item).await?;

    tracing::info!(
        parent = %parent.quote_no,
        balance = %quote.quote_no,
        %amount,
        "balance quote created for overpayment"
    );
    Ok(quote)
}
