//! Account statements: a frozen snapshot of a customer's confirmed quotes,
//! reconciled by binding confirmed payments whose sum matches exactly.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use settly_core::domain::payment::{PaymentId, PaymentStatus};
use settly_core::domain::quote::{QuoteId, QuoteStatus};
use settly_core::domain::statement::{
    statement_total, AccountStatement, AccountStatementItem, StatementId, StatementStatus,
};
use settly_core::errors::CoreError;
use settly_core::numbering;
use settly_core::ports::CustomerDirectory;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{payment as payment_store, quote as quote_store, ServiceError};
use crate::rows;
use crate::DbPool;

pub struct StatementService {
    pool: DbPool,
    directory: Arc<dyn CustomerDirectory>,
}

impl StatementService {
    pub fn new(pool: DbPool, directory: Arc<dyn CustomerDirectory>) -> Self {
        Self { pool, directory }
    }

    /// Build a statement over a customer's confirmed quotes. Item amounts are
    /// frozen at generation time; later quote changes do not flow back.
    pub async fn generate(
        &self,
        customer_id: &str,
        quote_ids: &[QuoteId],
        creator_id: &str,
    ) -> Result<AccountStatement, ServiceError> {
        if quote_ids.is_empty() {
            return Err(CoreError::validation("a statement needs at least one quote").into());
        }
        ensure_unique_quotes(quote_ids)?;

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let statement_id = StatementId(Uuid::new_v4().to_string());
        let mut items: Vec<AccountStatementItem> = Vec::with_capacity(quote_ids.len());
        let mut currency = None;

        for quote_id in quote_ids {
            let quote = quote_store::load_quote(&mut tx, quote_id).await?;
            if quote.customer_id.as_deref() != Some(customer_id) {
                return Err(CoreError::validation(format!(
                    "quote {} does not belong to customer {customer_id}",
                    quote.quote_no
                ))
                .into());
            }
            if quote.status != QuoteStatus::Confirmed {
                return Err(CoreError::validation(format!(
                    "only confirmed quotes can be included; {} is {}",
                    quote.quote_no,
                    quote.status.as_str()
                ))
                .into());
            }
            match currency {
                None => currency = Some(quote.currency),
                Some(expected) if expected != quote.currency => {
                    return Err(CoreError::validation(format!(
                        "quote {} is in {}, the statement is in {}",
                        quote.quote_no,
                        quote.currency.as_str(),
                        expected.as_str()
                    ))
                    .into());
                }
                Some(_) => {}
            }

            let quote_total = quote_store::quote_item_total(&mut tx, &quote.id).await?;
            items.push(AccountStatementItem {
                statement_id: statement_id.clone(),
                quote_id: quote.id.clone(),
                quote_no: quote.quote_no.clone(),
                quote_total,
                quote_paid: quote.paid_amount,
                quote_unpaid: quote_total - quote.paid_amount,
            });
        }

        let currency = currency.ok_or_else(|| CoreError::validation("no quotes resolved"))?;
        let now = Utc::now();
        let today = now.date_naive();
        let seq = next_statement_seq(&mut tx, today).await?;
        let statement = AccountStatement {
            id: statement_id,
            statement_no: numbering::statement_no(today, seq),
            customer_id: customer_id.to_string(),
            customer_name: self.directory.resolve_name(customer_id),
            currency,
            total_amount: statement_total(&items),
            status: StatementStatus::Pending,
            payment_id: None,
            creator_id: creator_id.to_string(),
            created_at: now,
        };

        sqlx::query(
            "INSERT INTO account_statements (
                 id, statement_no, customer_id, customer_name, currency,
                 total_amount, status, payment_id, creator_id, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&statement.id.0)
        .bind(&statement.statement_no)
        .bind(&statement.customer_id)
        .bind(statement.customer_name.as_deref())
        .bind(statement.currency.as_str())
        .bind(statement.total_amount.to_string())
        .bind(statement.status.as_str())
        .bind(None::<String>)
        .bind(&statement.creator_id)
        .bind(statement.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for item in &items {
            sqlx::query(
                "INSERT INTO account_statement_items
                     (statement_id, quote_id, quote_no, quote_total, quote_paid, quote_unpaid)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&item.statement_id.0)
            .bind(&item.quote_id.0)
            .bind(&item.quote_no)
            .bind(item.quote_total.to_string())
            .bind(item.quote_paid.to_string())
            .bind(item.quote_unpaid.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!(
            statement_no = %statement.statement_no,
            customer = customer_id,
            quotes = items.len(),
            total = %statement.total_amount,
            "statement generated"
        );
        Ok(statement)
    }

    /// Drop one quote from a pending statement and recompute the total from
    /// the remaining items.
    pub async fn remove_item(
        &self,
        statement_id: &StatementId,
        quote_id: &QuoteId,
    ) -> Result<AccountStatement, ServiceError> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut statement = load_statement(&mut tx, statement_id).await?;
        if statement.status != StatementStatus::Pending {
            return Err(CoreError::state_conflict(format!(
                "statement {} is reconciled and can no longer change",
                statement.statement_no
            ))
            .into());
        }

        let result =
            sqlx::query("DELETE FROM account_statement_items WHERE statement_id = ? AND quote_id = ?")
                .bind(&statement_id.0)
                .bind(&quote_id.0)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() != 1 {
            return Err(CoreError::not_found(format!(
                "quote {} is not on statement {}",
                quote_id.0, statement.statement_no
            ))
            .into());
        }

        let remaining = load_statement_items(&mut tx, statement_id).await?;
        statement.total_amount = statement_total(&remaining);
        sqlx::query("UPDATE account_statements SET total_amount = ? WHERE id = ?")
            .bind(statement.total_amount.to_string())
            .bind(&statement_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(statement)
    }

    /// Reconcile by binding payments whose summed amount equals the
    /// statement total exactly. A payment binds to at most one statement in
    /// its lifetime.
    pub async fn bind_payments(
        &self,
        statement_id: &StatementId,
        payment_ids: &[PaymentId],
    ) -> Result<AccountStatement, ServiceError> {
        if payment_ids.is_empty() {
            return Err(CoreError::validation("at least one payment is required").into());
        }
        ensure_unique_payments(payment_ids)?;

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut statement = load_statement(&mut tx, statement_id).await?;
        if statement.status != StatementStatus::Pending {
            return Err(CoreError::state_conflict(format!(
                "statement {} is already reconciled",
                statement.statement_no
            ))
            .into());
        }

        let mut bound_sum = Decimal::ZERO;
        for payment_id in payment_ids {
            let payment = payment_store::load_payment(&mut tx, payment_id).await?;
            if payment.status != PaymentStatus::Confirmed {
                return Err(CoreError::state_conflict(format!(
                    "payment {} is not confirmed",
                    payment.payment_no
                ))
                .into());
            }
            if payment.statement_id.is_some() {
                return Err(CoreError::state_conflict(format!(
                    "payment {} is already bound to a statement",
                    payment.payment_no
                ))
                .into());
            }
            if payment.customer_id != statement.customer_id {
                return Err(CoreError::validation(format!(
                    "payment {} belongs to another customer",
                    payment.payment_no
                ))
                .into());
            }
            if payment.currency != statement.currency {
                return Err(CoreError::validation(format!(
                    "payment {} is in {}, the statement is in {}",
                    payment.payment_no,
                    payment.currency.as_str(),
                    statement.currency.as_str()
                ))
                .into());
            }
            bound_sum += payment.amount;
        }

        if bound_sum != statement.total_amount {
            return Err(CoreError::validation(format!(
                "bound payments sum to {bound_sum}, statement total is {}",
                statement.total_amount
            ))
            .into());
        }

        for payment_id in payment_ids {
            sqlx::query("UPDATE payments SET statement_id = ? WHERE id = ?")
                .bind(&statement_id.0)
                .bind(&payment_id.0)
                .execute(&mut *tx)
                .await?;
        }

        statement.status = StatementStatus::Reconciled;
        statement.payment_id = Some(payment_ids[0].clone());
        sqlx::query("UPDATE account_statements SET status = ?, payment_id = ? WHERE id = ?")
            .bind(statement.status.as_str())
            .bind(&payment_ids[0].0)
            .bind(&statement_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(
            statement_no = %statement.statement_no,
            payments = payment_ids.len(),
            "statement reconciled"
        );
        Ok(statement)
    }

    pub async fn get(&self, statement_id: &StatementId) -> Result<AccountStatement, ServiceError> {
        let mut conn = self.pool.acquire().await?;
        load_statement(&mut conn, statement_id).await
    }

    pub async fn items(
        &self,
        statement_id: &StatementId,
    ) -> Result<Vec<AccountStatementItem>, ServiceError> {
        let mut conn = self.pool.acquire().await?;
        load_statement_items(&mut conn, statement_id).await
    }
}

fn ensure_unique_quotes(quote_ids: &[QuoteId]) -> Result<(), CoreError> {
    let mut seen: Vec<&QuoteId> = Vec::new();
    for quote_id in quote_ids {
        if seen.contains(&quote_id) {
            return Err(CoreError::validation(format!(
                "quote {} is listed more than once",
                quote_id.0
            )));
        }
        seen.push(quote_id);
    }
    Ok(())
}

/// A payment listed twice would have its amount counted twice against the
/// statement total.
fn ensure_unique_payments(payment_ids: &[PaymentId]) -> Result<(), CoreError> {
    let mut seen: Vec<&PaymentId> = Vec::new();
    for payment_id in payment_ids {
        if seen.contains(&payment_id) {
            return Err(CoreError::validation(format!(
                "payment {} is listed more than once",
                payment_id.0
            )));
        }
        seen.push(payment_id);
    }
    Ok(())
}

async fn next_statement_seq(
    conn: &mut SqliteConnection,
    today: chrono::NaiveDate,
) -> Result<u32, ServiceError> {
    let seq = sqlx::query(
        "INSERT INTO statement_sequences (day, next_seq) VALUES (?, 1)
         ON CONFLICT (day) DO UPDATE SET next_seq = next_seq + 1
         RETURNING next_seq",
    )
    .bind(today.format("%Y%m%d").to_string())
    .fetch_one(conn)
    .await?
    .get::<i64, _>("next_seq");
    u32::try_from(seq).map_err(|_| ServiceError::Decode(format!("next_seq: out of range `{seq}`")))
}

pub(crate) async fn load_statement(
    conn: &mut SqliteConnection,
    statement_id: &StatementId,
) -> Result<AccountStatement, ServiceError> {
    let row = sqlx::query("SELECT * FROM account_statements WHERE id = ?")
        .bind(&statement_id.0)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| {
            CoreError::not_found(format!("statement {} does not exist", statement_id.0))
        })?;
    rows::statement_from_row(&row)
}

pub(crate) async fn load_statement_items(
    conn: &mut SqliteConnection,
    statement_id: &StatementId,
) -> Result<Vec<AccountStatementItem>, ServiceError> {
    let item_rows = sqlx::query(
        "SELECT statement_id, quote_id, quote_no,
                CAST(quote_total AS TEXT) AS quote_total,
                CAST(quote_paid AS TEXT) AS quote_paid,
                CAST(quote_unpaid AS TEXT) AS quote_unpaid
         FROM account_statement_items
         WHERE statement_id = ?
         ORDER BY quote_no",
    )
    .bind(&statement_id.0)
    .fetch_all(conn)
    .await?;
    item_rows.iter().map(rows::statement_item_from_row).collect()
}
