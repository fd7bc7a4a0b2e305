//! Payment ledger. A payment is created `Draft` with its allocation lines
//! and only moves money when confirmed; confirmation updates every allocated
//! quote and flips the payment in one transaction.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use settly_core::domain::payment::{
    OverpaymentStrategy, Payment, PaymentAllocation, PaymentId, PaymentStatus,
};
use settly_core::domain::quote::{Currency, QuoteId, QuotePaymentStatus, QuoteStatus};
use settly_core::domain::statement::{StatementId, StatementStatus};
use settly_core::errors::CoreError;
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{quote as quote_store, ServiceError};
use crate::rows;
use crate::DbPool;

#[derive(Clone, Debug)]
pub struct CreatePaymentCommand {
    pub customer_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub received_at: NaiveDate,
    pub allocations: Vec<PaymentAllocation>,
}

/// Batch collection: one payment settling a set of quotes in full, resolved
/// either from an explicit quote list or from a pending statement.
#[derive(Clone, Debug)]
pub struct BatchPaymentRequest {
    pub customer_id: String,
    pub currency: Currency,
    pub total_payment_amount: Decimal,
    pub received_at: NaiveDate,
    pub quote_ids: Vec<QuoteId>,
    pub statement_id: Option<StatementId>,
}

pub struct PaymentService {
    pool: DbPool,
}

impl PaymentService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, cmd: CreatePaymentCommand) -> Result<Payment, ServiceError> {
        if cmd.customer_id.trim().is_empty() {
            return Err(CoreError::validation("customer id must not be blank").into());
        }
        if cmd.amount < Decimal::ZERO {
            return Err(CoreError::validation("payment amount must not be negative").into());
        }
        Payment::check_allocation_sum(cmd.amount, &cmd.allocations)?;
        let mut seen: Vec<&QuoteId> = Vec::new();
        for allocation in &cmd.allocations {
            if seen.contains(&&allocation.quote_id) {
                return Err(CoreError::validation(format!(
                    "quote {} is allocated more than once",
                    allocation.quote_id.0
                ))
                .into());
            }
            seen.push(&allocation.quote_id);
            if allocation.allocated_amount <= Decimal::ZERO {
                return Err(CoreError::validation(format!(
                    "allocation for quote {} must be positive",
                    allocation.quote_id.0
                ))
                .into());
            }
        }

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        for allocation in &cmd.allocations {
            let quote = quote_store::load_quote(&mut tx, &allocation.quote_id).await?;
            if quote.customer_id.as_deref() != Some(cmd.customer_id.as_str()) {
                return Err(CoreError::validation(format!(
                    "quote {} does not belong to customer {}",
                    quote.quote_no, cmd.customer_id
                ))
                .into());
            }
            if quote.currency != cmd.currency {
                return Err(CoreError::validation(format!(
                    "quote {} is in {}, payment is in {}",
                    quote.quote_no,
                    quote.currency.as_str(),
                    cmd.currency.as_str()
                ))
                .into());
            }
            if quote.status != QuoteStatus::Confirmed {
                return Err(CoreError::state_conflict(format!(
                    "quote {} must be confirmed before money is collected against it",
                    quote.quote_no
                ))
                .into());
            }
            if quote.payment_status == QuotePaymentStatus::Paid {
                return Err(CoreError::state_conflict(format!(
                    "quote {} is already fully paid",
                    quote.quote_no
                ))
                .into());
            }
        }

        let payment = Payment {
            id: PaymentId(Uuid::new_v4().to_string()),
            payment_no: format!("PAY-{}", Uuid::new_v4()),
            customer_id: cmd.customer_id,
            amount: cmd.amount,
            currency: cmd.currency,
            received_at: cmd.received_at,
            status: PaymentStatus::Draft,
            statement_id: None,
            allocations: cmd.allocations,
            created_at: Utc::now(),
        };
        insert_payment(&mut tx, &payment).await?;
        tx.commit().await?;

        tracing::info!(payment_no = %payment.payment_no, amount = %payment.amount, "payment recorded");
        Ok(payment)
    }

    /// Confirm a draft payment, moving each allocation onto its quote. An
    /// allocation that would overshoot the quote's item total follows the
    /// overpayment strategy: `Reject` (or none) fails the whole confirmation,
    /// `CreateBalance` caps the quote and carries the excess into a balance
    /// quote.
    pub async fn confirm(
        &self,
        payment_id: &PaymentId,
        strategy: Option<OverpaymentStrategy>,
    ) -> Result<Payment, ServiceError> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut payment = load_payment(&mut tx, payment_id).await?;
        if payment.status != PaymentStatus::Draft {
            return Err(CoreError::state_conflict(format!(
                "payment {} is {} and cannot be confirmed",
                payment.payment_no,
                payment.status.as_str()
            ))
            .into());
        }

        for allocation in &payment.allocations {
            let mut quote = quote_store::load_quote(&mut tx, &allocation.quote_id).await?;
            let item_total = quote_store::quote_item_total(&mut tx, &quote.id).await?;
            let new_paid = quote.paid_amount + allocation.allocated_amount;

            if new_paid > item_total {
                match strategy.unwrap_or(OverpaymentStrategy::Reject) {
                    OverpaymentStrategy::Reject => {
                        return Err(CoreError::validation(format!(
                            "allocation of {} would overpay quote {} (total {}, already paid {})",
                            allocation.allocated_amount,
                            quote.quote_no,
                            item_total,
                            quote.paid_amount
                        ))
                        .into());
                    }
                    OverpaymentStrategy::CreateBalance => {
                        let excess = new_paid - item_total;
                        let operator = quote.collector_id.clone().unwrap_or_else(|| "sys".to_string());
                        quote_store::create_balance_quote_in(&mut tx, &quote, excess, &operator)
                            .await?;
                        quote.paid_amount = item_total;
                    }
                }
            } else {
                quote.paid_amount = new_paid;
            }
            quote.payment_status = QuotePaymentStatus::derive(quote.paid_amount, item_total);
            quote_store::store_quote(&mut tx, &mut quote).await?;
        }

        payment.status = PaymentStatus::Confirmed;
        update_payment_status(&mut tx, &payment).await?;
        tx.commit().await?;

        tracing::info!(payment_no = %payment.payment_no, "payment confirmed");
        Ok(payment)
    }

    /// Reverse a payment. Confirmed allocations are backed out of their
    /// quotes; a payment bound to a statement stays put.
    pub async fn cancel(&self, payment_id: &PaymentId) -> Result<Payment, ServiceError> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut payment = load_payment(&mut tx, payment_id).await?;
        if payment.statement_id.is_some() {
            return Err(CoreError::state_conflict(format!(
                "payment {} is bound to a statement and cannot be cancelled",
                payment.payment_no
            ))
            .into());
        }
        if payment.status == PaymentStatus::Cancelled {
            return Err(CoreError::state_conflict(format!(
                "payment {} is already cancelled",
                payment.payment_no
            ))
            .into());
        }

        if payment.status == PaymentStatus::Confirmed {
            for allocation in &payment.allocations {
                let mut quote = quote_store::load_quote(&mut tx, &allocation.quote_id).await?;
                let item_total = quote_store::quote_item_total(&mut tx, &quote.id).await?;
                quote.paid_amount -= allocation.allocated_amount;
                if quote.paid_amount < Decimal::ZERO {
                    quote.paid_amount = Decimal::ZERO;
                }
                quote.payment_status = QuotePaymentStatus::derive(quote.paid_amount, item_total);
                quote_store::store_quote(&mut tx, &mut quote).await?;
            }
        }

        payment.status = PaymentStatus::Cancelled;
        update_payment_status(&mut tx, &payment).await?;
        tx.commit().await?;

        tracing::info!(payment_no = %payment.payment_no, "payment cancelled");
        Ok(payment)
    }

    /// One payment settling every quote in the set in full. Driven by a
    /// statement, it also reconciles the statement in the same transaction.
    pub async fn create_batch_payment(
        &self,
        req: BatchPaymentRequest,
        operator_id: &str,
    ) -> Result<Payment, ServiceError> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let quote_ids: Vec<QuoteId> = if let Some(statement_id) = &req.statement_id {
            let statement = super::statement::load_statement(&mut tx, statement_id).await?;
            if statement.status != StatementStatus::Pending {
                return Err(CoreError::state_conflict(format!(
                    "statement {} is already reconciled",
                    statement.statement_no
                ))
                .into());
            }
            if statement.customer_id != req.customer_id {
                return Err(CoreError::validation(format!(
                    "statement {} belongs to another customer",
                    statement.statement_no
                ))
                .into());
            }
            if statement.currency != req.currency {
                return Err(CoreError::validation(format!(
                    "statement {} is in {}, payment is in {}",
                    statement.statement_no,
                    statement.currency.as_str(),
                    req.currency.as_str()
                ))
                .into());
            }
            if statement.total_amount != req.total_payment_amount {
                return Err(CoreError::validation(format!(
                    "payment total {} does not equal statement total {}",
                    req.total_payment_amount, statement.total_amount
                ))
                .into());
            }
            super::statement::load_statement_items(&mut tx, statement_id)
                .await?
                .into_iter()
                .map(|item| item.quote_id)
                .collect()
        } else {
            req.quote_ids.clone()
        };

        if quote_ids.is_empty() {
            return Err(CoreError::validation("no quotes to settle").into());
        }
        let mut seen: Vec<&QuoteId> = Vec::new();
        for quote_id in &quote_ids {
            if seen.contains(&quote_id) {
                return Err(CoreError::validation(format!(
                    "quote {} is listed more than once",
                    quote_id.0
                ))
                .into());
            }
            seen.push(quote_id);
        }

        let mut allocations: Vec<PaymentAllocation> = Vec::with_capacity(quote_ids.len());
        let mut outstanding_total = Decimal::ZERO;
        for quote_id in &quote_ids {
            let mut quote = quote_store::load_quote(&mut tx, quote_id).await?;
            if quote.customer_id.as_deref() != Some(req.customer_id.as_str()) {
                return Err(CoreError::validation(format!(
                    "quote {} does not belong to customer {}",
                    quote.quote_no, req.customer_id
                ))
                .into());
            }
            if quote.currency != req.currency {
                return Err(CoreError::validation(format!(
                    "quote {} is in {}, payment is in {}",
                    quote.quote_no,
                    quote.currency.as_str(),
                    req.currency.as_str()
                ))
                .into());
            }
            let item_total = quote_store::quote_item_total(&mut tx, &quote.id).await?;
            let outstanding = item_total - quote.paid_amount;
            if outstanding <= Decimal::ZERO {
                return Err(CoreError::validation(format!(
                    "quote {} has nothing outstanding",
                    quote.quote_no
                ))
                .into());
            }
            outstanding_total += outstanding;

            quote.paid_amount = item_total;
            quote.payment_status = QuotePaymentStatus::Paid;
            quote_store::store_quote(&mut tx, &mut quote).await?;

            allocations.push(PaymentAllocation {
                quote_id: quote_id.clone(),
                allocated_amount: outstanding,
                period: None,
            });
        }

        if outstanding_total != req.total_payment_amount {
            return Err(CoreError::validation(format!(
                "payment total {} does not equal the outstanding sum {}",
                req.total_payment_amount, outstanding_total
            ))
            .into());
        }

        let payment = Payment {
            id: PaymentId(Uuid::new_v4().to_string()),
            payment_no: format!("PAY-{}", Uuid::new_v4()),
            customer_id: req.customer_id,
            amount: req.total_payment_amount,
            currency: req.currency,
            received_at: req.received_at,
            status: PaymentStatus::Confirmed,
            statement_id: req.statement_id.clone(),
            allocations,
            created_at: Utc::now(),
        };
        insert_payment(&mut tx, &payment).await?;

        if let Some(statement_id) = &req.statement_id {
            sqlx::query("UPDATE account_statements SET status = ?, payment_id = ? WHERE id = ?")
                .bind(StatementStatus::Reconciled.as_str())
                .bind(&payment.id.0)
                .bind(&statement_id.0)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(
            payment_no = %payment.payment_no,
            quotes = payment.allocations.len(),
            operator = operator_id,
            "batch payment settled"
        );
        Ok(payment)
    }

    pub async fn get(&self, payment_id: &PaymentId) -> Result<Payment, ServiceError> {
        let mut conn = self.pool.acquire().await?;
        load_payment(&mut conn, payment_id).await
    }
}

async fn insert_payment(
    conn: &mut SqliteConnection,
    payment: &Payment,
) -> Result<(), ServiceError> {
    sqlx::query(
        "INSERT INTO payments (
             id, payment_no, customer_id, amount, currency, received_at,
             status, statement_id, created_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&payment.id.0)
    .bind(&payment.payment_no)
    .bind(&payment.customer_id)
    .bind(payment.amount.to_string())
    .bind(payment.currency.as_str())
    .bind(payment.received_at.to_string())
    .bind(payment.status.as_str())
    .bind(payment.statement_id.as_ref().map(|id| id.0.as_str()))
    .bind(payment.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    for allocation in &payment.allocations {
        sqlx::query(
            "INSERT INTO payment_allocations (payment_id, quote_id, allocated_amount, period)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&payment.id.0)
        .bind(&allocation.quote_id.0)
        .bind(allocation.allocated_amount.to_string())
        .bind(allocation.period.as_deref())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn update_payment_status(
    conn: &mut SqliteConnection,
    payment: &Payment,
) -> Result<(), ServiceError> {
    sqlx::query("UPDATE payments SET status = ? WHERE id = ?")
        .bind(payment.status.as_str())
        .bind(&payment.id.0)
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn load_payment(
    conn: &mut SqliteConnection,
    payment_id: &PaymentId,
) -> Result<Payment, ServiceError> {
    let row = sqlx::query("SELECT * FROM payments WHERE id = ?")
        .bind(&payment_id.0)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("payment {} does not exist", payment_id.0)))?;
    let mut payment = rows::payment_from_row(&row)?;

    let allocation_rows = sqlx::query(
        "SELECT quote_id, CAST(allocated_amount AS TEXT) AS allocated_amount, period
         FROM payment_allocations
         WHERE payment_id = ?",
    )
    .bind(&payment_id.0)
    .fetch_all(conn)
    .await?;
    payment.allocations = allocation_rows
        .iter()
        .map(rows::allocation_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(payment)
}
