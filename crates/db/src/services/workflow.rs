//! Approval workflow over the quote lifecycle. Each operation does its
//! read-check-write inside one immediate transaction and appends a workflow
//! event in the same transaction; notifications go out after commit and
//! never roll anything back.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use settly_core::domain::events::{WorkflowAction, WorkflowEvent};
use settly_core::domain::quote::{Quote, QuoteId, QuoteStatus};
use settly_core::domain::void::AuditDecision;
use settly_core::errors::CoreError;
use settly_core::ports::{Notification, NotificationSink};
use sqlx::SqliteConnection;

use super::{quote as quote_store, ServiceError};
use crate::rows;
use crate::DbPool;

pub struct QuoteWorkflowService {
    pool: DbPool,
    notifications: Arc<dyn NotificationSink>,
    /// Inbox user that receives review requests.
    finance_inbox: String,
}

impl QuoteWorkflowService {
    pub fn new(
        pool: DbPool,
        notifications: Arc<dyn NotificationSink>,
        finance_inbox: impl Into<String>,
    ) -> Self {
        Self { pool, notifications, finance_inbox: finance_inbox.into() }
    }

    /// Submit for finance review. Re-submission after a return keeps the
    /// original `first_submission_time`.
    pub async fn submit(
        &self,
        quote_id: &QuoteId,
        operator_id: &str,
        customer_confirmer_id: &str,
    ) -> Result<Quote, ServiceError> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut quote = quote_store::load_quote(&mut tx, quote_id).await?;
        quote.ensure_not_frozen()?;

        let items = quote_store::load_items(&mut tx, quote_id).await?;
        if items.is_empty() {
            return Err(CoreError::validation(format!(
                "quote {} has no items and cannot be submitted",
                quote.quote_no
            ))
            .into());
        }

        let previous = quote.status;
        quote.transition_to(QuoteStatus::ApprovalPending)?;
        quote.customer_confirmer_id = Some(customer_confirmer_id.to_string());
        if quote.first_submission_time.is_none() {
            quote.first_submission_time = Some(Utc::now());
        }

        quote_store::store_quote(&mut tx, &mut quote).await?;
        append_event(&mut tx, &quote, previous, WorkflowAction::Submit, operator_id, None).await?;
        tx.commit().await?;

        tracing::info!(quote_no = %quote.quote_no, operator = operator_id, "quote submitted");
        self.notify(
            &self.finance_inbox,
            "quote pending review",
            format!("quote {} is waiting for finance review", quote.quote_no),
            &quote,
        );
        Ok(quote)
    }

    /// Finance review. `Pass` confirms; `Reject` returns the quote with a
    /// mandatory reason. Passing may reassign the collector in the same
    /// transaction.
    pub async fn finance_audit(
        &self,
        quote_id: &QuoteId,
        auditor_id: &str,
        decision: AuditDecision,
        reason: Option<&str>,
        new_collector_id: Option<&str>,
    ) -> Result<Quote, ServiceError> {
        if decision == AuditDecision::Reject
            && reason.map_or(true, |text| text.trim().is_empty())
        {
            return Err(CoreError::validation("a rejection needs a reason").into());
        }

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut quote = quote_store::load_quote(&mut tx, quote_id).await?;
        let previous = quote.status;

        match decision {
            AuditDecision::Pass => {
                quote.transition_to(QuoteStatus::Confirmed)?;
                if let Some(new_collector_id) = new_collector_id {
                    let from = quote.collector_id.clone();
                    quote.collector_id = Some(new_collector_id.to_string());
                    sqlx::query(
                        "INSERT INTO collector_change_events
                             (quote_id, from_user_id, to_user_id, changed_by, changed_at)
                         VALUES (?, ?, ?, ?, ?)",
                    )
                    .bind(&quote.id.0)
                    .bind(from.as_deref())
                    .bind(new_collector_id)
                    .bind(auditor_id)
                    .bind(Utc::now().to_rfc3339())
                    .execute(&mut *tx)
                    .await?;
                }
            }
            AuditDecision::Reject => {
                quote.transition_to(QuoteStatus::Returned)?;
            }
        }

        quote_store::store_quote(&mut tx, &mut quote).await?;
        let action = match decision {
            AuditDecision::Pass => WorkflowAction::Approve,
            AuditDecision::Reject => WorkflowAction::Reject,
        };
        append_event(&mut tx, &quote, previous, action, auditor_id, reason).await?;
        tx.commit().await?;

        tracing::info!(
            quote_no = %quote.quote_no,
            auditor = auditor_id,
            decision = decision.as_str(),
            "finance review recorded"
        );
        match decision {
            AuditDecision::Pass => {
                if let Some(collector) = quote.collector_id.clone() {
                    self.notify(
                        &collector,
                        "quote confirmed",
                        format!("quote {} is confirmed and ready for collection", quote.quote_no),
                        &quote,
                    );
                }
            }
            AuditDecision::Reject => {
                if let Some(confirmer) = quote.customer_confirmer_id.clone() {
                    self.notify(
                        &confirmer,
                        "quote returned",
                        format!(
                            "quote {} was returned: {}",
                            quote.quote_no,
                            reason.unwrap_or_default()
                        ),
                        &quote,
                    );
                }
            }
        }
        Ok(quote)
    }

    /// Step the quote back to its logical predecessor. Confirmed quotes with
    /// money collected or a downstream document cannot step back.
    pub async fn fallback(
        &self,
        quote_id: &QuoteId,
        operator_id: &str,
        reason: &str,
    ) -> Result<Quote, ServiceError> {
        if reason.trim().is_empty() {
            return Err(CoreError::validation("a fallback needs a reason").into());
        }

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut quote = quote_store::load_quote(&mut tx, quote_id).await?;
        quote.ensure_not_frozen()?;

        let target = quote.fallback_target()?;
        if quote.status == QuoteStatus::Confirmed {
            if quote.downstream_id.is_some() {
                return Err(CoreError::state_conflict(format!(
                    "quote {} already has a downstream document and cannot step back",
                    quote.quote_no
                ))
                .into());
            }
            if quote.paid_amount > Decimal::ZERO {
                return Err(CoreError::state_conflict(format!(
                    "quote {} has collected payments and cannot step back",
                    quote.quote_no
                ))
                .into());
            }
        }

        let previous = quote.status;
        quote.status = target;
        quote_store::store_quote(&mut tx, &mut quote).await?;
        append_event(&mut tx, &quote, previous, WorkflowAction::Fallback, operator_id, Some(reason))
            .await?;
        tx.commit().await?;

        tracing::info!(
            quote_no = %quote.quote_no,
            from = previous.as_str(),
            to = quote.status.as_str(),
            "quote stepped back"
        );
        Ok(quote)
    }

    /// The append-only event log, newest first.
    pub async fn workflow_events(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Vec<WorkflowEvent>, ServiceError> {
        let event_rows = sqlx::query(
            "SELECT quote_id, operator_id, action, previous_status, current_status,
                    reason, created_at
             FROM quote_workflow_events
             WHERE quote_id = ?
             ORDER BY id DESC",
        )
        .bind(&quote_id.0)
        .fetch_all(&self.pool)
        .await?;
        event_rows.iter().map(rows::workflow_event_from_row).collect()
    }

    fn notify(&self, user_id: &str, title: &str, content: String, quote: &Quote) {
        let notification = Notification {
            user_id: user_id.to_string(),
            title: title.to_string(),
            content,
            target_url: format!("/quotes/{}", quote.id.0),
        };
        if let Err(error) = self.notifications.send(notification) {
            tracing::warn!(%error, quote_no = %quote.quote_no, "notification delivery failed");
        }
    }
}

pub(crate) async fn append_event(
    conn: &mut SqliteConnection,
    quote: &Quote,
    previous: QuoteStatus,
    action: WorkflowAction,
    operator_id: &str,
    reason: Option<&str>,
) -> Result<(), ServiceError> {
    sqlx::query(
        "INSERT INTO quote_workflow_events
             (quote_id, operator_id, action, previous_status, current_status, reason, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&quote.id.0)
    .bind(operator_id)
    .bind(action.as_str())
    .bind(previous.as_str())
    .bind(quote.status.as_str())
    .bind(reason)
    .bind(Utc::now().to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}
