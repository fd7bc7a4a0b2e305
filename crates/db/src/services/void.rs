//! Void sub-flow: a collector applies to cancel a confirmed quote, finance
//! reviews the application, or finance voids directly. The quote is frozen
//! (`void_status = Applying`) while an application is under review.

use std::sync::Arc;

use chrono::Utc;
use settly_core::domain::events::WorkflowAction;
use settly_core::domain::quote::{Quote, QuoteId, QuoteStatus, VoidStatus};
use settly_core::domain::void::{AuditDecision, VoidApplication, VoidApplicationId};
use settly_core::errors::CoreError;
use settly_core::ports::{AttachmentPoint, AttachmentRules, Notification, NotificationSink};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{quote as quote_store, workflow, ServiceError};
use crate::rows;
use crate::DbPool;

pub struct QuoteVoidService {
    pool: DbPool,
    attachments: Arc<dyn AttachmentRules>,
    notifications: Arc<dyn NotificationSink>,
}

impl QuoteVoidService {
    pub fn new(
        pool: DbPool,
        attachments: Arc<dyn AttachmentRules>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self { pool, attachments, notifications }
    }

    /// Open a void application. Only the quote's collector may apply, only
    /// for a confirmed quote, and only one application can be under review.
    pub async fn apply_void(
        &self,
        quote_id: &QuoteId,
        applicant_id: &str,
        reason: &str,
        attachment_urls: Vec<String>,
    ) -> Result<VoidApplication, ServiceError> {
        if reason.trim().is_empty() {
            return Err(CoreError::validation("a void application needs a reason").into());
        }
        self.attachments.check(AttachmentPoint::VoidApplication, &attachment_urls)?;

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut quote = quote_store::load_quote(&mut tx, quote_id).await?;

        if quote.status == QuoteStatus::Cancelled {
            return Err(CoreError::state_conflict(format!(
                "quote {} is already cancelled",
                quote.quote_no
            ))
            .into());
        }
        if quote.status != QuoteStatus::Confirmed {
            return Err(CoreError::state_conflict(format!(
                "only a confirmed quote can be voided; {} is {}",
                quote.quote_no,
                quote.status.as_str()
            ))
            .into());
        }
        if quote.void_status == VoidStatus::Applying {
            return Err(CoreError::state_conflict(format!(
                "quote {} already has a void application under review",
                quote.quote_no
            ))
            .into());
        }
        if quote.collector_id.as_deref() != Some(applicant_id) {
            return Err(CoreError::permission(format!(
                "only the collector of quote {} may apply to void it",
                quote.quote_no
            ))
            .into());
        }

        let application = VoidApplication {
            id: VoidApplicationId(Uuid::new_v4().to_string()),
            quote_id: quote.id.clone(),
            applicant_id: applicant_id.to_string(),
            apply_reason: reason.to_string(),
            apply_time: Utc::now(),
            attachment_urls,
            auditor_id: None,
            audit_time: None,
            audit_result: None,
            audit_note: None,
        };
        insert_application(&mut tx, &application).await?;

        quote.void_status = VoidStatus::Applying;
        quote_store::store_quote(&mut tx, &mut quote).await?;
        tx.commit().await?;

        tracing::info!(quote_no = %quote.quote_no, applicant = applicant_id, "void application opened");
        Ok(application)
    }

    /// Review a pending application. `Pass` cancels the quote and its
    /// unconfirmed payments; `Reject` lifts the freeze.
    pub async fn audit_void(
        &self,
        application_id: &VoidApplicationId,
        auditor_id: &str,
        decision: AuditDecision,
        note: Option<&str>,
    ) -> Result<VoidApplication, ServiceError> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut application = load_application(&mut tx, application_id).await?;
        if application.is_audited() {
            return Err(CoreError::state_conflict(format!(
                "void application {} was already reviewed",
                application_id.0
            ))
            .into());
        }

        let mut quote = quote_store::load_quote(&mut tx, &application.quote_id).await?;
        let previous = quote.status;

        match decision {
            AuditDecision::Pass => {
                quote.transition_to(QuoteStatus::Cancelled)?;
                quote.void_status = VoidStatus::Voided;
                quote_store::store_quote(&mut tx, &mut quote).await?;
                workflow::append_event(
                    &mut tx,
                    &quote,
                    previous,
                    WorkflowAction::Void,
                    auditor_id,
                    Some(&application.apply_reason),
                )
                .await?;
                cancel_draft_payments(&mut tx, &quote.id).await?;
            }
            AuditDecision::Reject => {
                quote.void_status = VoidStatus::Rejected;
                quote_store::store_quote(&mut tx, &mut quote).await?;
            }
        }

        let now = Utc::now();
        application.auditor_id = Some(auditor_id.to_string());
        application.audit_time = Some(now);
        application.audit_result = Some(decision);
        application.audit_note = note.map(str::to_string);
        sqlx::query(
            "UPDATE void_applications
             SET auditor_id = ?, audit_time = ?, audit_result = ?, audit_note = ?
             WHERE id = ?",
        )
        .bind(auditor_id)
        .bind(now.to_rfc3339())
        .bind(decision.as_str())
        .bind(note)
        .bind(&application_id.0)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(
            quote_no = %quote.quote_no,
            auditor = auditor_id,
            decision = decision.as_str(),
            "void application reviewed"
        );
        self.notify_applicant(&application, &quote, decision);
        Ok(application)
    }

    /// Finance voids a confirmed quote without a collector application. An
    /// auto-approved application is still written so the audit trail stays
    /// complete.
    pub async fn direct_void(
        &self,
        quote_id: &QuoteId,
        auditor_id: &str,
        reason: &str,
    ) -> Result<Quote, ServiceError> {
        if reason.trim().is_empty() {
            return Err(CoreError::validation("a direct void needs a reason").into());
        }

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut quote = quote_store::load_quote(&mut tx, quote_id).await?;
        if quote.void_status == VoidStatus::Applying {
            return Err(CoreError::state_conflict(format!(
                "quote {} has a void application under review; review it instead",
                quote.quote_no
            ))
            .into());
        }

        let previous = quote.status;
        quote.transition_to(QuoteStatus::Cancelled)?;
        quote.void_status = VoidStatus::Voided;
        quote_store::store_quote(&mut tx, &mut quote).await?;

        let now = Utc::now();
        let application = VoidApplication {
            id: VoidApplicationId(Uuid::new_v4().to_string()),
            quote_id: quote.id.clone(),
            applicant_id: auditor_id.to_string(),
            apply_reason: reason.to_string(),
            apply_time: now,
            attachment_urls: Vec::new(),
            auditor_id: Some(auditor_id.to_string()),
            audit_time: Some(now),
            audit_result: Some(AuditDecision::Pass),
            audit_note: Some("direct void".to_string()),
        };
        insert_application(&mut tx, &application).await?;
        workflow::append_event(
            &mut tx,
            &quote,
            previous,
            WorkflowAction::Void,
            auditor_id,
            Some(reason),
        )
        .await?;
        cancel_draft_payments(&mut tx, &quote.id).await?;
        tx.commit().await?;

        tracing::info!(quote_no = %quote.quote_no, auditor = auditor_id, "quote voided directly");
        Ok(quote)
    }

    pub async fn get_application(
        &self,
        application_id: &VoidApplicationId,
    ) -> Result<VoidApplication, ServiceError> {
        let mut conn = self.pool.acquire().await?;
        load_application(&mut conn, application_id).await
    }

    fn notify_applicant(&self, application: &VoidApplication, quote: &Quote, decision: AuditDecision) {
        let (title, content) = match decision {
            AuditDecision::Pass => (
                "void application approved",
                format!("quote {} has been cancelled", quote.quote_no),
            ),
            AuditDecision::Reject => (
                "void application rejected",
                format!("the void application for quote {} was rejected", quote.quote_no),
            ),
        };
        let notification = Notification {
            user_id: application.applicant_id.clone(),
            title: title.to_string(),
            content,
            target_url: format!("/quotes/{}", quote.id.0),
        };
        if let Err(error) = self.notifications.send(notification) {
            tracing::warn!(%error, quote_no = %quote.quote_no, "notification delivery failed");
        }
    }
}

async fn insert_application(
    conn: &mut SqliteConnection,
    application: &VoidApplication,
) -> Result<(), ServiceError> {
    let urls = serde_json::to_string(&application.attachment_urls)
        .map_err(|error| ServiceError::Decode(format!("attachment_urls: {error}")))?;
    sqlx::query(
        "INSERT INTO void_applications (
             id, quote_id, applicant_id, apply_reason, apply_time, attachment_urls,
             auditor_id, audit_time, audit_result, audit_note
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&application.id.0)
    .bind(&application.quote_id.0)
    .bind(&application.applicant_id)
    .bind(&application.apply_reason)
    .bind(application.apply_time.to_rfc3339())
    .bind(urls)
    .bind(application.auditor_id.as_deref())
    .bind(application.audit_time.map(|time| time.to_rfc3339()))
    .bind(application.audit_result.map(|result| result.as_str()))
    .bind(application.audit_note.as_deref())
    .execute(conn)
    .await?;
    Ok(())
}

async fn load_application(
    conn: &mut SqliteConnection,
    application_id: &VoidApplicationId,
) -> Result<VoidApplication, ServiceError> {
    let row = sqlx::query("SELECT * FROM void_applications WHERE id = ?")
        .bind(&application_id.0)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| {
            CoreError::not_found(format!("void application {} does not exist", application_id.0))
        })?;
    rows::void_application_from_row(&row)
}

/// Unconfirmed payments aimed at a voided quote are dead; cancel them so
/// they can never confirm against a cancelled quote.
async fn cancel_draft_payments(
    conn: &mut SqliteConnection,
    quote_id: &QuoteId,
) -> Result<(), ServiceError> {
    let result = sqlx::query(
        "UPDATE payments SET status = 'CANCELLED'
         WHERE status = 'DRAFT'
           AND id IN (SELECT payment_id FROM payment_allocations WHERE quote_id = ?)",
    )
    .bind(&quote_id.0)
    .execute(conn)
    .await?;
    if result.rows_affected() > 0 {
        tracing::info!(
            quote = %quote_id.0,
            cancelled = result.rows_affected(),
            "draft payments cancelled with voided quote"
        );
    }
    Ok(())
}
