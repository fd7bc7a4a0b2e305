//! Boundaries to external collaborators. The engine only depends on these
//! traits; real implementations (master-data service, mail/IM gateway,
//! attachment store) live outside this workspace.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Lookups against customer master data. `resolve_name` produces display
/// snapshots only; `exists` gates drafts created against a customer id.
pub trait CustomerDirectory: Send + Sync {
    fn resolve_name(&self, customer_id: &str) -> Option<String>;
    fn exists(&self, customer_id: &str) -> bool;
}

/// A directory that knows nobody. Drafts against it must carry a customer
/// name instead of an id.
#[derive(Clone, Debug, Default)]
pub struct EmptyCustomerDirectory;

impl CustomerDirectory for EmptyCustomerDirectory {
    fn resolve_name(&self, _customer_id: &str) -> Option<String> {
        None
    }

    fn exists(&self, _customer_id: &str) -> bool {
        false
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub target_url: String,
}

/// Fire-and-forget notification delivery. Failures must never roll back the
/// financial transaction that triggered them; the caller logs and moves on.
pub trait NotificationSink: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), CoreError>;
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotificationSink {
    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn send(&self, notification: Notification) -> Result<(), CoreError> {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        Ok(())
    }
}

/// Where attachments are being checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentPoint {
    VoidApplication,
    PaymentRecord,
}

/// Mandatory-attachment rules. A rule miss is a validation error, reported
/// before any state changes.
pub trait AttachmentRules: Send + Sync {
    fn check(&self, point: AttachmentPoint, urls: &[String]) -> Result<(), CoreError>;
}

/// Default rule set: void applications need at least one attachment, nothing
/// may carry more than ten.
#[derive(Clone, Debug, Default)]
pub struct StandardAttachmentRules;

impl AttachmentRules for StandardAttachmentRules {
    fn check(&self, point: AttachmentPoint, urls: &[String]) -> Result<(), CoreError> {
        if urls.len() > 10 {
            return Err(CoreError::validation(format!(
                "at most 10 attachments allowed, got {}",
                urls.len()
            )));
        }
        if point == AttachmentPoint::VoidApplication && urls.is_empty() {
            return Err(CoreError::validation(
                "a void application requires at least one attachment",
            ));
        }
        Ok(())
    }
}
