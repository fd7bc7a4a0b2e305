use settly_core::errors::CoreError;
use thiserror::Error;

pub mod contract;
pub mod payment;
pub mod quote;
pub mod statement;
pub mod void;
pub mod workflow;

pub use contract::{ContractPriceBook, PriceBookCommand};
pub use payment::{BatchPaymentRequest, CreatePaymentCommand, PaymentService};
pub use quote::{CreateDraftCommand, ItemCommand, QuoteService, UpdateHeaderCommand};
pub use statement::StatementService;
pub use void::QuoteVoidService;
pub use workflow::QuoteWorkflowService;

/// Persistence-layer failure envelope. Domain failures pass through so
/// callers can still match on the four `CoreError` kinds.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] CoreError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl ServiceError {
    /// The domain failure, if this is one. Used by tests and by transports
    /// that map the taxonomy onto response codes.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            Self::Domain(error) => Some(error),
            _ => None,
        }
    }
}
