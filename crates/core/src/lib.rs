pub mod config;
pub mod domain;
pub mod errors;
pub mod numbering;
pub mod ports;
pub mod pricing;

pub use config::{AppConfig, ConfigError, DatabaseConfig, LoadOptions, LogFormat, LoggingConfig};
pub use domain::contract::{ContractId, ContractPriceHeader, ContractPriceItem, ContractStatus};
pub use domain::events::{CollectorChangeEvent, WorkflowAction, WorkflowEvent};
pub use domain::payment::{
    OverpaymentStrategy, Payment, PaymentAllocation, PaymentId, PaymentStatus,
};
pub use domain::quote::{
    Currency, DownstreamType, ExpenseType, Quote, QuoteId, QuoteItem, QuoteItemId,
    QuotePaymentStatus, QuoteSourceType, QuoteStatus, VoidStatus,
};
pub use domain::statement::{
    AccountStatement, AccountStatementItem, StatementId, StatementStatus,
};
pub use domain::void::{AuditDecision, VoidApplication, VoidApplicationId};
pub use errors::CoreError;
pub use ports::{
    AttachmentPoint, AttachmentRules, CustomerDirectory, Notification, NotificationSink,
};
pub use pricing::{PriceSourceInfo, PriceStrategy, PriceSuggestion};
