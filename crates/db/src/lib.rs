pub mod connection;
pub mod migrations;
mod rows;
pub mod services;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use services::{
    BatchPaymentRequest, ContractPriceBook, CreateDraftCommand, CreatePaymentCommand, ItemCommand,
    PaymentService, PriceBookCommand, QuoteService, QuoteVoidService, QuoteWorkflowService,
    ServiceError, StatementService, UpdateHeaderCommand,
};
