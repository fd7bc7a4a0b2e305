pub mod contract;
pub mod events;
pub mod payment;
pub mod quote;
pub mod statement;
pub mod void;
