//! Domain services
pub mod inventory;
pub mod lifecycle;
pub mod pricing;

pub use inventory::StockConflict;
pub use lifecycle::{Decision, OrderStateMachine, PaymentSignal, StockEffect, Transition};
pub use pricing::{PricedCart, PricingError};
