//! Storefront checkout and order fulfillment
//!
//! Turns an untrusted cart into a priced, stock-checked order, hands payment off to a hosted
//! checkout provider and reconciles the provider's webhooks back onto the order.
//!
//! ## Flow
//! - Cart normalization and strict payload validation
//! - Price recalculation from the catalog
//! - Inventory guard and reservation
//! - Order creation and hosted payment session
//! - Webhook reconciliation through the order state machine

pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{router, AppState};
pub use config::Config;
pub use error::CheckoutError;
