//! Use cases behind the HTTP surface.

pub mod checkout;
pub mod payment_session;
pub mod webhook;

pub use checkout::{CheckoutResponse, CheckoutService, OrderView};
pub use payment_session::PaymentSessionBridge;
pub use webhook::{WebhookOutcome, WebhookReconciler};
