//! Adapters: datastore, payment provider, identity service and event bus.

pub mod events;
pub mod gateway;
pub mod identity;
pub mod postgres;
pub mod store;
pub mod stripe;

#[cfg(test)]
pub mod memory;

pub use events::EventPublisher;
pub use gateway::{CheckoutSession, CheckoutSessionRequest, GatewayError, PaymentGateway, ProviderEvent, ProviderEventKind};
pub use identity::{AuthenticatedUser, HttpIdentityService, IdentityError, IdentityService};
pub use postgres::PgCheckoutStore;
pub use store::{CheckoutStore, StoreError};
pub use stripe::StripeGateway;
