//! Checkout domain: untrusted cart in, priced and guarded order out, payments reconciled.
pub mod aggregates;
pub mod events;
pub mod services;
pub mod value_objects;
