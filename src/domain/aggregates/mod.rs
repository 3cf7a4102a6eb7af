//! Aggregates module
pub mod cart;
pub mod catalog;
pub mod order;

pub use cart::{CartItemRequest, CheckoutRequest, NormalizedCart, NormalizedItem, ValidationIssue};
pub use catalog::{Address, InventoryLevel, Product, Store, Variant};
pub use order::{CheckoutItem, CustomerSnapshot, NewOrder, Order, OrderItem, OrderStatus, Payment, PaymentStatus};
