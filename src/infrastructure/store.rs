//! Repository seam between the checkout services and the datastore of record.

use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::aggregates::{Address, NewOrder, Order, OrderItem, OrderStatus, Payment, PaymentStatus, Product, Store};
use crate::domain::services::{StockConflict, Transition};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Stock(#[from] StockConflict),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait CheckoutStore: Send + Sync {
    async fn find_store(&self, store_id: &str) -> Result<Option<Store>, StoreError>;

    /// Active products of `store_id` among `product_ids`, each with its active variants.
    async fn load_catalog(&self, store_id: &str, product_ids: &[String]) -> Result<Vec<Product>, StoreError>;

    async fn find_address(&self, address_id: &str) -> Result<Option<Address>, StoreError>;

    /// Creates the order, its items and the stock reservation atomically.
    ///
    /// Inventory is read inside the same transaction and checked with the inventory guard;
    /// the reservation itself is conditional, so a concurrent checkout that passed the guard
    /// for the same units fails with [`StoreError::Stock`] instead of overselling.
    async fn create_order(&self, order: NewOrder) -> Result<(Order, Vec<OrderItem>), StoreError>;

    /// Records the checkout session id while the order still awaits payment.
    /// Returns false when the order has already moved on; statuses are never touched.
    async fn attach_checkout_session(&self, order_id: Uuid, session_id: &str) -> Result<bool, StoreError>;

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError>;

    async fn payments(&self, order_id: Uuid) -> Result<Vec<Payment>, StoreError>;

    /// Applies `transition` only if the order is still in `expected`. Returns false otherwise.
    async fn apply_transition(
        &self,
        order_id: Uuid,
        expected: (OrderStatus, PaymentStatus),
        transition: &Transition,
    ) -> Result<bool, StoreError>;
}
