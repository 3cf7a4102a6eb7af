//! Checkout orchestration: normalize, reprice, guard stock, place the order, open a payment session.

use std::sync::Arc;
use chrono::Utc;
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;
use crate::application::payment_session::PaymentSessionBridge;
use crate::domain::aggregates::{Address, CustomerSnapshot, NewOrder, NormalizedCart, Order, OrderItem, Payment};
use crate::domain::events::OrderEvent;
use crate::domain::services::pricing;
use crate::error::CheckoutError;
use crate::infrastructure::{AuthenticatedUser, CheckoutStore, EventPublisher};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
    pub order_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn CheckoutStore>,
    sessions: PaymentSessionBridge,
    events: EventPublisher,
    currency: String,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn CheckoutStore>, sessions: PaymentSessionBridge, events: EventPublisher, currency: impl Into<String>) -> Self {
        Self { store, sessions, events, currency: currency.into() }
    }

    /// Runs a full checkout for `user` from the raw request body.
    ///
    /// Every lookup and check happens before the order is written; the order, its items and
    /// the stock reservation are then created in one step.
    #[instrument(skip_all, fields(user_id = %user.id))]
    pub async fn checkout(&self, user: &AuthenticatedUser, body: &[u8]) -> Result<CheckoutResponse, CheckoutError> {
        let cart = NormalizedCart::from_body(body).map_err(CheckoutError::Validation)?;

        let store = self
            .store
            .find_store(&cart.store_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("store", &cart.store_id))?;

        let product_ids: Vec<String> = cart.items.iter().map(|i| i.product_id.clone()).collect();
        let catalog = self.store.load_catalog(&store.id, &product_ids).await?;
        let priced = pricing::price_cart(&store, &catalog, &cart.items)?;

        let address = match &cart.address_id {
            Some(id) => Some(self.owned_address(user, id).await?),
            None => None,
        };

        let new = NewOrder {
            id: Uuid::now_v7(),
            user_id: user.id.clone(),
            store_id: store.id.clone(),
            customer: CustomerSnapshot {
                name: Some(user.name.clone()),
                email: user.email.clone(),
                phone: user.phone.clone(),
                tax_id: user.cpf.clone(),
            },
            address,
            shipping_method: cart.shipping_method,
            currency: self.currency.clone(),
            items: priced.items,
            subtotal: priced.subtotal,
            shipping_fee: priced.shipping_fee,
            total: priced.total,
            created_at: Utc::now(),
        };
        let (order, items) = self.store.create_order(new).await?;
        tracing::info!(order_id = %order.id, total = %order.total, lines = items.len(), "order placed");
        self.events
            .publish(&OrderEvent::Placed {
                order_id: order.id,
                store_id: order.store_id.clone(),
                user_id: order.user_id.clone(),
                total: order.total,
            })
            .await;

        let session = self.sessions.open(&store, &order, &items).await?;
        Ok(CheckoutResponse { session_id: session.id, url: session.url, order_id: order.id })
    }

    /// Opens a fresh payment session for an order of `user` that still awaits payment.
    #[instrument(skip_all, fields(user_id = %user.id, %order_id))]
    pub async fn retry_session(&self, user: &AuthenticatedUser, order_id: Uuid) -> Result<CheckoutResponse, CheckoutError> {
        let order = self.owned_order(user, order_id).await?;
        if !order.is_awaiting_payment() {
            return Err(CheckoutError::InvalidState { order_id, status: order.status, payment_status: order.payment_status });
        }
        let store = self
            .store
            .find_store(&order.store_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("store", &order.store_id))?;
        let items = self.store.order_items(order_id).await?;
        let session = self.sessions.open(&store, &order, &items).await?;
        Ok(CheckoutResponse { session_id: session.id, url: session.url, order_id })
    }

    pub async fn get_order(&self, user: &AuthenticatedUser, order_id: Uuid) -> Result<OrderView, CheckoutError> {
        let order = self.owned_order(user, order_id).await?;
        let items = self.store.order_items(order_id).await?;
        let payments = self.store.payments(order_id).await?;
        Ok(OrderView { order, items, payments })
    }

    // Someone else's address or order is reported exactly like a missing one.
    async fn owned_address(&self, user: &AuthenticatedUser, address_id: &str) -> Result<Address, CheckoutError> {
        match self.store.find_address(address_id).await? {
            Some(address) if address.user_id == user.id => Ok(address),
            _ => Err(CheckoutError::not_found("address", address_id)),
        }
    }

    async fn owned_order(&self, user: &AuthenticatedUser, order_id: Uuid) -> Result<Order, CheckoutError> {
        match self.store.find_order(order_id).await? {
            Some(order) if order.user_id == user.id => Ok(order),
            _ => Err(CheckoutError::not_found("order", order_id.to_string())),
        }
    }
}
