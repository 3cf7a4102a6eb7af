//! In-memory [`CheckoutStore`] used by the service and router tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;
use crate::domain::aggregates::{Address, InventoryLevel, NewOrder, Order, OrderItem, OrderStatus, Payment, PaymentStatus, Product, Store};
use crate::domain::services::{inventory, StockConflict, StockEffect, Transition};
use crate::infrastructure::store::{CheckoutStore, StoreError};

#[derive(Default)]
pub struct MemoryState {
    pub stores: HashMap<String, Store>,
    pub products: Vec<Product>,
    pub addresses: HashMap<String, Address>,
    pub inventory: Vec<InventoryLevel>,
    pub orders: HashMap<Uuid, Order>,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    /// Holds `create_order` between the guard and the reservation until every party arrives.
    reservation_gate: Option<Arc<tokio::sync::Barrier>>,
}

impl MemoryStore {
    pub fn state(&self) -> MutexGuard<'_, MemoryState> { self.state.lock().expect("memory store poisoned") }

    pub fn with_store(self, store: Store) -> Self { self.state().stores.insert(store.id.clone(), store); self }
    pub fn with_product(self, product: Product) -> Self { self.state().products.push(product); self }
    pub fn with_address(self, address: Address) -> Self { self.state().addresses.insert(address.id.clone(), address); self }
    pub fn with_inventory(self, level: InventoryLevel) -> Self { self.state().inventory.push(level); self }
    pub fn with_reservation_gate(mut self, parties: usize) -> Self {
        self.reservation_gate = Some(Arc::new(tokio::sync::Barrier::new(parties)));
        self
    }

    pub fn order_count(&self) -> usize { self.state().orders.len() }

    pub fn inventory_level(&self, product_id: &str, variant_id: Option<&str>) -> Option<InventoryLevel> {
        self.state().inventory.iter().find(|l| l.matches(product_id, variant_id)).cloned()
    }
}

#[async_trait]
impl CheckoutStore for MemoryStore {
    async fn find_store(&self, store_id: &str) -> Result<Option<Store>, StoreError> {
        Ok(self.state().stores.get(store_id).cloned())
    }

    async fn load_catalog(&self, store_id: &str, product_ids: &[String]) -> Result<Vec<Product>, StoreError> {
        Ok(self
            .state()
            .products
            .iter()
            .filter(|p| p.store_id == store_id && p.active && product_ids.contains(&p.id))
            .map(|p| {
                let mut p = p.clone();
                p.variants.retain(|v| v.active);
                p
            })
            .collect())
    }

    async fn find_address(&self, address_id: &str) -> Result<Option<Address>, StoreError> {
        Ok(self.state().addresses.get(address_id).cloned())
    }

    /// Same two steps as Postgres: the guard reads a snapshot, then each line is reserved only
    /// if its sellable count still covers it.
    async fn create_order(&self, new: NewOrder) -> Result<(Order, Vec<OrderItem>), StoreError> {
        let snapshot = self.state().inventory.clone();
        inventory::check(&snapshot, &new.items)?;
        if let Some(gate) = &self.reservation_gate {
            gate.wait().await;
        }

        let mut state = self.state();
        let mut reserved: Vec<(usize, i32)> = Vec::with_capacity(new.items.len());
        for item in &new.items {
            let wanted = item.quantity.value() as i32;
            let position = state.inventory.iter().position(|l| l.matches(&item.product_id, item.variant_id.as_deref()));
            let available = position.map(|i| state.inventory[i].sellable()).unwrap_or(0);
            match position {
                Some(i) if available >= i64::from(wanted) => {
                    state.inventory[i].reserved += wanted;
                    reserved.push((i, wanted));
                }
                _ => {
                    for (i, qty) in reserved {
                        state.inventory[i].reserved -= qty;
                    }
                    return Err(StockConflict {
                        product_id: item.product_id.clone(),
                        variant_id: item.variant_id.clone(),
                        requested: item.quantity.value(),
                        available,
                    }
                    .into());
                }
            }
        }
        let order = Order::placed(&new);
        let items: Vec<OrderItem> = new.items.iter().map(|i| OrderItem::from_checkout(order.id, i)).collect();
        state.orders.insert(order.id, order.clone());
        state.items.extend(items.iter().cloned());
        Ok((order, items))
    }

    async fn attach_checkout_session(&self, order_id: Uuid, session_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state();
        match state.orders.get_mut(&order_id) {
            Some(order) if order.is_awaiting_payment() => {
                order.provider_checkout_session_id = Some(session_id.to_string());
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.state().orders.get(&order_id).cloned())
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        Ok(self.state().items.iter().filter(|i| i.order_id == order_id).cloned().collect())
    }

    async fn payments(&self, order_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        Ok(self.state().payments.iter().filter(|p| p.order_id == order_id).cloned().collect())
    }

    async fn apply_transition(
        &self,
        order_id: Uuid,
        expected: (OrderStatus, PaymentStatus),
        transition: &Transition,
    ) -> Result<bool, StoreError> {
        let mut guard = self.state();
        let state = &mut *guard;
        let Some(order) = state.orders.get_mut(&order_id) else { return Ok(false) };
        if (order.status, order.payment_status) != expected {
            return Ok(false);
        }
        order.status = transition.status;
        order.payment_status = transition.payment_status;
        if let Some(id) = &transition.checkout_session_id { order.provider_checkout_session_id = Some(id.clone()); }
        if let Some(id) = &transition.payment_intent_id { order.provider_payment_intent_id = Some(id.clone()); }
        if let Some(at) = transition.cancelled_at { order.cancelled_at = Some(at); }
        if let Some(reason) = &transition.cancel_reason { order.cancel_reason = Some(reason.clone()); }
        order.updated_at = Utc::now();

        if let Some(payment) = &transition.payment {
            state.payments.push(payment.clone());
        }
        if transition.stock != StockEffect::None {
            for item in state.items.iter().filter(|i| i.order_id == order_id) {
                if let Some(level) = state.inventory.iter_mut().find(|l| l.matches(&item.product_id, item.variant_id.as_deref())) {
                    let qty = item.quantity as i32;
                    if transition.stock == StockEffect::Commit {
                        level.quantity -= qty;
                    }
                    level.reserved = (level.reserved - qty).max(0);
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CheckoutError;
    use crate::testing::{self, PRODUCT_ID, VARIANT_ID};

    #[tokio::test]
    async fn test_reservation_conflict_after_both_pass_the_guard() {
        let store = testing::seeded_store().with_reservation_gate(2);
        let (first, second) = tokio::join!(
            store.create_order(testing::new_order(9)),
            store.create_order(testing::new_order(9)),
        );

        let (placed, lost) = match (first, second) {
            (Ok(placed), Err(lost)) | (Err(lost), Ok(placed)) => (placed, lost),
            other => panic!("expected exactly one reservation to win: {other:?}"),
        };
        assert_eq!(placed.0.status, OrderStatus::Pending);
        let StoreError::Stock(conflict) = &lost else { panic!("unexpected error {lost:?}") };
        assert_eq!((conflict.requested, conflict.available), (9, 0));
        assert_eq!(CheckoutError::from(lost).kind(), "stock_conflict");

        assert_eq!(store.order_count(), 1);
        let level = store.inventory_level(PRODUCT_ID, Some(VARIANT_ID)).unwrap();
        assert_eq!((level.quantity, level.reserved), (14, 9));
    }
}
