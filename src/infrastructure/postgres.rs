//! PostgreSQL implementation of [`CheckoutStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;
use crate::domain::aggregates::{
    Address, CustomerSnapshot, InventoryLevel, NewOrder, Order, OrderItem, OrderStatus, Payment, PaymentStatus, Product, Store, Variant,
};
use crate::domain::services::{inventory, StockConflict, StockEffect, Transition};
use crate::domain::value_objects::{Money, ProductSpecs, SpecSnapshot};
use crate::infrastructure::store::{CheckoutStore, StoreError};

#[derive(Clone)]
pub struct PgCheckoutStore {
    pool: PgPool,
}

impl PgCheckoutStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[derive(sqlx::FromRow)]
struct StoreRow { id: String, slug: String, name: String, shipping_fee: Money, free_shipping_threshold: Option<Money> }

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String, store_id: String, name: String, price: Money,
    image_url: Option<String>, specifications: Json<serde_json::Value>, active: bool,
}

#[derive(sqlx::FromRow)]
struct VariantRow { id: String, product_id: String, name: String, value: String, price: Option<Money>, active: bool }

#[derive(sqlx::FromRow)]
struct InventoryRow { product_id: String, variant_id: Option<String>, quantity: i32, reserved: i32, min_stock: i32 }

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: String, user_id: String, recipient: String, street: String, number: Option<String>, complement: Option<String>,
    district: Option<String>, city: String, state: String, postal_code: String, country: String,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, user_id: String, store_id: String,
    customer_name: Option<String>, customer_email: String, customer_phone: Option<String>, customer_tax_id: Option<String>,
    address_id: Option<String>, shipping_address: Option<Json<Address>>,
    status: String, payment_status: String,
    subtotal: Money, shipping_fee: Money, total: Money, currency: String, shipping_method: String,
    provider_checkout_session_id: Option<String>, provider_payment_intent_id: Option<String>,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>, cancelled_at: Option<DateTime<Utc>>, cancel_reason: Option<String>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid, order_id: Uuid, product_id: String, variant_id: Option<String>, quantity: i32,
    unit_price: Money, total_price: Money, product_name: String, product_image: Option<String>,
    specifications: Json<SpecSnapshot>,
}

#[derive(sqlx::FromRow)]
struct PaymentRow { id: Uuid, order_id: Uuid, method: String, amount: Money, status: String, provider_payment_id: String, paid_at: DateTime<Utc> }

impl From<StoreRow> for Store {
    fn from(r: StoreRow) -> Self {
        Store { id: r.id, slug: r.slug, name: r.name, shipping_fee: r.shipping_fee, free_shipping_threshold: r.free_shipping_threshold }
    }
}

impl From<VariantRow> for Variant {
    fn from(r: VariantRow) -> Self {
        Variant { id: r.id, product_id: r.product_id, name: r.name, value: r.value, price: r.price, active: r.active }
    }
}

impl From<InventoryRow> for InventoryLevel {
    fn from(r: InventoryRow) -> Self {
        InventoryLevel { product_id: r.product_id, variant_id: r.variant_id, quantity: r.quantity, reserved: r.reserved, min_stock: r.min_stock }
    }
}

impl From<AddressRow> for Address {
    fn from(r: AddressRow) -> Self {
        Address {
            id: r.id, user_id: r.user_id, recipient: r.recipient, street: r.street, number: r.number, complement: r.complement,
            district: r.district, city: r.city, state: r.state, postal_code: r.postal_code, country: r.country,
        }
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let id = r.id;
        Ok(Order {
            id: r.id,
            user_id: r.user_id,
            store_id: r.store_id,
            customer: CustomerSnapshot { name: r.customer_name, email: r.customer_email, phone: r.customer_phone, tax_id: r.customer_tax_id },
            address_id: r.address_id,
            shipping_address: r.shipping_address.map(|a| a.0),
            status: r.status.parse().map_err(|e| StoreError::Corrupt(format!("order {id}: {e}")))?,
            payment_status: r.payment_status.parse().map_err(|e| StoreError::Corrupt(format!("order {id}: {e}")))?,
            subtotal: r.subtotal,
            shipping_fee: r.shipping_fee,
            total: r.total,
            currency: r.currency,
            shipping_method: r.shipping_method,
            provider_checkout_session_id: r.provider_checkout_session_id,
            provider_payment_intent_id: r.provider_payment_intent_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
            cancelled_at: r.cancelled_at,
            cancel_reason: r.cancel_reason,
        })
    }
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = StoreError;
    fn try_from(r: OrderItemRow) -> Result<Self, Self::Error> {
        let (id, quantity) = (r.id, r.quantity);
        Ok(OrderItem {
            id: r.id,
            order_id: r.order_id,
            product_id: r.product_id,
            variant_id: r.variant_id,
            quantity: u32::try_from(r.quantity).map_err(|_| StoreError::Corrupt(format!("order item {id}: quantity {quantity}")))?,
            unit_price: r.unit_price,
            total_price: r.total_price,
            product_name: r.product_name,
            product_image: r.product_image,
            specifications: r.specifications.0,
        })
    }
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;
    fn try_from(r: PaymentRow) -> Result<Self, Self::Error> {
        let id = r.id;
        Ok(Payment {
            id: r.id,
            order_id: r.order_id,
            method: r.method,
            amount: r.amount,
            status: r.status.parse().map_err(|e| StoreError::Corrupt(format!("payment {id}: {e}")))?,
            provider_payment_id: r.provider_payment_id,
            paid_at: r.paid_at,
        })
    }
}

const ORDER_COLUMNS: &str = "id, user_id, store_id, customer_name, customer_email, customer_phone, customer_tax_id, address_id, \
    shipping_address, status, payment_status, subtotal, shipping_fee, total, currency, shipping_method, \
    provider_checkout_session_id, provider_payment_intent_id, created_at, updated_at, cancelled_at, cancel_reason";

#[async_trait]
impl CheckoutStore for PgCheckoutStore {
    async fn find_store(&self, store_id: &str) -> Result<Option<Store>, StoreError> {
        let row = sqlx::query_as::<_, StoreRow>("SELECT id, slug, name, shipping_fee, free_shipping_threshold FROM stores WHERE id = $1")
            .bind(store_id).fetch_optional(&self.pool).await?;
        Ok(row.map(Into::into))
    }

    async fn load_catalog(&self, store_id: &str, product_ids: &[String]) -> Result<Vec<Product>, StoreError> {
        let products = sqlx::query_as::<_, ProductRow>(
            "SELECT id, store_id, name, price, image_url, specifications, active FROM products \
             WHERE store_id = $1 AND active AND id = ANY($2)",
        )
        .bind(store_id).bind(product_ids).fetch_all(&self.pool).await?;
        let ids: Vec<String> = products.iter().map(|p| p.id.clone()).collect();
        let variants = sqlx::query_as::<_, VariantRow>(
            "SELECT id, product_id, name, value, price, active FROM product_variants WHERE product_id = ANY($1) AND active",
        )
        .bind(&ids).fetch_all(&self.pool).await?;

        let variants: Vec<Variant> = variants.into_iter().map(Into::into).collect();
        products
            .into_iter()
            .map(|p| {
                let specifications = ProductSpecs::from_json(p.specifications.0)
                    .ok_or_else(|| StoreError::Corrupt(format!("product {}: specifications must be an object", p.id)))?;
                let own = variants.iter().filter(|v| v.product_id == p.id).cloned().collect();
                Ok(Product {
                    id: p.id, store_id: p.store_id, name: p.name, price: p.price,
                    image_url: p.image_url, specifications, active: p.active, variants: own,
                })
            })
            .collect()
    }

    async fn find_address(&self, address_id: &str) -> Result<Option<Address>, StoreError> {
        let row = sqlx::query_as::<_, AddressRow>(
            "SELECT id, user_id, recipient, street, number, complement, district, city, state, postal_code, country \
             FROM addresses WHERE id = $1",
        )
        .bind(address_id).fetch_optional(&self.pool).await?;
        Ok(row.map(Into::into))
    }

    async fn create_order(&self, new: NewOrder) -> Result<(Order, Vec<OrderItem>), StoreError> {
        let mut tx = self.pool.begin().await?;

        let product_ids: Vec<String> = new.items.iter().map(|i| i.product_id.clone()).collect();
        let levels: Vec<InventoryLevel> = sqlx::query_as::<_, InventoryRow>(
            "SELECT product_id, variant_id, quantity, reserved, min_stock FROM inventory WHERE product_id = ANY($1)",
        )
        .bind(&product_ids).fetch_all(&mut *tx).await?
        .into_iter().map(Into::into).collect();
        inventory::check(&levels, &new.items)?;

        for item in &new.items {
            let requested = item.quantity.value();
            let reserved = sqlx::query(
                "UPDATE inventory SET reserved = reserved + $3, updated_at = NOW() \
                 WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2 AND quantity - reserved - min_stock >= $3",
            )
            .bind(&item.product_id).bind(&item.variant_id).bind(requested as i32)
            .execute(&mut *tx).await?;
            if reserved.rows_affected() == 0 {
                // Another checkout reserved these units after our read.
                let current = sqlx::query_as::<_, InventoryRow>(
                    "SELECT product_id, variant_id, quantity, reserved, min_stock FROM inventory \
                     WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2",
                )
                .bind(&item.product_id).bind(&item.variant_id)
                .fetch_optional(&mut *tx).await?;
                let available = current.map(|row| InventoryLevel::from(row).sellable()).unwrap_or(0);
                return Err(StockConflict { product_id: item.product_id.clone(), variant_id: item.variant_id.clone(), requested, available }.into());
            }
        }

        let order = Order::placed(&new);
        sqlx::query(
            "INSERT INTO orders (id, user_id, store_id, customer_name, customer_email, customer_phone, customer_tax_id, address_id, \
             shipping_address, status, payment_status, subtotal, shipping_fee, total, currency, shipping_method, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $17)",
        )
        .bind(order.id).bind(&order.user_id).bind(&order.store_id)
        .bind(&order.customer.name).bind(&order.customer.email).bind(&order.customer.phone).bind(&order.customer.tax_id)
        .bind(&order.address_id).bind(order.shipping_address.as_ref().map(Json))
        .bind(order.status.as_str()).bind(order.payment_status.as_str())
        .bind(order.subtotal).bind(order.shipping_fee).bind(order.total)
        .bind(&order.currency).bind(&order.shipping_method).bind(order.created_at)
        .execute(&mut *tx).await?;

        let items: Vec<OrderItem> = new.items.iter().map(|i| OrderItem::from_checkout(order.id, i)).collect();
        for item in &items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, variant_id, quantity, unit_price, total_price, product_name, \
                 product_image, specifications) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(item.id).bind(item.order_id).bind(&item.product_id).bind(&item.variant_id).bind(item.quantity as i32)
            .bind(item.unit_price).bind(item.total_price).bind(&item.product_name).bind(&item.product_image)
            .bind(Json(&item.specifications))
            .execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok((order, items))
    }

    async fn attach_checkout_session(&self, order_id: Uuid, session_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET provider_checkout_session_id = $2, updated_at = NOW() \
             WHERE id = $1 AND status = $3 AND payment_status = $4",
        )
        .bind(order_id).bind(session_id).bind(OrderStatus::Pending.as_str()).bind(PaymentStatus::Pending.as_str())
        .execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id).fetch_optional(&self.pool).await?;
        row.map(Order::try_from).transpose()
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, order_id, product_id, variant_id, quantity, unit_price, total_price, product_name, product_image, specifications \
             FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id).fetch_all(&self.pool).await?
        .into_iter().map(OrderItem::try_from).collect()
    }

    async fn payments(&self, order_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        sqlx::query_as::<_, PaymentRow>(
            "SELECT id, order_id, method, amount, status, provider_payment_id, paid_at FROM payments WHERE order_id = $1 ORDER BY paid_at",
        )
        .bind(order_id).fetch_all(&self.pool).await?
        .into_iter().map(Payment::try_from).collect()
    }

    async fn apply_transition(
        &self,
        order_id: Uuid,
        expected: (OrderStatus, PaymentStatus),
        transition: &Transition,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE orders SET status = $4, payment_status = $5, \
             provider_checkout_session_id = COALESCE($6, provider_checkout_session_id), \
             provider_payment_intent_id = COALESCE($7, provider_payment_intent_id), \
             cancelled_at = COALESCE($8, cancelled_at), cancel_reason = COALESCE($9, cancel_reason), updated_at = NOW() \
             WHERE id = $1 AND status = $2 AND payment_status = $3",
        )
        .bind(order_id).bind(expected.0.as_str()).bind(expected.1.as_str())
        .bind(transition.status.as_str()).bind(transition.payment_status.as_str())
        .bind(&transition.checkout_session_id).bind(&transition.payment_intent_id)
        .bind(transition.cancelled_at).bind(&transition.cancel_reason)
        .execute(&mut *tx).await?;
        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        if let Some(payment) = &transition.payment {
            sqlx::query(
                "INSERT INTO payments (id, order_id, method, amount, status, provider_payment_id, paid_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(payment.id).bind(payment.order_id).bind(&payment.method).bind(payment.amount)
            .bind(payment.status.as_str()).bind(&payment.provider_payment_id).bind(payment.paid_at)
            .execute(&mut *tx).await?;
        }

        let stock = match transition.stock {
            StockEffect::None => None,
            StockEffect::Commit => Some("quantity = i.quantity - oi.quantity, reserved = GREATEST(i.reserved - oi.quantity, 0)"),
            StockEffect::Release => Some("reserved = GREATEST(i.reserved - oi.quantity, 0)"),
        };
        if let Some(assignments) = stock {
            sqlx::query(&format!(
                "UPDATE inventory i SET {assignments}, updated_at = NOW() FROM order_items oi \
                 WHERE oi.order_id = $1 AND i.product_id = oi.product_id AND i.variant_id IS NOT DISTINCT FROM oi.variant_id"
            ))
            .bind(order_id)
            .execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(true)
    }
}
