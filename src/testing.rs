//! Fixtures and doubles shared by the service and router tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;
use uuid::Uuid;
use crate::domain::aggregates::{
    Address, CustomerSnapshot, InventoryLevel, NewOrder, NormalizedItem, Order, OrderItem, Product, Store, Variant,
};
use crate::domain::services::pricing;
use crate::domain::value_objects::{Money, ProductSpecs, Quantity};
use crate::infrastructure::gateway::{
    CheckoutSession, CheckoutSessionRequest, GatewayError, PaymentGateway, ProviderEvent, SignatureError,
};
use crate::infrastructure::memory::MemoryStore;
use crate::infrastructure::stripe;
use crate::infrastructure::{AuthenticatedUser, CheckoutStore, IdentityError, IdentityService};

pub const USER_ID: &str = "user-1";
pub const OTHER_USER_ID: &str = "user-2";
pub const STORE_ID: &str = "store-1";
pub const PRODUCT_ID: &str = "p-shirt";
pub const VARIANT_ID: &str = "v-m";
pub const TOKEN: &str = "good-token";
pub const SIGNATURE: &str = "t=1,v1=trusted";

pub fn store() -> Store {
    Store {
        id: STORE_ID.into(),
        slug: "loja".into(),
        name: "Loja".into(),
        shipping_fee: Money::new(dec!(15)),
        free_shipping_threshold: Some(Money::new(dec!(199))),
    }
}

pub fn shirt() -> Product {
    Product {
        id: PRODUCT_ID.into(),
        store_id: STORE_ID.into(),
        name: "Shirt".into(),
        price: Money::new(dec!(59.90)),
        image_url: Some("https://cdn.example/shirt.png".into()),
        specifications: ProductSpecs::from_json(serde_json::json!({"fabric": "cotton"})).unwrap_or_default(),
        active: true,
        variants: vec![Variant {
            id: VARIANT_ID.into(),
            product_id: PRODUCT_ID.into(),
            name: "Size".into(),
            value: "M".into(),
            price: None,
            active: true,
        }],
    }
}

pub fn address(id: &str, user_id: &str) -> Address {
    Address {
        id: id.into(),
        user_id: user_id.into(),
        recipient: "Ana".into(),
        street: "Rua A".into(),
        number: Some("10".into()),
        complement: None,
        district: Some("Centro".into()),
        city: "São Paulo".into(),
        state: "SP".into(),
        postal_code: "01000-000".into(),
        country: "BR".into(),
    }
}

/// A store with one shirt variant: 14 in stock, minimum stock 5, so 9 sellable.
pub fn seeded_store() -> MemoryStore {
    MemoryStore::default()
        .with_store(store())
        .with_product(shirt())
        .with_address(address("addr-1", USER_ID))
        .with_address(address("addr-2", OTHER_USER_ID))
        .with_inventory(InventoryLevel {
            product_id: PRODUCT_ID.into(),
            variant_id: Some(VARIANT_ID.into()),
            quantity: 14,
            reserved: 0,
            min_stock: 5,
        })
}

pub fn user() -> AuthenticatedUser {
    AuthenticatedUser {
        id: USER_ID.into(),
        email: "ana@example.com".into(),
        name: "Ana".into(),
        phone: Some("+5511999990000".into()),
        cpf: None,
    }
}

/// Priced order for `quantity` shirts, ready for `create_order`.
pub fn new_order(quantity: u32) -> NewOrder {
    let line = NormalizedItem {
        product_id: PRODUCT_ID.into(),
        variant_id: Some(VARIANT_ID.into()),
        quantity: Quantity::new(quantity).unwrap(),
    };
    let priced = pricing::price_cart(&self::store(), &[shirt()], &[line]).unwrap();
    NewOrder {
        id: Uuid::now_v7(),
        user_id: USER_ID.into(),
        store_id: STORE_ID.into(),
        customer: CustomerSnapshot { name: Some("Ana".into()), email: "ana@example.com".into(), phone: None, tax_id: None },
        address: None,
        shipping_method: "standard".into(),
        currency: "brl".into(),
        items: priced.items,
        subtotal: priced.subtotal,
        shipping_fee: priced.shipping_fee,
        total: priced.total,
        created_at: Utc::now(),
    }
}

/// Places a PENDING order for `quantity` shirts straight through the store.
pub async fn place_order(store: &MemoryStore, quantity: u32) -> (Order, Vec<OrderItem>) {
    store.create_order(new_order(quantity)).await.unwrap()
}

/// Provider event body in the shape the provider posts to the webhook.
pub fn session_event(event_type: &str, order_id: Uuid, session_id: &str, intent: Option<&str>, payment_status: &str, amount_total: Option<i64>) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": format!("evt_{}", Uuid::now_v7().simple()),
        "type": event_type,
        "data": {"object": {
            "id": session_id,
            "object": "checkout.session",
            "payment_intent": intent,
            "payment_status": payment_status,
            "amount_total": amount_total,
            "metadata": {"order_id": order_id.to_string(), "store_id": STORE_ID, "user_id": USER_ID}
        }}
    }))
    .unwrap()
}

#[derive(Default)]
pub struct FakeGateway {
    fail: bool,
    sessions: AtomicUsize,
    requests: Mutex<Vec<CheckoutSessionRequest>>,
}

impl FakeGateway {
    pub fn failing() -> Self { Self { fail: true, ..Self::default() } }

    pub fn last_request(&self) -> Option<CheckoutSessionRequest> { self.requests.lock().unwrap().last().cloned() }

    pub fn request_count(&self) -> usize { self.requests.lock().unwrap().len() }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(GatewayError::Rejected { status: 503, body: "unavailable".into() });
        }
        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CheckoutSession { id: format!("cs_test_{n}"), url: format!("https://pay.example/cs_test_{n}") })
    }

    fn verify_and_parse_event(&self, payload: &[u8], signature: Option<&str>) -> Result<ProviderEvent, GatewayError> {
        match signature {
            None => Err(SignatureError::Missing.into()),
            Some(SIGNATURE) => Ok(stripe::parse_event(payload)?),
            Some(_) => Err(SignatureError::Mismatch.into()),
        }
    }
}

pub struct FakeIdentity;

#[async_trait]
impl IdentityService for FakeIdentity {
    async fn resolve(&self, token: &str) -> Result<Option<AuthenticatedUser>, IdentityError> {
        Ok((token == TOKEN).then(user))
    }
}
