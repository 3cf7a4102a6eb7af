//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::catalog::Address;
use crate::domain::value_objects::{Money, Quantity, SpecSnapshot};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus { #[default] Pending, Paid, Processing, Shipped, Delivered, Cancelled, Refunded }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed, Refunded, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Forward-only lifecycle. Cancellation is possible until the order is being processed;
    /// a refund can terminate any order that has not already been refunded.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (*self, next),
            (Pending, Paid)
                | (Paid, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Pending | Paid, Cancelled)
        ) || (next == Refunded && *self != Refunded)
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (*self, next),
            (Pending, Paid | Failed | Cancelled) | (Failed, Cancelled) | (Paid, Refunded)
        )
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown status {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PENDING" => Self::Pending,
            "PAID" => Self::Paid,
            "PROCESSING" => Self::Processing,
            "SHIPPED" => Self::Shipped,
            "DELIVERED" => Self::Delivered,
            "CANCELLED" => Self::Cancelled,
            "REFUNDED" => Self::Refunded,
            other => return Err(UnknownStatus(other.to_string())),
        })
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PENDING" => Self::Pending,
            "PAID" => Self::Paid,
            "FAILED" => Self::Failed,
            "REFUNDED" => Self::Refunded,
            "CANCELLED" => Self::Cancelled,
            other => return Err(UnknownStatus(other.to_string())),
        })
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Contact details copied from the authenticated identity when the order is placed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSnapshot {
    pub name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub tax_id: Option<String>,
}

/// A cart line after prices and names were re-derived from the catalog.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub total_price: Money,
    pub product_name: String,
    pub product_image: Option<String>,
    pub specifications: SpecSnapshot,
}

impl CheckoutItem {
    pub fn variant_label(&self) -> Option<String> { self.specifications.variant_label() }
}

/// Everything the order factory needs to persist a new order.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub id: Uuid,
    pub user_id: String,
    pub store_id: String,
    pub customer: CustomerSnapshot,
    pub address: Option<Address>,
    pub shipping_method: String,
    pub currency: String,
    pub items: Vec<CheckoutItem>,
    pub subtotal: Money,
    pub shipping_fee: Money,
    pub total: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub store_id: String,
    pub customer: CustomerSnapshot,
    pub address_id: Option<String>,
    pub shipping_address: Option<Address>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Money,
    pub shipping_fee: Money,
    pub total: Money,
    pub currency: String,
    pub shipping_method: String,
    pub provider_checkout_session_id: Option<String>,
    pub provider_payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
}

impl Order {
    /// State of a freshly placed order, before any payment activity.
    pub fn placed(new: &NewOrder) -> Self {
        Self {
            id: new.id,
            user_id: new.user_id.clone(),
            store_id: new.store_id.clone(),
            customer: new.customer.clone(),
            address_id: new.address.as_ref().map(|a| a.id.clone()),
            shipping_address: new.address.clone(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            subtotal: new.subtotal,
            shipping_fee: new.shipping_fee,
            total: new.total,
            currency: new.currency.clone(),
            shipping_method: new.shipping_method.clone(),
            provider_checkout_session_id: None,
            provider_payment_intent_id: None,
            created_at: new.created_at,
            updated_at: new.created_at,
            cancelled_at: None,
            cancel_reason: None,
        }
    }

    pub fn is_awaiting_payment(&self) -> bool {
        self.status == OrderStatus::Pending && self.payment_status == PaymentStatus::Pending
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
    pub product_name: String,
    pub product_image: Option<String>,
    pub specifications: SpecSnapshot,
}

impl OrderItem {
    pub fn from_checkout(order_id: Uuid, item: &CheckoutItem) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_id,
            product_id: item.product_id.clone(),
            variant_id: item.variant_id.clone(),
            quantity: item.quantity.value(),
            unit_price: item.unit_price,
            total_price: item.total_price,
            product_name: item.product_name.clone(),
            product_image: item.product_image.clone(),
            specifications: item.specifications.clone(),
        }
    }
}

/// Ledger row for one settled payment attempt.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub method: String,
    pub amount: Money,
    pub status: PaymentStatus,
    pub provider_payment_id: String,
    pub paid_at: DateTime<Utc>,
}
