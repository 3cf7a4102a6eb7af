//! Domain events
use crate::domain::value_objects::Money;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, store_id: String, user_id: String, total: Money },
    Paid { order_id: Uuid, payment_reference: String, amount: Money },
    PaymentFailed { order_id: Uuid },
    Cancelled { order_id: Uuid, reason: String },
    Refunded { order_id: Uuid },
    /// Provider ids recorded without a status change.
    PaymentReferenced { order_id: Uuid },
}

impl OrderEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Placed { order_id, .. }
            | Self::Paid { order_id, .. }
            | Self::PaymentFailed { order_id }
            | Self::Cancelled { order_id, .. }
            | Self::Refunded { order_id }
            | Self::PaymentReferenced { order_id } => *order_id,
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "orders.placed",
            Self::Paid { .. } => "orders.paid",
            Self::PaymentFailed { .. } => "orders.payment_failed",
            Self::Cancelled { .. } => "orders.cancelled",
            Self::Refunded { .. } => "orders.refunded",
            Self::PaymentReferenced { .. } => "orders.payment_referenced",
        }
    }
}
