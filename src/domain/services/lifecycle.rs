//! Order state machine.
//!
//! `decide` is pure: given the current order and a payment signal it returns the transition to
//! persist, or why nothing should change. Persisting is a compare-and-set on the statuses the
//! decision was based on, so replaying a signal can never apply it twice.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::domain::aggregates::{Order, OrderStatus, Payment, PaymentStatus};
use crate::domain::events::OrderEvent;

pub const HOSTED_CHECKOUT_METHOD: &str = "hosted_checkout";

/// Provider-agnostic payment outcome for one order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentSignal {
    CheckoutCompleted { session_id: String, payment_intent_id: Option<String>, paid: bool },
    AsyncPaymentSucceeded { session_id: String, payment_intent_id: Option<String> },
    AsyncPaymentFailed { session_id: String, payment_intent_id: Option<String> },
    SessionExpired { session_id: String },
    Refunded { payment_intent_id: Option<String> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StockEffect {
    None,
    /// Reserved units leave the shelf.
    Commit,
    /// Reserved units go back to sale.
    Release,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub payment: Option<Payment>,
    pub stock: StockEffect,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub event: OrderEvent,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    Apply(Box<Transition>),
    /// The order already reflects this signal.
    AlreadyApplied,
    /// The signal refers to a checkout session the order no longer uses.
    Stale,
    Forbidden { status: OrderStatus, payment_status: PaymentStatus },
}

/// Reference recorded on the payment ledger: the payment intent when the provider sent one,
/// otherwise the checkout session.
pub fn payment_reference(session_id: &str, payment_intent_id: Option<&str>) -> String {
    payment_intent_id.unwrap_or(session_id).to_string()
}

pub struct OrderStateMachine;

impl OrderStateMachine {
    pub fn decide(order: &Order, signal: &PaymentSignal, now: DateTime<Utc>) -> Decision {
        match signal {
            PaymentSignal::CheckoutCompleted { session_id, payment_intent_id, paid: true }
            | PaymentSignal::AsyncPaymentSucceeded { session_id, payment_intent_id } => {
                Self::settle(order, session_id, payment_intent_id.as_deref(), now)
            }
            PaymentSignal::CheckoutCompleted { session_id, payment_intent_id, paid: false } => {
                Self::reference(order, session_id, payment_intent_id.as_deref())
            }
            PaymentSignal::AsyncPaymentFailed { session_id, payment_intent_id } => {
                if order.payment_status == PaymentStatus::Failed {
                    return Decision::AlreadyApplied;
                }
                Self::guarded(order, OrderStatus::Cancelled, PaymentStatus::Failed, || Transition {
                    status: OrderStatus::Cancelled,
                    payment_status: PaymentStatus::Failed,
                    checkout_session_id: Some(session_id.clone()),
                    payment_intent_id: payment_intent_id.clone(),
                    payment: None,
                    stock: StockEffect::Release,
                    cancelled_at: Some(now),
                    cancel_reason: Some("payment failed".to_string()),
                    event: OrderEvent::PaymentFailed { order_id: order.id },
                })
            }
            PaymentSignal::SessionExpired { session_id } => {
                if order.status == OrderStatus::Cancelled || order.payment_status == PaymentStatus::Paid {
                    return Decision::AlreadyApplied;
                }
                if order.provider_checkout_session_id.as_deref().is_some_and(|current| current != session_id) {
                    return Decision::Stale;
                }
                let reason = "checkout session expired".to_string();
                Self::guarded(order, OrderStatus::Cancelled, PaymentStatus::Cancelled, || Transition {
                    status: OrderStatus::Cancelled,
                    payment_status: PaymentStatus::Cancelled,
                    checkout_session_id: None,
                    payment_intent_id: None,
                    payment: None,
                    stock: StockEffect::Release,
                    cancelled_at: Some(now),
                    cancel_reason: Some(reason.clone()),
                    event: OrderEvent::Cancelled { order_id: order.id, reason },
                })
            }
            PaymentSignal::Refunded { payment_intent_id } => {
                if order.payment_status == PaymentStatus::Refunded {
                    return Decision::AlreadyApplied;
                }
                Self::guarded(order, OrderStatus::Refunded, PaymentStatus::Refunded, || Transition {
                    status: OrderStatus::Refunded,
                    payment_status: PaymentStatus::Refunded,
                    checkout_session_id: None,
                    payment_intent_id: payment_intent_id.clone(),
                    payment: None,
                    stock: StockEffect::None,
                    cancelled_at: None,
                    cancel_reason: None,
                    event: OrderEvent::Refunded { order_id: order.id },
                })
            }
        }
    }

    fn settle(order: &Order, session_id: &str, payment_intent_id: Option<&str>, now: DateTime<Utc>) -> Decision {
        if order.payment_status == PaymentStatus::Paid {
            return Decision::AlreadyApplied;
        }
        let reference = payment_reference(session_id, payment_intent_id);
        Self::guarded(order, OrderStatus::Paid, PaymentStatus::Paid, || Transition {
            status: OrderStatus::Paid,
            payment_status: PaymentStatus::Paid,
            checkout_session_id: Some(session_id.to_string()),
            payment_intent_id: payment_intent_id.map(str::to_string),
            payment: Some(Payment {
                id: Uuid::now_v7(),
                order_id: order.id,
                method: HOSTED_CHECKOUT_METHOD.to_string(),
                amount: order.total,
                status: PaymentStatus::Paid,
                provider_payment_id: reference.clone(),
                paid_at: now,
            }),
            stock: StockEffect::Commit,
            cancelled_at: None,
            cancel_reason: None,
            event: OrderEvent::Paid { order_id: order.id, payment_reference: reference.clone(), amount: order.total },
        })
    }

    /// Completed but not yet paid (delayed payment methods): only the provider ids change.
    fn reference(order: &Order, session_id: &str, payment_intent_id: Option<&str>) -> Decision {
        let unchanged = order.provider_checkout_session_id.as_deref() == Some(session_id)
            && (payment_intent_id.is_none() || order.provider_payment_intent_id.as_deref() == payment_intent_id);
        if order.payment_status != PaymentStatus::Pending || unchanged {
            return Decision::AlreadyApplied;
        }
        Decision::Apply(Box::new(Transition {
            status: order.status,
            payment_status: order.payment_status,
            checkout_session_id: Some(session_id.to_string()),
            payment_intent_id: payment_intent_id.map(str::to_string),
            payment: None,
            stock: StockEffect::None,
            cancelled_at: None,
            cancel_reason: None,
            event: OrderEvent::PaymentReferenced { order_id: order.id },
        }))
    }

    fn guarded(order: &Order, status: OrderStatus, payment_status: PaymentStatus, build: impl FnOnce() -> Transition) -> Decision {
        if order.status.can_transition_to(status) && order.payment_status.can_transition_to(payment_status) {
            Decision::Apply(Box::new(build()))
        } else {
            Decision::Forbidden { status: order.status, payment_status: order.payment_status }
        }
    }
}
