//! Payment provider webhook reconciliation.
//!
//! Deliveries are at-least-once and unordered. Every event is turned into a [`PaymentSignal`],
//! decided against the current order and persisted as a compare-and-set, so replays and
//! concurrent deliveries converge on one outcome.

use std::sync::Arc;
use chrono::Utc;
use serde::Serialize;
use tracing::{instrument, Instrument};
use uuid::Uuid;
use crate::domain::aggregates::{Order, PaymentStatus};
use crate::domain::services::{pricing, Decision, OrderStateMachine, PaymentSignal};
use crate::error::CheckoutError;
use crate::infrastructure::gateway::{GatewayError, ProviderEvent, ProviderEventKind, SessionPayload};
use crate::infrastructure::{CheckoutStore, EventPublisher, PaymentGateway};

/// Attempts before a transition that keeps losing the compare-and-set is reported as a failure.
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied,
    AlreadyApplied,
    Stale,
    Forbidden,
    Ignored,
}

#[derive(Clone)]
pub struct WebhookReconciler {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn CheckoutStore>,
    events: EventPublisher,
}

impl WebhookReconciler {
    pub fn new(gateway: Arc<dyn PaymentGateway>, store: Arc<dyn CheckoutStore>, events: EventPublisher) -> Self {
        Self { gateway, store, events }
    }

    /// Only a bad signature or a datastore failure is an error. An authentic event that cannot
    /// be tied to one of our orders is acknowledged, since redelivering it would never help.
    #[instrument(skip_all)]
    pub async fn handle(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookOutcome, CheckoutError> {
        let event = match self.gateway.verify_and_parse_event(payload, signature) {
            Ok(event) => event,
            Err(GatewayError::Signature(e)) => {
                tracing::warn!(error = %e, "rejected webhook with invalid signature");
                return Err(CheckoutError::Signature(e));
            }
            Err(GatewayError::Payload(e)) => {
                tracing::error!(error = %e, "acknowledging signed event with an unreadable payload");
                return Ok(WebhookOutcome::Ignored);
            }
            Err(other) => return Err(CheckoutError::Internal(other.to_string())),
        };

        if let ProviderEventKind::ChargeRefunded(charge) = &event.kind {
            if !charge.refunded {
                tracing::info!(event_id = %event.id, charge_id = %charge.id, amount = ?charge.amount,
                    amount_refunded = ?charge.amount_refunded, "ignoring partial refund");
                return Ok(WebhookOutcome::Ignored);
            }
        }
        let Some(signal) = signal_for(&event) else {
            tracing::info!(event_id = %event.id, kind = ?event.kind, "ignoring unhandled event type");
            return Ok(WebhookOutcome::Ignored);
        };
        let Some(order_id) = order_id_of(&event) else {
            tracing::error!(event_id = %event.id, metadata = ?event.metadata(), "payment event carries no usable order id");
            return Ok(WebhookOutcome::Ignored);
        };
        let span = tracing::info_span!("reconcile", event_id = %event.id, %order_id);
        self.reconcile(order_id, &event, &signal).instrument(span).await
    }

    async fn reconcile(&self, order_id: Uuid, event: &ProviderEvent, signal: &PaymentSignal) -> Result<WebhookOutcome, CheckoutError> {
        let Some(order) = self.store.find_order(order_id).await? else {
            tracing::error!("payment event references an unknown order");
            return Err(CheckoutError::not_found("order", order_id.to_string()));
        };

        if let Some(reported) = settled_amount(event) {
            if order.payment_status != PaymentStatus::Paid {
                self.cross_check_amount(&order, reported).await?;
            }
        }
        self.apply(order, signal).await
    }

    async fn apply(&self, mut order: Order, signal: &PaymentSignal) -> Result<WebhookOutcome, CheckoutError> {
        for _ in 0..MAX_ATTEMPTS {
            let transition = match OrderStateMachine::decide(&order, signal, Utc::now()) {
                Decision::Apply(transition) => transition,
                Decision::AlreadyApplied => {
                    tracing::info!(status = %order.status, payment_status = %order.payment_status, "event already applied");
                    return Ok(WebhookOutcome::AlreadyApplied);
                }
                Decision::Stale => {
                    tracing::info!("event refers to a replaced checkout session");
                    return Ok(WebhookOutcome::Stale);
                }
                Decision::Forbidden { status, payment_status } => {
                    tracing::warn!(%status, %payment_status, ?signal, "event not applicable in the current order state");
                    return Ok(WebhookOutcome::Forbidden);
                }
            };

            let expected = (order.status, order.payment_status);
            if self.store.apply_transition(order.id, expected, &transition).await? {
                tracing::info!(from = %expected.0, to = %transition.status, payment_status = %transition.payment_status, "order transitioned");
                self.events.publish(&transition.event).await;
                return Ok(WebhookOutcome::Applied);
            }

            tracing::debug!("order changed concurrently, re-deciding");
            order = self
                .store
                .find_order(order.id)
                .await?
                .ok_or_else(|| CheckoutError::not_found("order", order.id.to_string()))?;
        }
        Err(CheckoutError::Internal(format!("order {} kept changing while applying a payment event", order.id)))
    }

    /// The provider has already captured funds, so a mismatch is reported but does not block
    /// the confirmation.
    async fn cross_check_amount(&self, order: &Order, reported: i64) -> Result<(), CheckoutError> {
        let items = self.store.order_items(order.id).await?;
        let expected = pricing::minor_units_total(&items, order.shipping_fee)?;
        if expected != reported {
            tracing::error!(expected, reported, total = %order.total, "provider amount differs from the order total");
        }
        Ok(())
    }
}

fn signal_for(event: &ProviderEvent) -> Option<PaymentSignal> {
    let ids = |s: &SessionPayload| (s.id.clone(), s.payment_intent.clone());
    Some(match &event.kind {
        ProviderEventKind::CheckoutCompleted(s) => {
            let (session_id, payment_intent_id) = ids(s);
            PaymentSignal::CheckoutCompleted { session_id, payment_intent_id, paid: is_paid(s) }
        }
        ProviderEventKind::AsyncPaymentSucceeded(s) => {
            let (session_id, payment_intent_id) = ids(s);
            PaymentSignal::AsyncPaymentSucceeded { session_id, payment_intent_id }
        }
        ProviderEventKind::AsyncPaymentFailed(s) => {
            let (session_id, payment_intent_id) = ids(s);
            PaymentSignal::AsyncPaymentFailed { session_id, payment_intent_id }
        }
        ProviderEventKind::CheckoutExpired(s) => PaymentSignal::SessionExpired { session_id: s.id.clone() },
        ProviderEventKind::ChargeRefunded(c) => PaymentSignal::Refunded { payment_intent_id: c.payment_intent.clone() },
        ProviderEventKind::Unhandled(_) => return None,
    })
}

fn is_paid(session: &SessionPayload) -> bool {
    matches!(session.payment_status.as_deref(), Some("paid" | "no_payment_required"))
}

/// `amount_total` of events that settle the order.
fn settled_amount(event: &ProviderEvent) -> Option<i64> {
    match &event.kind {
        ProviderEventKind::CheckoutCompleted(s) if is_paid(s) => s.amount_total,
        ProviderEventKind::AsyncPaymentSucceeded(s) => s.amount_total,
        _ => None,
    }
}

fn order_id_of(event: &ProviderEvent) -> Option<Uuid> {
    event.metadata()?.get("order_id").and_then(|raw| Uuid::parse_str(raw).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::OrderStatus;
    use crate::infrastructure::memory::MemoryStore;
    use crate::testing::{self, session_event, FakeGateway, PRODUCT_ID, SIGNATURE, VARIANT_ID};

    fn reconciler(store: Arc<MemoryStore>) -> WebhookReconciler {
        WebhookReconciler::new(Arc::new(FakeGateway::default()), store, EventPublisher::disabled())
    }

    async fn pending_with_session(store: &MemoryStore, quantity: u32) -> Order {
        let (order, _) = testing::place_order(store, quantity).await;
        assert!(store.attach_checkout_session(order.id, "cs_1").await.unwrap());
        store.find_order(order.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_completion_records_one_payment() {
        let store = Arc::new(testing::seeded_store());
        let order = pending_with_session(&store, 2).await;
        let hook = reconciler(store.clone());
        let body = session_event("checkout.session.completed", order.id, "cs_1", Some("pi_1"), "paid", Some(13_480));

        assert_eq!(hook.handle(&body, Some(SIGNATURE)).await.unwrap(), WebhookOutcome::Applied);
        assert_eq!(hook.handle(&body, Some(SIGNATURE)).await.unwrap(), WebhookOutcome::AlreadyApplied);

        let paid = store.find_order(order.id).await.unwrap().unwrap();
        assert_eq!((paid.status, paid.payment_status), (OrderStatus::Paid, PaymentStatus::Paid));
        assert_eq!(paid.provider_checkout_session_id.as_deref(), Some("cs_1"));
        assert_eq!(paid.provider_payment_intent_id.as_deref(), Some("pi_1"));

        let payments = store.payments(order.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].provider_payment_id, "pi_1");
        assert_eq!(payments[0].amount, order.total);

        let level = store.inventory_level(PRODUCT_ID, Some(VARIANT_ID)).unwrap();
        assert_eq!((level.quantity, level.reserved), (12, 0));
    }

    #[tokio::test]
    async fn test_payment_reference_falls_back_to_session() {
        let store = Arc::new(testing::seeded_store());
        let order = pending_with_session(&store, 1).await;
        let body = session_event("checkout.session.completed", order.id, "cs_1", None, "paid", None);
        reconciler(store.clone()).handle(&body, Some(SIGNATURE)).await.unwrap();

        let paid = store.find_order(order.id).await.unwrap().unwrap();
        assert_eq!(paid.provider_payment_intent_id, None);
        assert_eq!(store.payments(order.id).await.unwrap()[0].provider_payment_id, "cs_1");
    }

    #[tokio::test]
    async fn test_bad_signature_has_no_side_effects() {
        let store = Arc::new(testing::seeded_store());
        let order = pending_with_session(&store, 1).await;
        let body = session_event("checkout.session.completed", order.id, "cs_1", Some("pi_1"), "paid", None);
        let hook = reconciler(store.clone());

        assert_eq!(hook.handle(&body, Some("t=1,v1=forged")).await.unwrap_err().kind(), "signature");
        assert_eq!(hook.handle(&body, None).await.unwrap_err().kind(), "signature");
        assert!(store.find_order(order.id).await.unwrap().unwrap().is_awaiting_payment());
        assert!(store.payments(order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_order_and_unhandled_events() {
        let store = Arc::new(testing::seeded_store());
        let hook = reconciler(store.clone());
        let ghost = session_event("checkout.session.completed", Uuid::now_v7(), "cs_9", None, "paid", None);
        assert_eq!(hook.handle(&ghost, Some(SIGNATURE)).await.unwrap_err().kind(), "not_found");

        let other = session_event("payment_intent.created", Uuid::now_v7(), "cs_9", None, "unpaid", None);
        assert_eq!(hook.handle(&other, Some(SIGNATURE)).await.unwrap(), WebhookOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_delayed_payment_then_success() {
        let store = Arc::new(testing::seeded_store());
        let order = pending_with_session(&store, 1).await;
        let hook = reconciler(store.clone());

        let completed = session_event("checkout.session.completed", order.id, "cs_1", Some("pi_1"), "unpaid", Some(7_490));
        assert_eq!(hook.handle(&completed, Some(SIGNATURE)).await.unwrap(), WebhookOutcome::Applied);
        let waiting = store.find_order(order.id).await.unwrap().unwrap();
        assert!(waiting.is_awaiting_payment());
        assert_eq!(waiting.provider_payment_intent_id.as_deref(), Some("pi_1"));

        let succeeded = session_event("checkout.session.async_payment_succeeded", order.id, "cs_1", Some("pi_1"), "paid", Some(7_490));
        hook.handle(&succeeded, Some(SIGNATURE)).await.unwrap();
        assert_eq!(store.find_order(order.id).await.unwrap().unwrap().payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_expiry_cancels_and_releases_stock() {
        let store = Arc::new(testing::seeded_store());
        let order = pending_with_session(&store, 3).await;
        assert_eq!(store.inventory_level(PRODUCT_ID, Some(VARIANT_ID)).unwrap().reserved, 3);
        let hook = reconciler(store.clone());

        let expired = session_event("checkout.session.expired", order.id, "cs_1", None, "unpaid", None);
        assert_eq!(hook.handle(&expired, Some(SIGNATURE)).await.unwrap(), WebhookOutcome::Applied);
        let cancelled = store.find_order(order.id).await.unwrap().unwrap();
        assert_eq!((cancelled.status, cancelled.payment_status), (OrderStatus::Cancelled, PaymentStatus::Cancelled));
        assert!(cancelled.cancelled_at.is_some());
        let level = store.inventory_level(PRODUCT_ID, Some(VARIANT_ID)).unwrap();
        assert_eq!((level.quantity, level.reserved), (14, 0));

        let late = session_event("checkout.session.completed", order.id, "cs_1", Some("pi_1"), "paid", None);
        assert_eq!(hook.handle(&late, Some(SIGNATURE)).await.unwrap(), WebhookOutcome::Forbidden);
        assert!(store.payments(order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_amount_mismatch_still_settles() {
        let store = Arc::new(testing::seeded_store());
        let order = pending_with_session(&store, 1).await;
        let body = session_event("checkout.session.completed", order.id, "cs_1", Some("pi_1"), "paid", Some(1));
        assert_eq!(reconciler(store.clone()).handle(&body, Some(SIGNATURE)).await.unwrap(), WebhookOutcome::Applied);
    }

    #[tokio::test]
    async fn test_events_without_our_order_are_acknowledged() {
        let store = Arc::new(testing::seeded_store());
        let hook = reconciler(store.clone());
        let no_metadata = serde_json::to_vec(&serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_1", "payment_status": "paid", "metadata": {}}}
        }))
        .unwrap();
        assert_eq!(hook.handle(&no_metadata, Some(SIGNATURE)).await.unwrap(), WebhookOutcome::Ignored);

        let bad_id = serde_json::to_vec(&serde_json::json!({
            "id": "evt_2",
            "type": "charge.refunded",
            "data": {"object": {"id": "ch_1", "payment_intent": "pi_dash", "refunded": true, "metadata": {"order_id": "42"}}}
        }))
        .unwrap();
        assert_eq!(hook.handle(&bad_id, Some(SIGNATURE)).await.unwrap(), WebhookOutcome::Ignored);

        let unreadable = br#"{"type":"charge.refunded","data":{"object":{"metadata":{}}}}"#;
        assert_eq!(hook.handle(unreadable, Some(SIGNATURE)).await.unwrap(), WebhookOutcome::Ignored);
        assert_eq!(store.order_count(), 0);
    }

    fn refund_event(order_id: Uuid, refunded: bool, amount_refunded: i64) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": format!("evt_{}", Uuid::now_v7().simple()),
            "type": "charge.refunded",
            "data": {"object": {
                "id": "ch_1",
                "payment_intent": "pi_1",
                "amount": 7_490,
                "amount_refunded": amount_refunded,
                "refunded": refunded,
                "metadata": {"order_id": order_id.to_string()}
            }}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_partial_refund_keeps_order_paid() {
        let store = Arc::new(testing::seeded_store());
        let order = pending_with_session(&store, 1).await;
        let hook = reconciler(store.clone());
        let paid = session_event("checkout.session.completed", order.id, "cs_1", Some("pi_1"), "paid", Some(7_490));
        hook.handle(&paid, Some(SIGNATURE)).await.unwrap();

        assert_eq!(hook.handle(&refund_event(order.id, false, 100), Some(SIGNATURE)).await.unwrap(), WebhookOutcome::Ignored);
        let current = store.find_order(order.id).await.unwrap().unwrap();
        assert_eq!((current.status, current.payment_status), (OrderStatus::Paid, PaymentStatus::Paid));
    }

    #[tokio::test]
    async fn test_full_refund_refunds_order() {
        let store = Arc::new(testing::seeded_store());
        let order = pending_with_session(&store, 1).await;
        let hook = reconciler(store.clone());
        let paid = session_event("checkout.session.completed", order.id, "cs_1", Some("pi_1"), "paid", Some(7_490));
        hook.handle(&paid, Some(SIGNATURE)).await.unwrap();

        assert_eq!(hook.handle(&refund_event(order.id, true, 7_490), Some(SIGNATURE)).await.unwrap(), WebhookOutcome::Applied);
        let current = store.find_order(order.id).await.unwrap().unwrap();
        assert_eq!((current.status, current.payment_status), (OrderStatus::Refunded, PaymentStatus::Refunded));
    }
}
