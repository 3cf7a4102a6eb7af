use crate::domain::events::OrderEvent;

/// Fire-and-forget publisher for order events. Without a NATS connection it only logs.
#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub fn disabled() -> Self { Self::default() }

    pub async fn publish(&self, event: &OrderEvent) {
        let Some(client) = &self.nats else {
            tracing::debug!(subject = event.subject(), order_id = %event.order_id(), "event bus disabled");
            return;
        };
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, subject = event.subject(), "failed to encode order event");
                return;
            }
        };
        if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
            tracing::warn!(error = %e, subject = event.subject(), order_id = %event.order_id(), "failed to publish order event");
        }
    }
}
