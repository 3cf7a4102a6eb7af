//! Hosted payment provider seam.

use std::collections::{BTreeMap, HashMap};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Clone, Debug, PartialEq)]
pub struct SessionLineItem {
    pub name: String,
    pub image: Option<String>,
    pub description: Option<String>,
    /// Unit amount in minor currency units.
    pub unit_amount: i64,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CheckoutSessionRequest {
    pub line_items: Vec<SessionLineItem>,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
    pub customer_email: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Checkout session object carried by `checkout.session.*` events.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SessionPayload {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Charge object carried by `charge.*` events.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ChargePayload {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub amount_refunded: Option<i64>,
    /// True only once the whole charge has been refunded.
    #[serde(default)]
    pub refunded: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderEventKind {
    CheckoutCompleted(SessionPayload),
    AsyncPaymentSucceeded(SessionPayload),
    AsyncPaymentFailed(SessionPayload),
    CheckoutExpired(SessionPayload),
    ChargeRefunded(ChargePayload),
    Unhandled(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderEvent {
    pub id: String,
    pub kind: ProviderEventKind,
}

impl ProviderEvent {
    pub fn metadata(&self) -> Option<&HashMap<String, String>> {
        match &self.kind {
            ProviderEventKind::CheckoutCompleted(s)
            | ProviderEventKind::AsyncPaymentSucceeded(s)
            | ProviderEventKind::AsyncPaymentFailed(s)
            | ProviderEventKind::CheckoutExpired(s) => Some(&s.metadata),
            ProviderEventKind::ChargeRefunded(c) => Some(&c.metadata),
            ProviderEventKind::Unhandled(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header is missing")]
    Missing,
    #[error("signature header is malformed")]
    Malformed,
    #[error("signature timestamp is outside the tolerance window")]
    Expired,
    #[error("no signature matches the payload")]
    Mismatch,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("payment provider rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid checkout session request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("malformed event payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, GatewayError>;

    /// Authenticates `payload` against `signature` before decoding it.
    fn verify_and_parse_event(&self, payload: &[u8], signature: Option<&str>) -> Result<ProviderEvent, GatewayError>;
}
