//! Stripe Checkout implementation of [`PaymentGateway`].

use std::time::Duration;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use crate::config::PaymentConfig;
use crate::infrastructure::gateway::{
    CheckoutSession, CheckoutSessionRequest, GatewayError, PaymentGateway, ProviderEvent, ProviderEventKind, SignatureError,
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct StripeGateway {
    http: Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
    tolerance_secs: i64,
}

impl StripeGateway {
    pub fn new(cfg: &PaymentConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            secret_key: cfg.secret_key.clone(),
            webhook_secret: cfg.webhook_secret.clone(),
            tolerance_secs: cfg.webhook_tolerance_secs,
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, GatewayError> {
        let fields = form_fields(request)?;
        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&fields)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected { status: status.as_u16(), body });
        }
        Ok(response.json::<CheckoutSession>().await?)
    }

    fn verify_and_parse_event(&self, payload: &[u8], signature: Option<&str>) -> Result<ProviderEvent, GatewayError> {
        let header = signature.ok_or(SignatureError::Missing)?;
        verify_signature(payload, header, &self.webhook_secret, self.tolerance_secs, chrono::Utc::now().timestamp())?;
        Ok(parse_event(payload)?)
    }
}

/// Stripe's nested form encoding of a checkout session.
pub fn form_fields(request: &CheckoutSessionRequest) -> Result<Vec<(String, String)>, GatewayError> {
    if request.line_items.is_empty() {
        return Err(GatewayError::InvalidRequest("a checkout session needs at least one line item".into()));
    }
    let mut fields = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("customer_email".to_string(), request.customer_email.clone()),
    ];
    for (i, item) in request.line_items.iter().enumerate() {
        if item.unit_amount < 0 {
            return Err(GatewayError::InvalidRequest(format!("line item {i} has a negative amount")));
        }
        let prefix = format!("line_items[{i}]");
        fields.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        fields.push((format!("{prefix}[price_data][currency]"), request.currency.clone()));
        fields.push((format!("{prefix}[price_data][unit_amount]"), item.unit_amount.to_string()));
        fields.push((format!("{prefix}[price_data][product_data][name]"), item.name.clone()));
        if let Some(image) = &item.image {
            fields.push((format!("{prefix}[price_data][product_data][images][0]"), image.clone()));
        }
        if let Some(description) = item.description.as_ref().filter(|d| !d.is_empty()) {
            fields.push((format!("{prefix}[price_data][product_data][description]"), description.clone()));
        }
    }
    for (key, value) in &request.metadata {
        fields.push((format!("metadata[{key}]"), value.clone()));
        fields.push((format!("payment_intent_data[metadata][{key}]"), value.clone()));
    }
    Ok(fields)
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`).
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, tolerance_secs: i64, now: i64) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }
    let raw_timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    let issued_at: i64 = raw_timestamp.parse().map_err(|_| SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now - issued_at).abs() > tolerance_secs {
        return Err(SignatureError::Expired);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Mismatch)?;
    mac.update(raw_timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let matched = candidates
        .iter()
        .filter_map(|c| hex::decode(c).ok())
        .any(|candidate| mac.clone().verify_slice(&candidate).is_ok());
    if matched { Ok(()) } else { Err(SignatureError::Mismatch) }
}

#[derive(Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    object: serde_json::Value,
}

pub fn parse_event(payload: &[u8]) -> Result<ProviderEvent, serde_json::Error> {
    let envelope: Envelope = serde_json::from_slice(payload)?;
    let object = envelope.data.object;
    let kind = match envelope.event_type.as_str() {
        "checkout.session.completed" => ProviderEventKind::CheckoutCompleted(serde_json::from_value(object)?),
        "checkout.session.async_payment_succeeded" => ProviderEventKind::AsyncPaymentSucceeded(serde_json::from_value(object)?),
        "checkout.session.async_payment_failed" => ProviderEventKind::AsyncPaymentFailed(serde_json::from_value(object)?),
        "checkout.session.expired" => ProviderEventKind::CheckoutExpired(serde_json::from_value(object)?),
        "charge.refunded" => ProviderEventKind::ChargeRefunded(serde_json::from_value(object)?),
        other => ProviderEventKind::Unhandled(other.to_string()),
    };
    Ok(ProviderEvent { id: envelope.id, kind })
}

/// Builds a valid `Stripe-Signature` header for `payload`.
#[cfg(test)]
pub(crate) fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}
