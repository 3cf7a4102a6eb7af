use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use crate::api::AppState;
use crate::error::CheckoutError;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Acknowledges every authentic event, including ones that change nothing, so the provider
/// stops redelivering them. Datastore failures surface as 500 and are retried.
pub async fn payments(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<Value>, CheckoutError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let outcome = s.webhooks.handle(&body, signature).await?;
    Ok(Json(json!({"received": true, "outcome": outcome})))
}
