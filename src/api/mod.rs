//! HTTP surface.

pub mod auth;
pub mod checkout;
pub mod webhook;

use std::sync::Arc;
use axum::{routing::{get, post}, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::application::{CheckoutService, WebhookReconciler};
use crate::infrastructure::IdentityService;

#[derive(Clone)]
pub struct AppState {
    pub checkout: CheckoutService,
    pub webhooks: WebhookReconciler,
    pub identity: Arc<dyn IdentityService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront-checkout"})) }))
        .route("/api/v1/checkout", post(checkout::checkout))
        .route("/api/v1/orders/:id", get(checkout::get_order))
        .route("/api/v1/orders/:id/payment-session", post(checkout::retry_payment_session))
        .route("/api/v1/webhooks/payments", post(webhook::payments))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
