//! Request-boundary error taxonomy.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::{OrderStatus, PaymentStatus, ValidationIssue};
use crate::domain::services::{PricingError, StockConflict};
use crate::domain::value_objects::MoneyError;
use crate::infrastructure::gateway::{GatewayError, SignatureError};
use crate::infrastructure::{IdentityError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("invalid request")]
    Validation(Vec<ValidationIssue>),
    #[error("authentication required")]
    Unauthorized,
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    StockConflict(StockConflict),
    #[error("order {order_id} is {status}/{payment_status} and no longer accepts a payment session")]
    InvalidState { order_id: Uuid, status: OrderStatus, payment_status: PaymentStatus },
    #[error("payment provider unavailable, try again")]
    Upstream { order_id: Option<Uuid>, #[source] source: GatewayError },
    #[error("identity service unavailable")]
    Identity(#[from] IdentityError),
    #[error("webhook signature rejected: {0}")]
    Signature(SignatureError),
    #[error("internal error")]
    Store(StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    issues: Option<&'a [ValidationIssue]>,
    /// Which line ran out and how much of it is still sellable.
    #[serde(skip_serializing_if = "Option::is_none")]
    conflict: Option<&'a StockConflict>,
}

impl CheckoutError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthorized => "unauthorized",
            Self::NotFound { .. } => "not_found",
            Self::StockConflict(_) => "stock_conflict",
            Self::InvalidState { .. } => "invalid_state",
            Self::Upstream { .. } | Self::Identity(_) => "upstream",
            Self::Signature(_) => "signature",
            Self::Store(_) | Self::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Signature(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::StockConflict(_) | Self::InvalidState { .. } => StatusCode::CONFLICT,
            Self::Upstream { .. } | Self::Identity(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Stock(conflict) => Self::StockConflict(conflict),
            other => Self::Store(other),
        }
    }
}

impl From<PricingError> for CheckoutError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::ProductNotFound(id) => Self::not_found("product", id),
            PricingError::VariantNotFound { variant_id, .. } => Self::not_found("variant", variant_id),
        }
    }
}

impl From<MoneyError> for CheckoutError {
    fn from(err: MoneyError) -> Self { Self::Internal(err.to_string()) }
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::Store(e) => tracing::error!(error = %e, "datastore failure"),
            Self::Internal(msg) => tracing::error!(error = %msg, "internal failure"),
            Self::Upstream { order_id, source } => tracing::warn!(?order_id, error = %source, "payment provider failure"),
            Self::Identity(e) => tracing::warn!(error = %e, "identity service failure"),
            _ => {}
        }
        let issues = match &self {
            Self::Validation(issues) => Some(issues.as_slice()),
            _ => None,
        };
        let conflict = match &self {
            Self::StockConflict(conflict) => Some(conflict),
            _ => None,
        };
        let body = ErrorBody { error: self.to_string(), kind: self.kind(), issues, conflict };
        (status, Json(body)).into_response()
    }
}
