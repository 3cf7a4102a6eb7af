use axum::{body::Bytes, extract::{Path, State}, Json};
use uuid::Uuid;
use crate::api::{auth::CurrentUser, AppState};
use crate::application::{CheckoutResponse, OrderView};
use crate::error::CheckoutError;

pub async fn checkout(State(s): State<AppState>, CurrentUser(user): CurrentUser, body: Bytes) -> Result<Json<CheckoutResponse>, CheckoutError> {
    Ok(Json(s.checkout.checkout(&user, &body).await?))
}

pub async fn get_order(State(s): State<AppState>, CurrentUser(user): CurrentUser, Path(id): Path<String>) -> Result<Json<OrderView>, CheckoutError> {
    Ok(Json(s.checkout.get_order(&user, order_id(&id)?).await?))
}

pub async fn retry_payment_session(State(s): State<AppState>, CurrentUser(user): CurrentUser, Path(id): Path<String>) -> Result<Json<CheckoutResponse>, CheckoutError> {
    Ok(Json(s.checkout.retry_session(&user, order_id(&id)?).await?))
}

fn order_id(raw: &str) -> Result<Uuid, CheckoutError> {
    Uuid::parse_str(raw).map_err(|_| CheckoutError::not_found("order", raw))
}
