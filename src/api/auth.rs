use axum::{async_trait, extract::FromRequestParts, http::{header, request::Parts}};
use crate::api::AppState;
use crate::error::CheckoutError;
use crate::infrastructure::AuthenticatedUser;

/// Caller identity resolved from the `Authorization: Bearer` header.
pub struct CurrentUser(pub AuthenticatedUser);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = CheckoutError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(CheckoutError::Unauthorized)?;
        state.identity.resolve(token).await?.map(CurrentUser).ok_or(CheckoutError::Unauthorized)
    }
}
