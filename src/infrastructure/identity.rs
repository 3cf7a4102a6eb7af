//! Resolves the caller's identity from a bearer token.

use std::time::Duration;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub cpf: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("identity service answered with status {0}")]
    Unexpected(u16),
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// `Ok(None)` when the token does not belong to a live session.
    async fn resolve(&self, token: &str) -> Result<Option<AuthenticatedUser>, IdentityError>;
}

#[derive(Clone)]
pub struct HttpIdentityService {
    http: Client,
    base_url: String,
}

impl HttpIdentityService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, IdentityError> {
        let http = Client::builder().use_rustls_tls().timeout(timeout).build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl IdentityService for HttpIdentityService {
    async fn resolve(&self, token: &str) -> Result<Option<AuthenticatedUser>, IdentityError> {
        let response = self
            .http
            .get(format!("{}/session", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(IdentityError::Unexpected(status.as_u16())),
        }
    }
}
