use anyhow::{Context, Result};
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct PaymentConfig {
    pub api_base: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub timeout_ms: u64,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub nats_url: Option<String>,
    pub identity_url: String,
    /// Storefront origin used to build the provider's redirect URLs.
    pub public_base_url: String,
    pub currency: String,
    pub payment: PaymentConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| lookup(key).filter(|v| !v.is_empty()).with_context(|| format!("{key} must be set"));
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_max_connections: number(&or("DATABASE_MAX_CONNECTIONS", "10"), "DATABASE_MAX_CONNECTIONS")?,
            port: number(&or("PORT", "8083"), "PORT")?,
            nats_url: lookup("NATS_URL").filter(|v| !v.is_empty()),
            identity_url: required("IDENTITY_URL")?,
            public_base_url: required("PUBLIC_BASE_URL")?.trim_end_matches('/').to_string(),
            currency: or("CURRENCY", "brl").to_lowercase(),
            payment: PaymentConfig {
                api_base: or("PAYMENT_API_BASE", "https://api.stripe.com"),
                secret_key: required("PAYMENT_SECRET_KEY")?,
                webhook_secret: required("PAYMENT_WEBHOOK_SECRET")?,
                webhook_tolerance_secs: number(&or("PAYMENT_WEBHOOK_TOLERANCE_SECS", "300"), "PAYMENT_WEBHOOK_TOLERANCE_SECS")?,
                timeout_ms: number(&or("PAYMENT_TIMEOUT_MS", "15000"), "PAYMENT_TIMEOUT_MS")?,
            },
        })
    }
}

fn number<T>(raw: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim().parse().with_context(|| format!("{key} must be a number, got {raw:?}"))
}
