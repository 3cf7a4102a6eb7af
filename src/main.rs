//! Storefront checkout service

use std::{sync::Arc, time::Duration};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use storefront_checkout::application::{CheckoutService, PaymentSessionBridge, WebhookReconciler};
use storefront_checkout::infrastructure::{CheckoutStore, EventPublisher, HttpIdentityService, IdentityService, PaymentGateway, PgCheckoutStore, StripeGateway};
use storefront_checkout::{router, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let db = PgPoolOptions::new().max_connections(config.database_max_connections).connect(&config.database_url).await.context("connecting to postgres")?;
    sqlx::migrate!("./migrations").run(&db).await?;
    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, order events will not be published");
                None
            }
        },
        None => None,
    };
    let events = EventPublisher::new(nats);

    let store: Arc<dyn CheckoutStore> = Arc::new(PgCheckoutStore::new(db));
    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeGateway::new(&config.payment)?);
    let identity: Arc<dyn IdentityService> = Arc::new(HttpIdentityService::new(&config.identity_url, Duration::from_millis(config.payment.timeout_ms))?);
    let sessions = PaymentSessionBridge::new(gateway.clone(), store.clone(), config.public_base_url.clone());
    let state = AppState {
        checkout: CheckoutService::new(store.clone(), sessions, events.clone(), config.currency.clone()),
        webhooks: WebhookReconciler::new(gateway, store, events),
        identity,
    };

    let app = router(state);
    tracing::info!("storefront checkout listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
