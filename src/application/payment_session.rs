//! Bridges a placed order to a hosted checkout session at the payment provider.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use crate::domain::aggregates::{Order, OrderItem, Store};
use crate::domain::value_objects::MoneyError;
use crate::error::CheckoutError;
use crate::infrastructure::gateway::{CheckoutSession, CheckoutSessionRequest, SessionLineItem};
use crate::infrastructure::{CheckoutStore, PaymentGateway};

/// Placeholder the provider replaces with the real session id in the success URL.
pub const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

#[derive(Clone)]
pub struct PaymentSessionBridge {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn CheckoutStore>,
    public_base_url: String,
}

impl PaymentSessionBridge {
    pub fn new(gateway: Arc<dyn PaymentGateway>, store: Arc<dyn CheckoutStore>, public_base_url: impl Into<String>) -> Self {
        Self { gateway, store, public_base_url: public_base_url.into() }
    }

    /// Opens a session for `order` and records its id on the order.
    ///
    /// A provider failure leaves the order untouched so the caller can retry.
    #[instrument(skip_all, fields(order_id = %order.id, store = %store.slug))]
    pub async fn open(&self, store: &Store, order: &Order, items: &[OrderItem]) -> Result<CheckoutSession, CheckoutError> {
        let request = self.build_request(store, order, items)?;
        let session = self
            .gateway
            .create_checkout_session(&request)
            .await
            .map_err(|source| CheckoutError::Upstream { order_id: Some(order.id), source })?;

        if !self.store.attach_checkout_session(order.id, &session.id).await? {
            let current = self
                .store
                .find_order(order.id)
                .await?
                .ok_or_else(|| CheckoutError::not_found("order", order.id.to_string()))?;
            tracing::warn!(session_id = %session.id, status = %current.status, payment_status = %current.payment_status,
                "order moved on before the checkout session was recorded");
            return Err(CheckoutError::InvalidState {
                order_id: order.id,
                status: current.status,
                payment_status: current.payment_status,
            });
        }
        tracing::info!(session_id = %session.id, "checkout session opened");
        Ok(session)
    }

    pub fn build_request(&self, store: &Store, order: &Order, items: &[OrderItem]) -> Result<CheckoutSessionRequest, MoneyError> {
        let mut line_items = items
            .iter()
            .map(|item| {
                Ok(SessionLineItem {
                    name: item.product_name.clone(),
                    image: item.product_image.clone(),
                    description: item.specifications.variant_label(),
                    unit_amount: item.unit_price.to_minor_units()?,
                    quantity: item.quantity,
                })
            })
            .collect::<Result<Vec<_>, MoneyError>>()?;
        if !order.shipping_fee.is_zero() {
            line_items.push(SessionLineItem {
                name: format!("Shipping ({})", order.shipping_method),
                image: None,
                description: None,
                unit_amount: order.shipping_fee.to_minor_units()?,
                quantity: 1,
            });
        }

        let metadata = BTreeMap::from([
            ("order_id".to_string(), order.id.to_string()),
            ("store_id".to_string(), order.store_id.clone()),
            ("user_id".to_string(), order.user_id.clone()),
        ]);
        let storefront = format!("{}/{}", self.public_base_url, store.slug);
        Ok(CheckoutSessionRequest {
            line_items,
            currency: order.currency.clone(),
            success_url: format!("{storefront}/checkout/success?session_id={SESSION_ID_PLACEHOLDER}"),
            cancel_url: format!("{storefront}/checkout/cancel?order_id={}", order.id),
            metadata,
            customer_email: order.customer.email.clone(),
        })
    }
}
