//! Price recalculation. Prices come from the catalog only; the cart contributes ids and quantities.

use std::collections::HashMap;
use crate::domain::aggregates::{CheckoutItem, NormalizedItem, OrderItem, Product, Store};
use crate::domain::value_objects::{Money, MoneyError, SelectedVariant, SpecSnapshot, VariantSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("product {0} is not available in this store")]
    ProductNotFound(String),
    #[error("variant {variant_id} of product {product_id} is not available")]
    VariantNotFound { product_id: String, variant_id: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct PricedCart {
    pub items: Vec<CheckoutItem>,
    pub subtotal: Money,
    pub shipping_fee: Money,
    pub total: Money,
}

/// Prices every line against `catalog`, which should hold the store's active products.
///
/// Products of another store or inactive ones are treated as unknown even if present.
pub fn price_cart(store: &Store, catalog: &[Product], items: &[NormalizedItem]) -> Result<PricedCart, PricingError> {
    let by_id: HashMap<&str, &Product> = catalog
        .iter()
        .filter(|p| p.active && p.store_id == store.id)
        .map(|p| (p.id.as_str(), p))
        .collect();

    let items = items
        .iter()
        .map(|item| price_line(&by_id, item))
        .collect::<Result<Vec<_>, _>>()?;

    let subtotal: Money = items.iter().map(|i| i.total_price).sum();
    let shipping_fee = store.shipping_fee_for(subtotal);
    Ok(PricedCart { items, subtotal, shipping_fee, total: subtotal + shipping_fee })
}

fn price_line(by_id: &HashMap<&str, &Product>, item: &NormalizedItem) -> Result<CheckoutItem, PricingError> {
    let product = by_id
        .get(item.product_id.as_str())
        .ok_or_else(|| PricingError::ProductNotFound(item.product_id.clone()))?;

    let (unit_price, product_name, specifications) = match &item.variant_id {
        Some(variant_id) => {
            let variant = product.active_variant(variant_id).ok_or_else(|| PricingError::VariantNotFound {
                product_id: product.id.clone(),
                variant_id: variant_id.clone(),
            })?;
            (
                variant.price.unwrap_or(product.price),
                format!("{} ({}: {})", product.name, variant.name, variant.value),
                SpecSnapshot::WithVariant(VariantSnapshot {
                    product: product.specifications.clone(),
                    selected_variant: SelectedVariant { id: variant.id.clone(), name: variant.name.clone(), value: variant.value.clone() },
                }),
            )
        }
        None => (product.price, product.name.clone(), SpecSnapshot::Product(product.specifications.clone())),
    };

    Ok(CheckoutItem {
        product_id: product.id.clone(),
        variant_id: item.variant_id.clone(),
        quantity: item.quantity,
        unit_price,
        total_price: unit_price.multiply(item.quantity),
        product_name,
        product_image: product.image_url.clone(),
        specifications,
    })
}

/// Order total re-derived the way the payment provider sees it: each unit price rounded to
/// minor units, times quantity, plus the rounded shipping fee.
pub fn minor_units_total(items: &[OrderItem], shipping_fee: Money) -> Result<i64, MoneyError> {
    let mut total = shipping_fee.to_minor_units()?;
    for item in items {
        total += item.unit_price.to_minor_units()? * i64::from(item.quantity);
    }
    Ok(total)
}
