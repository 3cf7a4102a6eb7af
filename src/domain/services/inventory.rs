//! Inventory guard: stock may only be sold down to the configured minimum.

use serde::Serialize;
use crate::domain::aggregates::{CheckoutItem, InventoryLevel};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("only {available} unit(s) of product {product_id} can be sold, {requested} requested")]
pub struct StockConflict {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub requested: u32,
    pub available: i64,
}

/// Checks every line against `levels`, which must have been read inside the transaction that
/// will create the order. A line with no inventory row has nothing to sell.
pub fn check(levels: &[InventoryLevel], items: &[CheckoutItem]) -> Result<(), StockConflict> {
    for item in items {
        let available = levels
            .iter()
            .find(|l| l.matches(&item.product_id, item.variant_id.as_deref()))
            .map(InventoryLevel::sellable)
            .unwrap_or(0);
        let requested = item.quantity.value();
        if i64::from(requested) > available {
            return Err(StockConflict {
                product_id: item.product_id.clone(),
                variant_id: item.variant_id.clone(),
                requested,
                available,
            });
        }
    }
    Ok(())
}
