//! Catalog data read by checkout. Owned by the catalog service; never written here.

use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{Money, ProductSpecs};

#[derive(Clone, Debug)]
pub struct Store {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub shipping_fee: Money,
    pub free_shipping_threshold: Option<Money>,
}

impl Store {
    pub fn shipping_fee_for(&self, subtotal: Money) -> Money {
        match self.free_shipping_threshold {
            Some(threshold) if subtotal >= threshold => Money::ZERO,
            _ => self.shipping_fee,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Product {
    pub id: String,
    pub store_id: String,
    pub name: String,
    pub price: Money,
    pub image_url: Option<String>,
    pub specifications: ProductSpecs,
    pub active: bool,
    pub variants: Vec<Variant>,
}

impl Product {
    pub fn active_variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id && v.active)
    }
}

#[derive(Clone, Debug)]
pub struct Variant {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub value: String,
    /// Overrides the product price when set.
    pub price: Option<Money>,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InventoryLevel {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i32,
    pub reserved: i32,
    pub min_stock: i32,
}

impl InventoryLevel {
    pub fn matches(&self, product_id: &str, variant_id: Option<&str>) -> bool {
        self.product_id == product_id && self.variant_id.as_deref() == variant_id
    }

    /// Units that can be sold without dipping into the safety margin.
    pub fn sellable(&self) -> i64 {
        (i64::from(self.quantity) - i64::from(self.reserved) - i64::from(self.min_stock)).max(0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: String,
    pub user_id: String,
    pub recipient: String,
    pub street: String,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub district: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn store(threshold: Option<Money>) -> Store {
        Store { id: "s1".into(), slug: "shop".into(), name: "Shop".into(), shipping_fee: Money::new(dec!(15)), free_shipping_threshold: threshold }
    }

    #[test]
    fn test_free_shipping_threshold_is_inclusive() {
        let s = store(Some(Money::new(dec!(199))));
        assert_eq!(s.shipping_fee_for(Money::new(dec!(198.99))), Money::new(dec!(15)));
        assert_eq!(s.shipping_fee_for(Money::new(dec!(199))), Money::ZERO);
        assert_eq!(store(None).shipping_fee_for(Money::new(dec!(10000))), Money::new(dec!(15)));
    }

    #[test]
    fn test_sellable_respects_margin() {
        let level = InventoryLevel { product_id: "p".into(), variant_id: None, quantity: 14, reserved: 0, min_stock: 5 };
        assert_eq!(level.sellable(), 9);
        let drained = InventoryLevel { reserved: 12, ..level };
        assert_eq!(drained.sellable(), 0);
    }
}
