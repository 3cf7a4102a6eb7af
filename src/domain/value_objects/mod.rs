//! Value Objects for checkout

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// Largest quantity a single cart line may carry after duplicate lines are merged.
pub const MAX_LINE_QUANTITY: u32 = 999;

/// Money value object. All amounts are in the store currency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }

    pub fn multiply(&self, qty: Quantity) -> Money { Money(self.0 * Decimal::from(qty.value())) }

    /// Integer amount in the smallest currency unit, rounding half away from zero.
    ///
    /// Every amount sent to or compared against the payment provider goes through here.
    pub fn to_minor_units(&self) -> Result<i64, MoneyError> {
        (self.0 * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(MoneyError::OutOfRange(self.0))
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, other: Money) -> Money { Money(self.0 + other.0) }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MoneyError {
    #[error("amount {0} cannot be expressed in minor units")]
    OutOfRange(Decimal),
}

/// Quantity value object, always at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Option<Self> {
        (1..=MAX_LINE_QUANTITY).contains(&value).then_some(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn checked_add(&self, other: Quantity) -> Option<Self> { Self::new(self.0.checked_add(other.0)?) }
}

/// Product specification document.
///
/// Stored and copied as-is; the only shape check is that it is a JSON object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductSpecs(serde_json::Map<String, serde_json::Value>);

impl ProductSpecs {
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Object(map) => Some(Self(map)),
            serde_json::Value::Null => Some(Self::default()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectedVariant {
    pub id: String,
    pub name: String,
    pub value: String,
}

/// Product specs plus the variant chosen at checkout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct VariantSnapshot {
    pub product: ProductSpecs,
    pub selected_variant: SelectedVariant,
}

/// Specifications frozen onto an order line.
///
/// Only an object made of exactly `product` and `selectedVariant` reads back as a variant
/// snapshot; any other spec object stays a plain product snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpecSnapshot {
    WithVariant(VariantSnapshot),
    Product(ProductSpecs),
}

impl SpecSnapshot {
    /// `"name: value"` of the selected variant, if any.
    pub fn variant_label(&self) -> Option<String> {
        match self {
            Self::WithVariant(v) => Some(format!("{}: {}", v.selected_variant.name, v.selected_variant.value)),
            Self::Product(_) => None,
        }
    }
}
