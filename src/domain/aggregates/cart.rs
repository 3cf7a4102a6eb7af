//! Cart Aggregate
//!
//! The checkout payload is untrusted. It is parsed strictly (unknown fields are errors, so a
//! client cannot smuggle prices in) and lines for the same product/variant are merged before
//! anything else looks at them.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};
use crate::domain::value_objects::{Quantity, MAX_LINE_QUANTITY};

pub const DEFAULT_SHIPPING_METHOD: &str = "standard";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct CheckoutEnvelope {
    #[validate(custom = "not_blank")]
    store_id: String,
    #[validate(length(min = 1, message = "cart must contain at least one item"))]
    items: Vec<serde_json::Value>,
    #[validate(custom = "not_blank")]
    address_id: Option<String>,
    #[validate(length(min = 1, max = 64))]
    shipping_method: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CartItemRequest {
    #[validate(custom = "not_blank")]
    pub product_id: String,
    #[validate(range(min = 1, max = 999, message = "must be a positive integer no greater than 999"))]
    pub quantity: i64,
    #[validate(custom = "not_blank")]
    pub variant_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CheckoutRequest {
    pub store_id: String,
    pub items: Vec<CartItemRequest>,
    pub address_id: Option<String>,
    pub shipping_method: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedItem {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: Quantity,
}

#[derive(Clone, Debug)]
pub struct NormalizedCart {
    pub store_id: String,
    pub items: Vec<NormalizedItem>,
    pub address_id: Option<String>,
    pub shipping_method: String,
}

impl NormalizedCart {
    /// Parses and normalizes a raw request body. Either the whole cart is accepted or
    /// every problem found is reported.
    pub fn from_body(body: &[u8]) -> Result<Self, Vec<ValidationIssue>> {
        CheckoutRequest::parse(body)?.normalize()
    }
}

impl CheckoutRequest {
    pub fn parse(body: &[u8]) -> Result<Self, Vec<ValidationIssue>> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| vec![ValidationIssue::new("", format!("invalid JSON: {e}"))])?;
        let envelope: CheckoutEnvelope = serde_json::from_value(value)
            .map_err(|e| vec![ValidationIssue::new("", e.to_string())])?;

        let mut issues = Vec::new();
        if let Err(errors) = envelope.validate() {
            push_field_errors("", &errors, &mut issues);
        }

        let mut items = Vec::with_capacity(envelope.items.len());
        for (index, raw) in envelope.items.into_iter().enumerate() {
            let path = format!("items.{index}");
            match serde_json::from_value::<CartItemRequest>(raw) {
                Ok(item) => match item.validate() {
                    Ok(()) => items.push(item),
                    Err(errors) => push_field_errors(&path, &errors, &mut issues),
                },
                Err(e) => issues.push(ValidationIssue::new(path, e.to_string())),
            }
        }

        if !issues.is_empty() {
            issues.sort_by(|a, b| a.path.cmp(&b.path));
            return Err(issues);
        }
        Ok(Self {
            store_id: envelope.store_id,
            items,
            address_id: envelope.address_id,
            shipping_method: envelope.shipping_method,
        })
    }

    /// Merges lines that share `(productId, variantId)`, keeping first-seen order.
    pub fn normalize(self) -> Result<NormalizedCart, Vec<ValidationIssue>> {
        let mut items: Vec<NormalizedItem> = Vec::with_capacity(self.items.len());
        let mut index: HashMap<(String, Option<String>), usize> = HashMap::new();
        let mut issues = Vec::new();

        for (position, line) in self.items.into_iter().enumerate() {
            let product_id = line.product_id.trim().to_string();
            let variant_id = line.variant_id.map(|v| v.trim().to_string());
            let Some(quantity) = u32::try_from(line.quantity).ok().and_then(Quantity::new) else {
                issues.push(ValidationIssue::new(format!("items.{position}.quantity"), "must be a positive integer"));
                continue;
            };
            match index.get(&(product_id.clone(), variant_id.clone())) {
                Some(&at) => match items[at].quantity.checked_add(quantity) {
                    Some(sum) => items[at].quantity = sum,
                    None => issues.push(ValidationIssue::new(
                        format!("items.{position}.quantity"),
                        format!("combined quantity for product {product_id} exceeds {MAX_LINE_QUANTITY}"),
                    )),
                },
                None => {
                    index.insert((product_id.clone(), variant_id.clone()), items.len());
                    items.push(NormalizedItem { product_id, variant_id, quantity });
                }
            }
        }

        if !issues.is_empty() {
            return Err(issues);
        }
        Ok(NormalizedCart {
            store_id: self.store_id.trim().to_string(),
            items,
            address_id: self.address_id.map(|a| a.trim().to_string()),
            shipping_method: self.shipping_method.map(|m| m.trim().to_string()).unwrap_or_else(|| DEFAULT_SHIPPING_METHOD.to_string()),
        })
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("must not be empty".into());
        return Err(error);
    }
    Ok(())
}

fn push_field_errors(prefix: &str, errors: &ValidationErrors, issues: &mut Vec<ValidationIssue>) {
    for (field, field_errors) in errors.field_errors() {
        let field = camel_case(field);
        let path = if prefix.is_empty() { field } else { format!("{prefix}.{field}") };
        for error in field_errors {
            let message = error.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| error.code.to_string());
            issues.push(ValidationIssue::new(path.clone(), message));
        }
    }
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
