use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use classwms_core::{text, DomainError, DomainResult, ProductId};

/// A stocked product as persisted in a tenant store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub barcode: Option<String>,
    /// Units on hand; never negative.
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub barcode: Option<String>,
    /// Opening stock.
    pub quantity: i64,
}

impl NewProduct {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Normalise text fields and check the creation rules.
    pub fn validated(self) -> DomainResult<Self> {
        if self.quantity < 0 {
            return Err(DomainError::validation("opening quantity cannot be negative"));
        }
        Ok(Self {
            name: text::required("product name", &self.name)?,
            description: text::optional(self.description.as_deref()),
            category: text::optional(self.category.as_deref()),
            barcode: text::optional(self.barcode.as_deref()),
            quantity: self.quantity,
        })
    }
}

/// Editable descriptive fields of a product.
///
/// Stock is absent here: quantity only moves through
/// [`apply_stock_delta`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub barcode: Option<String>,
}

impl ProductDetails {
    pub fn validated(self) -> DomainResult<Self> {
        Ok(Self {
            name: text::required("product name", &self.name)?,
            description: text::optional(self.description.as_deref()),
            category: text::optional(self.category.as_deref()),
            barcode: text::optional(self.barcode.as_deref()),
        })
    }
}

/// Ordering of product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductOrder {
    /// Alphabetical by name.
    #[default]
    Name,
    /// Newest first.
    Recent,
}

/// Total units on hand for one product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStock {
    /// Empty for uncategorised products.
    pub category: String,
    pub quantity: i64,
}

/// Apply `delta` to the current stock of `product_id`.
///
/// Invariant: stock cannot go negative.
pub fn apply_stock_delta(product_id: ProductId, available: i64, delta: i64) -> DomainResult<i64> {
    match available.checked_add(delta) {
        Some(next) if next >= 0 => Ok(next),
        Some(_) => Err(DomainError::NegativeStock {
            product_id,
            available,
            delta,
        }),
        None => Err(DomainError::validation(format!(
            "stock adjustment of {delta} overflows product {product_id}"
        ))),
    }
}
