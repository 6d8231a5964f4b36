//! Catalog domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

use greenstem_core::{CategoryId, ProductId};

/// A product category.
///
/// Every product belongs to exactly one category. Name and slug are
/// unique across the catalog.
#[derive(Debug, Clone, FromRow)]
pub struct Category {
    /// Unique category ID.
    pub id: CategoryId,
    /// Unique display name.
    pub name: String,
    /// Unique URL slug.
    pub slug: String,
}

/// A catalog product.
#[derive(Debug, Clone, FromRow)]
pub struct Product {
    /// Unique product ID.
    pub id: ProductId,
    /// Owning category.
    pub category_id: CategoryId,
    /// Display name. Not guaranteed unique; never used as a lookup key.
    pub name: String,
    /// Unique URL slug.
    pub slug: String,
    /// Long-form description.
    pub description: String,
    /// Stock-keeping unit, unique.
    pub sku: String,
    /// Current catalog price.
    pub price: Decimal,
    /// Units on hand. Never negative; decremented only at
    /// order-creation time, never at cart-add time.
    pub stock: i32,
    /// Whether the product is shown in the catalog.
    pub available: bool,
    /// When the product was created.
    pub created_at: DateTime<Utc>,
    /// When the product was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Units available for sale, clamped to zero.
    #[must_use]
    pub fn units_available(&self) -> u32 {
        u32::try_from(self.stock).unwrap_or(0)
    }
}
