//! Catalog repository: read-only product and category queries.
//!
//! Catalog rows are read live on every request. Stock must reflect the
//! latest reconciliation, so nothing here is cached.

use sqlx::PgPool;

use greenstem_core::ProductId;

use super::RepositoryError;
use crate::models::product::{Category, Product};

/// Repository for catalog database operations.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    /// Create a new catalog repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List available products, optionally filtered by category slug,
    /// ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_available(
        &self,
        category_slug: Option<&str>,
    ) -> Result<Vec<Product>, RepositoryError> {
        let products = match category_slug {
            Some(slug) => {
                sqlx::query_as::<_, Product>(
                    r"
                    SELECT p.id, p.category_id, p.name, p.slug, p.description, p.sku,
                           p.price, p.stock, p.available, p.created_at, p.updated_at
                    FROM products p
                    JOIN categories c ON c.id = p.category_id
                    WHERE p.available AND c.slug = $1
                    ORDER BY p.name
                    ",
                )
                .bind(slug)
                .fetch_all(self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Product>(
                    r"
                    SELECT id, category_id, name, slug, description, sku,
                           price, stock, available, created_at, updated_at
                    FROM products
                    WHERE available
                    ORDER BY name
                    ",
                )
                .fetch_all(self.pool)
                .await?
            }
        };

        Ok(products)
    }

    /// Get an available product by its slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_available_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(
            r"
            SELECT id, category_id, name, slug, description, sku,
                   price, stock, available, created_at, updated_at
            FROM products
            WHERE slug = $1 AND available
            ",
        )
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;

        Ok(product)
    }

    /// Get a product by its id, available or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(
            r"
            SELECT id, category_id, name, slug, description, sku,
                   price, stock, available, created_at, updated_at
            FROM products
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(product)
    }

    /// Fetch several products by id in one query. Missing ids are simply
    /// absent from the result.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let raw_ids: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        let products = sqlx::query_as::<_, Product>(
            r"
            SELECT id, category_id, name, slug, description, sku,
                   price, stock, available, created_at, updated_at
            FROM products
            WHERE id = ANY($1)
            ",
        )
        .bind(&raw_ids)
        .fetch_all(self.pool)
        .await?;

        Ok(products)
    }

    /// List all categories ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT id, name, slug FROM categories ORDER BY name",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(categories)
    }
}
