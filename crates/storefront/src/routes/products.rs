//! Product route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use greenstem_core::format_usd;

use crate::db::catalog::CatalogRepository;
use crate::error::{AppError, Result};
use crate::models::product::{Category, Product};
use crate::state::AppState;

/// Product display data for templates.
#[derive(Clone)]
pub struct ProductView {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub price: String,
    pub in_stock: bool,
    pub units_available: u32,
}

impl From<&Product> for ProductView {
    fn from(product: &Product) -> Self {
        Self {
            slug: product.slug.clone(),
            name: product.name.clone(),
            description: product.description.clone(),
            price: format_usd(product.price),
            in_stock: product.units_available() > 0,
            units_available: product.units_available(),
        }
    }
}

/// Category display data for templates.
#[derive(Clone)]
pub struct CategoryView {
    pub name: String,
    pub slug: String,
    pub active: bool,
}

impl CategoryView {
    fn from_category(category: &Category, active_slug: Option<&str>) -> Self {
        Self {
            name: category.name.clone(),
            slug: category.slug.clone(),
            active: active_slug == Some(category.slug.as_str()),
        }
    }
}

/// Category filter query parameters.
#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    pub category: Option<String>,
}

/// Product listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub products: Vec<ProductView>,
    pub categories: Vec<CategoryView>,
    pub current_category: String,
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub product: ProductView,
    pub product_id: String,
}

/// Display product listing page, optionally filtered by category slug.
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<impl IntoResponse> {
    let catalog = CatalogRepository::new(state.pool());

    let category_slug = query
        .category
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let products = catalog.list_available(category_slug).await?;
    let categories = catalog.list_categories().await?;

    Ok(ProductsIndexTemplate {
        products: products.iter().map(ProductView::from).collect(),
        categories: categories
            .iter()
            .map(|c| CategoryView::from_category(c, category_slug))
            .collect(),
        current_category: category_slug.unwrap_or_default().to_owned(),
    })
}

/// Display product detail page.
pub async fn show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse> {
    let catalog = CatalogRepository::new(state.pool());

    let product = catalog
        .get_available_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {slug}")))?;

    Ok(ProductShowTemplate {
        product: ProductView::from(&product),
        product_id: product.id.to_string(),
    })
}
