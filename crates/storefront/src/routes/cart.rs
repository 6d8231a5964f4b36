//! Cart route handlers.
//!
//! Cart operations use HTMX for dynamic updates without full page
//! reloads. The cart itself lives in the session; every mutation loads
//! it, applies one transition, and writes it back.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{AppendHeaders, Html, IntoResponse, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use greenstem_core::format_usd;

use crate::db::catalog::CatalogRepository;
use crate::models::cart::{Cart, CartError, QuantityAction};
use crate::models::session::{keys, take_flash};
use crate::state::AppState;

/// Cart item display data for templates.
#[derive(Clone)]
pub struct CartItemView {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub price: String,
    pub line_price: String,
}

/// Cart display data for templates.
#[derive(Clone)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub subtotal: String,
    pub item_count: u32,
}

impl CartView {
    /// Create an empty cart.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            subtotal: "$0.00".to_string(),
            item_count: 0,
        }
    }
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self {
            items: cart
                .lines()
                .map(|(product_id, line)| CartItemView {
                    product_id: product_id.to_owned(),
                    name: line.name.clone(),
                    quantity: line.quantity,
                    price: format_usd(line.unit_price),
                    line_price: format_usd(line.line_total()),
                })
                .collect(),
            subtotal: format_usd(cart.total()),
            item_count: cart.count(),
        }
    }
}

// =============================================================================
// Session Helpers
// =============================================================================

/// Load the cart from the session, defaulting to empty.
pub async fn load_cart(session: &Session) -> Cart {
    session
        .get::<Cart>(keys::CART)
        .await
        .ok()
        .flatten()
        .unwrap_or_default()
}

/// Write the cart back to the session.
pub async fn store_cart(session: &Session, cart: &Cart) {
    if let Err(e) = session.insert(keys::CART, cart).await {
        tracing::error!("Failed to store cart in session: {e}");
    }
}

/// Drop the cart from the session (after a successful checkout).
pub async fn clear_cart(session: &Session) {
    if let Err(e) = session.remove::<Cart>(keys::CART).await {
        tracing::error!("Failed to clear cart from session: {e}");
    }
}

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: String,
    pub quantity: Option<u32>,
}

/// Update cart form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub product_id: String,
    pub action: QuantityAction,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub product_id: String,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub cart: CartView,
    pub message: String,
}

/// Cart items fragment template (for HTMX).
///
/// `message` carries a user-facing notice, such as a rejected stock
/// increase; empty renders nothing.
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_items.html")]
pub struct CartItemsTemplate {
    pub cart: CartView,
    pub message: String,
}

/// Cart count badge fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: u32,
}

/// Display cart page.
#[instrument(skip(session))]
pub async fn show(session: Session) -> impl IntoResponse {
    let cart = load_cart(&session).await;
    let message = take_flash(&session).await.unwrap_or_default();

    CartShowTemplate {
        cart: CartView::from(&cart),
        message,
    }
}

/// Add item to cart (HTMX).
///
/// Looks the product up so the cart line snapshots a live name and
/// price, and so the requested quantity is validated against stock.
/// Returns an HTMX trigger to update the cart count badge.
#[instrument(skip(state, session))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<AddToCartForm>,
) -> Response {
    let quantity = form.quantity.unwrap_or(1);

    let Ok(product_id) = form.product_id.parse() else {
        return (StatusCode::BAD_REQUEST, Html("<span class=\"cart-error\">Unknown product</span>"))
            .into_response();
    };

    let catalog = CatalogRepository::new(state.pool());
    let product = match catalog.get_by_id(product_id).await {
        Ok(Some(product)) if product.available => product,
        Ok(_) => {
            return (
                StatusCode::NOT_FOUND,
                Html("<span class=\"cart-error\">Product is no longer available</span>"),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Failed to load product for cart add: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("<span class=\"cart-error\">Error adding to cart</span>"),
            )
                .into_response();
        }
    };

    let mut cart = load_cart(&session).await;
    match cart.add(&product, quantity) {
        Ok(()) => {
            store_cart(&session, &cart).await;
            (
                AppendHeaders([("HX-Trigger", "cart-updated")]),
                CartCountTemplate { count: cart.count() },
            )
                .into_response()
        }
        Err(CartError::OutOfStock { name }) => (
            StatusCode::CONFLICT,
            Html(format!("<span class=\"cart-error\">No more stock available for {name}</span>")),
        )
            .into_response(),
    }
}

/// Adjust cart item quantity by one (HTMX).
///
/// Increases revalidate against live stock; decreases floor at one.
#[instrument(skip(state, session))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<UpdateCartForm>,
) -> Response {
    let mut cart = load_cart(&session).await;

    // Live stock bounds an increase; a vanished product allows none.
    let live_stock = match form.product_id.parse() {
        Ok(product_id) => CatalogRepository::new(state.pool())
            .get_by_id(product_id)
            .await
            .ok()
            .flatten()
            .filter(|p| p.available)
            .map_or(0, |p| p.stock),
        Err(_) => 0,
    };

    let message = match cart.adjust(&form.product_id, form.action, live_stock) {
        Ok(()) => {
            store_cart(&session, &cart).await;
            String::new()
        }
        Err(CartError::OutOfStock { name }) => {
            tracing::debug!(product = %name, "Cart increase rejected at stock limit");
            format!("No more stock available for {name}")
        }
    };

    (
        AppendHeaders([("HX-Trigger", "cart-updated")]),
        CartItemsTemplate {
            cart: CartView::from(&cart),
            message,
        },
    )
        .into_response()
}

/// Remove item from cart (HTMX).
#[instrument(skip(session))]
pub async fn remove(session: Session, Form(form): Form<RemoveFromCartForm>) -> Response {
    let mut cart = load_cart(&session).await;

    if cart.remove(&form.product_id) {
        store_cart(&session, &cart).await;
    }

    (
        AppendHeaders([("HX-Trigger", "cart-updated")]),
        CartItemsTemplate {
            cart: CartView::from(&cart),
            message: String::new(),
        },
    )
        .into_response()
}

/// Get cart count badge (HTMX).
#[instrument(skip(session))]
pub async fn count(session: Session) -> impl IntoResponse {
    let cart = load_cart(&session).await;
    CartCountTemplate { count: cart.count() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_line_view() -> CartView {
        CartView {
            items: vec![CartItemView {
                product_id: "1".to_owned(),
                name: "Boston Fern".to_owned(),
                quantity: 2,
                price: "$19.99".to_owned(),
                line_price: "$39.98".to_owned(),
            }],
            subtotal: "$39.98".to_owned(),
            item_count: 2,
        }
    }

    #[test]
    fn test_cart_items_fragment_shows_stock_notice() {
        // A rejected increase must reach the customer, not just the log.
        let html = CartItemsTemplate {
            cart: one_line_view(),
            message: "No more stock available for Boston Fern".to_owned(),
        }
        .render()
        .expect("render");

        assert!(html.contains("No more stock available for Boston Fern"));
        assert!(html.contains("cart-notice"));
    }

    #[test]
    fn test_cart_items_fragment_without_notice() {
        let html = CartItemsTemplate {
            cart: one_line_view(),
            message: String::new(),
        }
        .render()
        .expect("render");

        assert!(!html.contains("cart-notice"));
        assert!(html.contains("Boston Fern"));
    }
}
