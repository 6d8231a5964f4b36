//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Product listing (home)
//! GET  /health                 - Health check
//!
//! # Products
//! GET  /products               - Product listing, ?category= filters
//! GET  /products/{slug}        - Product detail
//!
//! # Cart (HTMX fragments)
//! GET  /cart                   - Cart page
//! POST /cart/add               - Add to cart (returns count badge, triggers cart-updated)
//! POST /cart/update            - Adjust quantity (returns cart_items fragment)
//! POST /cart/remove            - Remove item (returns cart_items fragment)
//! GET  /cart/count             - Cart count badge (fragment)
//!
//! # Checkout
//! GET  /checkout               - Checkout summary and address form
//! POST /checkout               - Create payment session, redirect to hosted page
//! GET  /payment/return         - Payment return (reconcile into an order)
//! GET  /payment/cancel         - Payment cancelled
//!
//! # Orders
//! GET  /orders                 - Order history (requires auth)
//! GET  /orders/{id}            - Order detail (owner or fresh guest order)
//! POST /orders/history/delete  - Delete a customer's history (staff only)
//!
//! # Contact
//! GET  /contact                - Contact form
//! POST /contact                - Submit contact form
//!
//! # Auth
//! GET  /auth/login             - Login page
//! POST /auth/login             - Login action
//! GET  /auth/register          - Register page
//! POST /auth/register          - Register action
//! POST /auth/logout            - Logout action
//! ```

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod contact;
pub mod orders;
pub mod products;

use axum::{
    Router,
    routing::{get, post},
};

use crate::middleware::{auth_rate_limiter, form_rate_limiter};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{slug}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/count", get(cart::count))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::history))
        .route("/{id}", get(orders::show))
        .route("/history/delete", post(orders::delete_history))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Home page doubles as the product listing
        .route("/", get(products::index))
        // Product routes
        .nest("/products", product_routes())
        // Cart routes (rate limited as a group)
        .nest("/cart", cart_routes().layer(form_rate_limiter()))
        // Checkout and payment return
        .route("/checkout", get(checkout::show).post(checkout::begin))
        .route("/payment/return", get(checkout::payment_return))
        .route("/payment/cancel", get(checkout::payment_cancel))
        // Order routes
        .nest("/orders", order_routes())
        // Contact form (rate limited like the other form handlers)
        .route(
            "/contact",
            get(contact::show)
                .post(contact::submit)
                .layer(form_rate_limiter()),
        )
        // Auth routes (strict rate limit against brute force)
        .nest("/auth", auth_routes().layer(auth_rate_limiter()))
}
