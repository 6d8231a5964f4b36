//! Checkout route handlers.
//!
//! `GET /checkout` shows the priced summary and address form,
//! `POST /checkout` creates a hosted payment session and redirects the
//! customer to it. `GET /payment/return` is where the payment provider
//! sends the customer back; it reconciles the session into an order.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use greenstem_core::format_usd;

use crate::error::Result;
use crate::middleware::OptionalAuth;
use crate::models::session::{remember_order, set_flash, take_flash};
use crate::routes::cart::{CartView, clear_cart, load_cart};
use crate::services::checkout::CheckoutError;
use crate::state::AppState;

/// Checkout form data.
#[derive(Debug, Deserialize)]
pub struct CheckoutForm {
    pub email: String,
    pub shipping_address: String,
}

/// Payment return query parameters. The session id is untrusted input
/// used only as a lookup key.
#[derive(Debug, Deserialize)]
pub struct PaymentReturnQuery {
    pub session_id: Option<String>,
}

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/show.html")]
pub struct CheckoutTemplate {
    pub cart: CartView,
    pub shipping_fee: String,
    pub grand_total: String,
    pub email: String,
    pub message: String,
}

/// Display the checkout summary and address form.
#[instrument(skip(state, session, user))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Response {
    let cart = load_cart(&session).await;
    if cart.is_empty() {
        return Redirect::to("/cart").into_response();
    }

    let shipping_fee = state.config().stripe.shipping_fee;
    let grand_total = cart.total() + shipping_fee;
    let message = take_flash(&session).await.unwrap_or_default();

    CheckoutTemplate {
        cart: CartView::from(&cart),
        shipping_fee: format_usd(shipping_fee),
        grand_total: format_usd(grand_total),
        email: user.map(|u| u.email.to_string()).unwrap_or_default(),
        message,
    }
    .into_response()
}

/// Create a hosted payment session for the cart and redirect to it.
///
/// Fulfilment problems (empty cart, stale stock) flash a message and
/// return to the checkout page rather than erroring.
#[instrument(skip(state, session, user, form))]
pub async fn begin(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<CheckoutForm>,
) -> Result<Response> {
    let email = form.email.trim();
    let shipping_address = form.shipping_address.trim();
    if email.is_empty() || shipping_address.is_empty() {
        set_flash(&session, "Email and shipping address are required").await;
        return Ok(Redirect::to("/checkout").into_response());
    }

    let cart = load_cart(&session).await;

    match state
        .checkout()
        .begin(&cart, user.as_ref(), email, shipping_address)
        .await
    {
        Ok(url) => Ok(Redirect::to(&url).into_response()),
        Err(
            e @ (CheckoutError::EmptyCart
            | CheckoutError::InsufficientStock { .. }
            | CheckoutError::ProductGone { .. }),
        ) => {
            set_flash(&session, &e.to_string()).await;
            Ok(Redirect::to("/cart").into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Handle the return from the hosted payment page.
///
/// Reconciles the payment session into an order (idempotently; refreshes
/// of this URL land on the same order), clears the cart, and shows the
/// order confirmation.
#[instrument(skip(state, session))]
pub async fn payment_return(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<PaymentReturnQuery>,
) -> Result<Response> {
    match state.checkout().reconcile(query.session_id.as_deref()).await {
        Ok(order) => {
            clear_cart(&session).await;
            // Guests have no order history; the session remembers the
            // confirmation they are entitled to see.
            remember_order(&session, order.id).await;
            Ok(Redirect::to(&format!("/orders/{}", order.id)).into_response())
        }
        Err(CheckoutError::PaymentNotCompleted) => {
            set_flash(&session, "Your payment was not completed. Please try again.").await;
            Ok(Redirect::to("/checkout").into_response())
        }
        Err(CheckoutError::MissingSessionReference) => {
            set_flash(&session, "Missing payment reference.").await;
            Ok(Redirect::to("/cart").into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Handle a cancelled hosted payment. The cart is left untouched.
#[instrument(skip(session))]
pub async fn payment_cancel(session: Session) -> Response {
    set_flash(&session, "Payment cancelled. Your cart is unchanged.").await;
    Redirect::to("/checkout").into_response()
}
