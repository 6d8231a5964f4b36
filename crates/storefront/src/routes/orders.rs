//! Order route handlers.
//!
//! Order history requires a login. The detail page is also visible to a
//! guest for the order their session just placed, so the confirmation
//! page after a guest checkout works without an account.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use greenstem_core::{OrderId, UserId, format_usd};

use crate::db::orders::{OrderItemDetail, OrderRepository};
use crate::error::{AppError, Result};
use crate::middleware::{OptionalAuth, RequireAuth, RequireStaff};
use crate::models::order::Order;
use crate::models::session::{remembered_order, set_flash, take_flash};
use crate::state::AppState;

/// Order summary display data for templates.
#[derive(Clone)]
pub struct OrderView {
    pub id: String,
    pub placed_at: String,
    pub total: String,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            placed_at: order.created_at.format("%b %-d, %Y").to_string(),
            total: format_usd(order.total_paid),
        }
    }
}

/// Order item display data for templates.
#[derive(Clone)]
pub struct OrderItemView {
    pub name: String,
    pub quantity: i32,
    pub unit_price: String,
    pub line_total: String,
}

impl From<&OrderItemDetail> for OrderItemView {
    fn from(item: &OrderItemDetail) -> Self {
        Self {
            name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price: format_usd(item.unit_price),
            line_total: format_usd(item.unit_price * rust_decimal::Decimal::from(item.quantity)),
        }
    }
}

/// History delete form data (staff only).
#[derive(Debug, Deserialize)]
pub struct DeleteHistoryForm {
    pub user_id: i32,
}

/// Order history page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/history.html")]
pub struct OrdersHistoryTemplate {
    pub orders: Vec<OrderView>,
    pub message: String,
}

/// Order detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/show.html")]
pub struct OrderShowTemplate {
    pub order: OrderView,
    pub email: String,
    pub shipping_address: String,
    pub items: Vec<OrderItemView>,
}

/// Display the logged-in customer's order history, newest first.
#[instrument(skip(state, session, user))]
pub async fn history(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse> {
    let orders = OrderRepository::new(state.pool())
        .history_for_customer(user.id)
        .await?;

    let message = take_flash(&session).await.unwrap_or_default();

    Ok(OrdersHistoryTemplate {
        orders: orders.iter().map(OrderView::from).collect(),
        message,
    })
}

/// Display one order.
///
/// Visible to the order's owner, to staff, and to the guest session
/// that just placed it. Everyone else gets 404 so order ids don't leak
/// existence.
#[instrument(skip(state, session, user))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    let order_id = OrderId::new(id);
    let repo = OrderRepository::new(state.pool());

    let order = repo
        .get(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {id}")))?;

    let is_owner = user
        .as_ref()
        .is_some_and(|u| order.customer_id == Some(u.id));
    let is_staff = user.as_ref().is_some_and(|u| u.is_staff);
    let is_session_order = remembered_order(&session).await == Some(order.id);

    if !is_owner && !is_staff && !is_session_order {
        return Err(AppError::NotFound(format!("order {id}")));
    }

    let items = repo.item_details(order.id).await?;

    Ok(OrderShowTemplate {
        order: OrderView::from(&order),
        email: order.customer_email.clone(),
        shipping_address: order.shipping_address.clone(),
        items: items.iter().map(OrderItemView::from).collect(),
    })
}

/// Delete a customer's entire order history. Staff only; irreversible.
#[instrument(skip(state, session, staff))]
pub async fn delete_history(
    State(state): State<AppState>,
    session: Session,
    RequireStaff(staff): RequireStaff,
    Form(form): Form<DeleteHistoryForm>,
) -> Result<Response> {
    let customer_id = UserId::new(form.user_id);

    let deleted = OrderRepository::new(state.pool())
        .delete_history_for_customer(customer_id)
        .await?;

    tracing::info!(
        staff = %staff.id,
        customer = %customer_id,
        deleted,
        "Deleted customer order history"
    );

    set_flash(&session, &format!("Deleted {deleted} orders")).await;
    Ok(Redirect::to("/orders").into_response())
}
