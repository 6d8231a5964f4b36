//! Order domain types.
//!
//! Orders are durable records created only by payment reconciliation,
//! never directly from cart state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

use greenstem_core::{OrderId, OrderItemId, ProductId, UserId};

/// A completed, paid order.
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    /// Unique order ID.
    pub id: OrderId,
    /// Owning customer. `None` for guest checkouts.
    pub customer_id: Option<UserId>,
    /// Email the confirmation was sent to.
    pub customer_email: String,
    /// Free-text shipping address captured at checkout.
    pub shipping_address: String,
    /// Total actually charged, taken from the payment session's
    /// authoritative total - not recomputed from cart data.
    pub total_paid: Decimal,
    /// External checkout-session id. Unique; the idempotency key that
    /// prevents duplicate orders on repeat return visits.
    pub payment_session_id: String,
    /// When the order was created.
    pub created_at: DateTime<Utc>,
    /// When the order was last updated.
    pub updated_at: DateTime<Utc>,
}

/// One product line of an order.
///
/// Quantity and unit price are captured at time of sale so history
/// stays accurate when catalog prices change later.
#[derive(Debug, Clone, FromRow)]
pub struct OrderItem {
    /// Unique order item ID.
    pub id: OrderItemId,
    /// Owning order.
    pub order_id: OrderId,
    /// Product sold.
    pub product_id: ProductId,
    /// Units sold.
    pub quantity: i32,
    /// Price per unit at time of sale.
    pub unit_price: Decimal,
}

impl OrderItem {
    /// Line total (quantity x unit price at time of sale).
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}
