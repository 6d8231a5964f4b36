//! Order repository.
//!
//! Order creation is transactional: the order row, its items, and the
//! matching stock decrements commit together or not at all. The unique
//! index on `payment_session_id` enforces the at-most-one-order-per-
//! payment-session invariant at the database level.

use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

use greenstem_core::{OrderId, ProductId, UserId};

use super::RepositoryError;
use crate::models::order::{Order, OrderItem};

/// Data for a new order row.
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Owning customer, `None` for guest checkouts.
    pub customer_id: Option<UserId>,
    /// Customer email from the payment session.
    pub customer_email: String,
    /// Shipping address captured at checkout.
    pub shipping_address: String,
    /// Authoritative total from the payment session.
    pub total_paid: Decimal,
    /// External checkout-session id (idempotency key).
    pub payment_session_id: String,
}

/// Data for a new order item row.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    /// Product sold.
    pub product_id: ProductId,
    /// Units sold.
    pub quantity: i32,
    /// Unit price at time of sale.
    pub unit_price: Decimal,
}

/// An order item joined with its product's display name.
#[derive(Debug, Clone, FromRow)]
pub struct OrderItemDetail {
    /// Product sold.
    pub product_id: ProductId,
    /// Product display name (live; for presentation only).
    pub product_name: String,
    /// Units sold.
    pub quantity: i32,
    /// Unit price at time of sale.
    pub unit_price: Decimal,
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Look up an order by its external payment-session id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_payment_session(
        &self,
        payment_session_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(
            r"
            SELECT id, customer_id, customer_email, shipping_address,
                   total_paid, payment_session_id, created_at, updated_at
            FROM orders
            WHERE payment_session_id = $1
            ",
        )
        .bind(payment_session_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Create an order together with its items and the matching stock
    /// decrements, all in one transaction.
    ///
    /// Items whose product row has vanished are skipped with a warning;
    /// payment has already been captured, so a missing product must not
    /// sink the whole order. Stock is clamped at zero rather than driven
    /// through the `CHECK (stock >= 0)` constraint.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if an order already exists for
    /// this payment session (concurrent reconciliation of the same
    /// return visit), `RepositoryError::Database` for other failures. On
    /// error nothing is committed.
    pub async fn create_with_items(
        &self,
        order: &NewOrder,
        items: &[NewOrderItem],
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Order>(
            r"
            INSERT INTO orders
                (customer_id, customer_email, shipping_address, total_paid, payment_session_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, customer_id, customer_email, shipping_address,
                      total_paid, payment_session_id, created_at, updated_at
            ",
        )
        .bind(order.customer_id)
        .bind(&order.customer_email)
        .bind(&order.shipping_address)
        .bind(order.total_paid)
        .bind(&order.payment_session_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict(
                    "order already exists for payment session".to_owned(),
                );
            }
            RepositoryError::Database(e)
        })?;

        for item in items {
            let updated = sqlx::query(
                r"
                UPDATE products
                SET stock = GREATEST(stock - $2, 0), updated_at = NOW()
                WHERE id = $1
                ",
            )
            .bind(item.product_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                tracing::warn!(
                    order_id = %created.id,
                    product_id = %item.product_id,
                    "Product no longer exists, skipping order item"
                );
                continue;
            }

            sqlx::query(
                r"
                INSERT INTO order_items (order_id, product_id, quantity, unit_price)
                VALUES ($1, $2, $3, $4)
                ",
            )
            .bind(created.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    /// Get an order by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(
            r"
            SELECT id, customer_id, customer_email, shipping_address,
                   total_paid, payment_session_id, created_at, updated_at
            FROM orders
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// List a customer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn history_for_customer(
        &self,
        customer_id: UserId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(
            r"
            SELECT id, customer_id, customer_email, shipping_address,
                   total_paid, payment_session_id, created_at, updated_at
            FROM orders
            WHERE customer_id = $1
            ORDER BY created_at DESC
            ",
        )
        .bind(customer_id)
        .fetch_all(self.pool)
        .await?;

        Ok(orders)
    }

    /// List the items of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let items = sqlx::query_as::<_, OrderItem>(
            r"
            SELECT id, order_id, product_id, quantity, unit_price
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;

        Ok(items)
    }

    /// List the items of an order joined with product names, for display.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn item_details(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<OrderItemDetail>, RepositoryError> {
        let items = sqlx::query_as::<_, OrderItemDetail>(
            r"
            SELECT i.product_id, p.name AS product_name, i.quantity, i.unit_price
            FROM order_items i
            JOIN products p ON p.id = i.product_id
            WHERE i.order_id = $1
            ORDER BY i.id
            ",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;

        Ok(items)
    }

    /// Delete a customer's entire order history. Irreversible; callers
    /// must enforce staff privilege.
    ///
    /// Returns the number of orders deleted (items cascade).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_history_for_customer(
        &self,
        customer_id: UserId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM orders WHERE customer_id = $1")
            .bind(customer_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
