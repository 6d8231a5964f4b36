//! The session shopping cart.
//!
//! The cart is an explicit value type: handlers load it from the session,
//! apply a transformation, and write the whole value back. All methods
//! here are pure state transitions - no I/O, no ambient session access.
//!
//! Each line snapshots the product's name and unit price at add time.
//! Totals are computed from those snapshots, not from live catalog data;
//! the authoritative charge amount comes later from the payment session.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::product::Product;

/// Errors from cart transformations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CartError {
    /// The product has no stock, or the cart already holds all of it.
    #[error("no more stock available for {name}")]
    OutOfStock {
        /// Display name of the offending product.
        name: String,
    },
}

/// Quantity adjustment direction for an existing cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantityAction {
    /// Add one unit, capped at live stock.
    Increase,
    /// Remove one unit, floored at quantity 1.
    Decrease,
}

/// One product-quantity entry in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Units of this product in the cart. Always >= 1.
    pub quantity: u32,
    /// Unit price snapshot captured at add time.
    pub unit_price: Decimal,
    /// Display name snapshot captured at add time.
    pub name: String,
}

impl CartLine {
    /// Line total (snapshot price x quantity).
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A session-scoped shopping cart, keyed by product id string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: BTreeMap<String, CartLine>,
}

impl Cart {
    /// Add `requested` units of a product, inserting a new line or
    /// incrementing an existing one. A requested quantity of zero is
    /// treated as one, so a line can never hold quantity 0.
    ///
    /// The line snapshots the product's current price and name on first
    /// insert; later adds keep the original snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::OutOfStock`] if the product has no stock or
    /// if the existing quantity plus `requested` would exceed it. The
    /// cart is unchanged on error.
    pub fn add(&mut self, product: &Product, requested: u32) -> Result<(), CartError> {
        let requested = requested.max(1);
        let available = product.units_available();
        if available == 0 {
            return Err(CartError::OutOfStock {
                name: product.name.clone(),
            });
        }

        let key = product.id.to_string();
        let current = self.lines.get(&key).map_or(0, |line| line.quantity);
        if current.saturating_add(requested) > available {
            return Err(CartError::OutOfStock {
                name: product.name.clone(),
            });
        }

        self.lines
            .entry(key)
            .and_modify(|line| line.quantity += requested)
            .or_insert_with(|| CartLine {
                quantity: requested,
                unit_price: product.price,
                name: product.name.clone(),
            });
        Ok(())
    }

    /// Adjust an existing line by one unit.
    ///
    /// Increasing past the live stock is rejected; decreasing at
    /// quantity 1 is a no-op (removal requires an explicit
    /// [`remove`](Self::remove)). Adjusting a product that is not in the
    /// cart is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::OutOfStock`] when an increase would exceed
    /// `live_stock`.
    pub fn adjust(
        &mut self,
        product_id: &str,
        action: QuantityAction,
        live_stock: i32,
    ) -> Result<(), CartError> {
        let Some(line) = self.lines.get_mut(product_id) else {
            return Ok(());
        };

        match action {
            QuantityAction::Increase => {
                let available = u32::try_from(live_stock).unwrap_or(0);
                if line.quantity >= available {
                    return Err(CartError::OutOfStock {
                        name: line.name.clone(),
                    });
                }
                line.quantity += 1;
            }
            QuantityAction::Decrease => {
                if line.quantity > 1 {
                    line.quantity -= 1;
                }
            }
        }
        Ok(())
    }

    /// Remove a line entirely. Returns whether a line was removed.
    pub fn remove(&mut self, product_id: &str) -> bool {
        self.lines.remove(product_id).is_some()
    }

    /// Sum of snapshot unit price x quantity across all lines.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.lines.values().map(CartLine::line_total).sum()
    }

    /// Sum of quantities across all lines (the badge count).
    #[must_use]
    pub fn count(&self) -> u32 {
        self.lines.values().map(|line| line.quantity).sum()
    }

    /// Whether the cart holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Iterate over (product id, line) entries in key order.
    pub fn lines(&self) -> impl Iterator<Item = (&str, &CartLine)> {
        self.lines.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Look up the line for a product id.
    #[must_use]
    pub fn get(&self, product_id: &str) -> Option<&CartLine> {
        self.lines.get(product_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use greenstem_core::{CategoryId, ProductId};

    use super::*;

    fn product(id: i32, name: &str, price: Decimal, stock: i32) -> Product {
        Product {
            id: ProductId::new(id),
            category_id: CategoryId::new(1),
            name: name.to_owned(),
            slug: name.to_lowercase().replace(' ', "-"),
            description: String::new(),
            sku: format!("SKU-{id}"),
            price,
            stock,
            available: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_add_inserts_line_with_snapshot() {
        let mut cart = Cart::default();
        let fern = product(1, "Boston Fern", Decimal::new(1999, 2), 5);

        cart.add(&fern, 2).expect("stock available");

        let line = cart.get("1").expect("line present");
        assert_eq!(line.quantity, 2);
        assert_eq!(line.unit_price, Decimal::new(1999, 2));
        assert_eq!(line.name, "Boston Fern");
    }

    #[test]
    fn test_add_increments_existing_line() {
        let mut cart = Cart::default();
        let fern = product(1, "Boston Fern", Decimal::new(1999, 2), 5);

        cart.add(&fern, 1).expect("first add");
        cart.add(&fern, 2).expect("second add");

        assert_eq!(cart.get("1").expect("line").quantity, 3);
    }

    #[test]
    fn test_add_keeps_original_price_snapshot() {
        let mut cart = Cart::default();
        let mut fern = product(1, "Boston Fern", Decimal::new(1999, 2), 5);

        cart.add(&fern, 1).expect("first add");
        fern.price = Decimal::new(2499, 2);
        cart.add(&fern, 1).expect("second add");

        assert_eq!(cart.get("1").expect("line").unit_price, Decimal::new(1999, 2));
    }

    #[test]
    fn test_add_zero_quantity_inserts_one() {
        let mut cart = Cart::default();
        let fern = product(1, "Boston Fern", Decimal::new(1999, 2), 5);

        cart.add(&fern, 0).expect("stock available");

        // Lines always hold at least one unit.
        assert_eq!(cart.get("1").expect("line").quantity, 1);
    }

    #[test]
    fn test_add_rejects_zero_stock() {
        let mut cart = Cart::default();
        let fern = product(1, "Boston Fern", Decimal::new(1999, 2), 0);

        let err = cart.add(&fern, 1).expect_err("no stock");
        assert_eq!(
            err,
            CartError::OutOfStock {
                name: "Boston Fern".to_owned()
            }
        );
        assert!(cart.is_empty());
    }

    #[test]
    fn test_add_never_exceeds_stock() {
        let mut cart = Cart::default();
        let fern = product(1, "Boston Fern", Decimal::new(1999, 2), 3);

        cart.add(&fern, 3).expect("exactly stock");
        assert!(cart.add(&fern, 1).is_err());
        assert_eq!(cart.get("1").expect("line").quantity, 3);
    }

    #[test]
    fn test_increase_capped_at_live_stock() {
        let mut cart = Cart::default();
        let fern = product(1, "Boston Fern", Decimal::new(1999, 2), 2);
        cart.add(&fern, 2).expect("add");

        let err = cart
            .adjust("1", QuantityAction::Increase, 2)
            .expect_err("at stock limit");
        assert!(matches!(err, CartError::OutOfStock { .. }));
        assert_eq!(cart.get("1").expect("line").quantity, 2);
    }

    #[test]
    fn test_increase_within_live_stock() {
        let mut cart = Cart::default();
        let fern = product(1, "Boston Fern", Decimal::new(1999, 2), 5);
        cart.add(&fern, 1).expect("add");

        cart.adjust("1", QuantityAction::Increase, 5).expect("room left");
        assert_eq!(cart.get("1").expect("line").quantity, 2);
    }

    #[test]
    fn test_decrease_floors_at_one() {
        let mut cart = Cart::default();
        let fern = product(1, "Boston Fern", Decimal::new(1999, 2), 5);
        cart.add(&fern, 1).expect("add");

        cart.adjust("1", QuantityAction::Decrease, 5).expect("no-op");
        assert_eq!(cart.get("1").expect("line").quantity, 1);
    }

    #[test]
    fn test_adjust_unknown_product_is_noop() {
        let mut cart = Cart::default();
        cart.adjust("99", QuantityAction::Increase, 10).expect("no-op");
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut cart = Cart::default();
        let fern = product(1, "Boston Fern", Decimal::new(1999, 2), 5);
        cart.add(&fern, 1).expect("add");

        assert!(cart.remove("1"));
        assert!(!cart.remove("1"));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_total_uses_fixed_point_snapshots() {
        let mut cart = Cart::default();
        let fern = product(1, "Boston Fern", Decimal::new(1000, 2), 5);
        let pot = product(2, "Terracotta Pot", Decimal::new(333, 2), 10);

        cart.add(&fern, 2).expect("add fern");
        cart.add(&pot, 3).expect("add pot");

        // 2 x 10.00 + 3 x 3.33 = 29.99, exactly.
        assert_eq!(cart.total(), Decimal::new(2999, 2));
    }

    #[test]
    fn test_count_sums_quantities() {
        let mut cart = Cart::default();
        let fern = product(1, "Boston Fern", Decimal::new(1999, 2), 5);
        let pot = product(2, "Terracotta Pot", Decimal::new(333, 2), 10);

        cart.add(&fern, 2).expect("add fern");
        cart.add(&pot, 4).expect("add pot");

        assert_eq!(cart.count(), 6);
    }

    #[test]
    fn test_empty_cart_totals() {
        let cart = Cart::default();
        assert_eq!(cart.total(), Decimal::ZERO);
        assert_eq!(cart.count(), 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_session_serde_roundtrip() {
        let mut cart = Cart::default();
        let fern = product(1, "Boston Fern", Decimal::new(1999, 2), 5);
        cart.add(&fern, 2).expect("add");

        let json = serde_json::to_string(&cart).expect("serialize");
        let back: Cart = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, cart);
    }
}
