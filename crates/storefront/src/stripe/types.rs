//! Stripe Checkout API payload types.
//!
//! Only the fields this storefront reads are modeled. Retrieved sessions
//! must be requested with `expand[]=line_items.data.price.product` so the
//! product metadata (carrying our durable product id) is inlined.

use std::collections::HashMap;

use serde::Deserialize;

use greenstem_core::ProductId;

/// Metadata key under which checkout-session line items carry our
/// durable product id. Recovery by display name is not supported:
/// names are neither unique nor stable.
pub const PRODUCT_ID_METADATA_KEY: &str = "product_id";

/// Payment state of a checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Payment captured.
    Paid,
    /// Not (yet) paid.
    Unpaid,
    /// Zero-amount session; treated as not paid for our purposes.
    NoPaymentRequired,
    /// Any state this client does not know about.
    #[serde(other)]
    Unknown,
}

/// A Stripe checkout session, as created or retrieved.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    /// Opaque session id (`cs_...`).
    pub id: String,
    /// Payment state.
    pub payment_status: PaymentStatus,
    /// Authoritative total in minor units. Present once the session has
    /// line items.
    #[serde(default)]
    pub amount_total: Option<i64>,
    /// Customer details as entered on the hosted page.
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    /// Opaque metadata we attached at creation time.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Line items; only present when expanded on retrieval.
    #[serde(default)]
    pub line_items: Option<LineItemList>,
    /// Hosted checkout URL; only present on freshly created sessions.
    #[serde(default)]
    pub url: Option<String>,
}

impl CheckoutSession {
    /// Email captured by the hosted checkout page, if any.
    #[must_use]
    pub fn customer_email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
    }

    /// Line items of this session, empty when not expanded.
    #[must_use]
    pub fn lines(&self) -> &[LineItem] {
        self.line_items.as_ref().map_or(&[], |list| &list.data)
    }
}

/// Customer details block of a session.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDetails {
    /// Email entered on the hosted page.
    #[serde(default)]
    pub email: Option<String>,
}

/// Paginated list wrapper Stripe uses for expanded line items.
#[derive(Debug, Clone, Deserialize)]
pub struct LineItemList {
    /// The line items themselves.
    #[serde(default)]
    pub data: Vec<LineItem>,
}

/// One line item of a retrieved session.
#[derive(Debug, Clone, Deserialize)]
pub struct LineItem {
    /// Display description Stripe derived from the product name.
    /// Presentation only; never used to recover product identity.
    #[serde(default)]
    pub description: Option<String>,
    /// Units purchased.
    #[serde(default)]
    pub quantity: Option<i64>,
    /// Line total in minor units.
    pub amount_total: i64,
    /// Price object, with the product expanded.
    #[serde(default)]
    pub price: Option<PriceInfo>,
}

/// Price block of a line item.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceInfo {
    /// The expanded product object carrying our metadata.
    #[serde(default)]
    pub product: Option<ProductInfo>,
}

/// Expanded product object of a price.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInfo {
    /// Metadata attached at session creation.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A line item classified by how it maps back onto the catalog.
///
/// Decoded explicitly from metadata rather than inferred from the
/// description string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLine {
    /// A catalog product line with a recovered product id.
    Product(ProductLine),
    /// A line that intentionally carries no product id, such as the
    /// shipping fee. Skipped during reconciliation.
    Fee {
        /// Display description, for logging.
        description: Option<String>,
        /// Line total in minor units.
        amount_total: i64,
    },
    /// A line that should map to a product but cannot be recovered.
    /// Logged and skipped; never fatal once payment is captured.
    Unrecoverable {
        /// Display description, for logging.
        description: Option<String>,
        /// Why recovery failed.
        reason: String,
    },
}

/// A recovered catalog product line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductLine {
    /// Durable product id recovered from line metadata.
    pub product_id: ProductId,
    /// Units purchased.
    pub quantity: u32,
    /// Line total in minor units.
    pub amount_total: i64,
}

impl LineItem {
    /// Classify this line by its attached product metadata.
    #[must_use]
    pub fn classify(&self) -> SessionLine {
        let metadata = self
            .price
            .as_ref()
            .and_then(|p| p.product.as_ref())
            .map(|p| &p.metadata);

        let Some(raw_id) = metadata.and_then(|m| m.get(PRODUCT_ID_METADATA_KEY)) else {
            return SessionLine::Fee {
                description: self.description.clone(),
                amount_total: self.amount_total,
            };
        };

        let product_id = match raw_id.parse::<ProductId>() {
            Ok(id) => id,
            Err(_) => {
                return SessionLine::Unrecoverable {
                    description: self.description.clone(),
                    reason: format!("malformed product id in metadata: {raw_id:?}"),
                };
            }
        };

        let quantity = match self.quantity.and_then(|q| u32::try_from(q).ok()) {
            Some(q) if q > 0 => q,
            _ => {
                return SessionLine::Unrecoverable {
                    description: self.description.clone(),
                    reason: format!("missing or invalid quantity: {:?}", self.quantity),
                };
            }
        };

        SessionLine::Product(ProductLine {
            product_id,
            quantity,
            amount_total: self.amount_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrieved_session_json() -> &'static str {
        r#"{
            "id": "cs_test_a1b2c3",
            "object": "checkout.session",
            "payment_status": "paid",
            "amount_total": 2300,
            "currency": "usd",
            "customer_details": {"email": "shopper@example.com", "name": "A. Shopper"},
            "metadata": {"customer_id": "7", "shipping_address": "12 Vine St"},
            "line_items": {
                "object": "list",
                "data": [
                    {
                        "id": "li_1",
                        "description": "Boston Fern",
                        "quantity": 2,
                        "amount_total": 2000,
                        "price": {
                            "id": "price_1",
                            "product": {
                                "id": "prod_1",
                                "metadata": {"product_id": "41"}
                            }
                        }
                    },
                    {
                        "id": "li_2",
                        "description": "Shipping",
                        "quantity": 1,
                        "amount_total": 300,
                        "price": {
                            "id": "price_2",
                            "product": {"id": "prod_2", "metadata": {}}
                        }
                    }
                ]
            }
        }"#
    }

    #[test]
    fn test_decode_retrieved_session() {
        let session: CheckoutSession =
            serde_json::from_str(retrieved_session_json()).expect("decode");

        assert_eq!(session.id, "cs_test_a1b2c3");
        assert_eq!(session.payment_status, PaymentStatus::Paid);
        assert_eq!(session.amount_total, Some(2300));
        assert_eq!(session.customer_email(), Some("shopper@example.com"));
        assert_eq!(session.metadata.get("customer_id").map(String::as_str), Some("7"));
        assert_eq!(session.lines().len(), 2);
    }

    #[test]
    fn test_decode_unknown_payment_status() {
        let json = r#"{"id": "cs_x", "payment_status": "something_new"}"#;
        let session: CheckoutSession = serde_json::from_str(json).expect("decode");
        assert_eq!(session.payment_status, PaymentStatus::Unknown);
        assert!(session.lines().is_empty());
    }

    #[test]
    fn test_classify_product_line() {
        let session: CheckoutSession =
            serde_json::from_str(retrieved_session_json()).expect("decode");

        let first = session.lines().first().expect("line");
        assert_eq!(
            first.classify(),
            SessionLine::Product(ProductLine {
                product_id: ProductId::new(41),
                quantity: 2,
                amount_total: 2000,
            })
        );
    }

    #[test]
    fn test_classify_fee_line_without_metadata() {
        let session: CheckoutSession =
            serde_json::from_str(retrieved_session_json()).expect("decode");

        let shipping = session.lines().get(1).expect("line");
        assert_eq!(
            shipping.classify(),
            SessionLine::Fee {
                description: Some("Shipping".to_owned()),
                amount_total: 300,
            }
        );
    }

    #[test]
    fn test_classify_malformed_product_id() {
        let line = LineItem {
            description: Some("Mystery".to_owned()),
            quantity: Some(1),
            amount_total: 500,
            price: Some(PriceInfo {
                product: Some(ProductInfo {
                    metadata: HashMap::from([(
                        PRODUCT_ID_METADATA_KEY.to_owned(),
                        "prod_abc".to_owned(),
                    )]),
                }),
            }),
        };

        assert!(matches!(line.classify(), SessionLine::Unrecoverable { .. }));
    }

    #[test]
    fn test_classify_zero_quantity_unrecoverable() {
        let line = LineItem {
            description: None,
            quantity: Some(0),
            amount_total: 500,
            price: Some(PriceInfo {
                product: Some(ProductInfo {
                    metadata: HashMap::from([(
                        PRODUCT_ID_METADATA_KEY.to_owned(),
                        "3".to_owned(),
                    )]),
                }),
            }),
        };

        assert!(matches!(line.classify(), SessionLine::Unrecoverable { .. }));
    }
}
