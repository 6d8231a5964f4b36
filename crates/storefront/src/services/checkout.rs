//! Checkout orchestration.
//!
//! Two halves: `begin` prices the cart and creates a hosted checkout
//! session, `reconcile` turns a finished payment session back into a
//! local order. Reconciliation is idempotent on the payment-session id,
//! so a refreshed or replayed return URL always lands on the same order.
//!
//! Product identity crosses the payment boundary only through the
//! `product_id` metadata attached to each line at creation time. Lines
//! whose metadata cannot be recovered are logged and skipped; once the
//! payment is captured, a single bad line must not lose the order.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;

use greenstem_core::{MoneyError, ProductId, UserId, from_minor_units, to_minor_units};

use crate::config::StorefrontConfig;
use crate::db::RepositoryError;
use crate::db::catalog::CatalogRepository;
use crate::db::orders::{NewOrder, NewOrderItem, OrderRepository};
use crate::models::cart::Cart;
use crate::models::order::Order;
use crate::models::session::CurrentUser;
use crate::services::email::EmailService;
use crate::stripe::types::{CheckoutSession, PaymentStatus, SessionLine};
use crate::stripe::{CreateSessionLine, CreateSessionRequest, StripeClient, StripeError};

/// Session metadata key carrying the logged-in customer's id.
const CUSTOMER_ID_METADATA_KEY: &str = "customer_id";
/// Session metadata key carrying the shipping address from our form.
const SHIPPING_ADDRESS_METADATA_KEY: &str = "shipping_address";

/// Display name of the flat shipping line on the hosted page.
const SHIPPING_LINE_NAME: &str = "Shipping";

/// Errors from checkout orchestration.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Checkout was started with an empty cart.
    #[error("cart is empty")]
    EmptyCart,

    /// A cart line wants more units than the catalog currently has.
    #[error("not enough stock for {name}: {available} available")]
    InsufficientStock {
        /// Display name of the product.
        name: String,
        /// Units currently available.
        available: u32,
    },

    /// A cart line references a product that no longer exists or is no
    /// longer offered.
    #[error("{name} is no longer available")]
    ProductGone {
        /// Display name from the cart snapshot.
        name: String,
    },

    /// The return URL carried no session id to reconcile against.
    #[error("missing payment session reference")]
    MissingSessionReference,

    /// The payment session exists but is not paid.
    #[error("payment not completed")]
    PaymentNotCompleted,

    /// A paid session without a total; nothing to charge an order with.
    #[error("payment session has no total")]
    MissingTotal,

    /// Stripe API failure.
    #[error(transparent)]
    Stripe(#[from] StripeError),

    /// Database failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A price left the representable currency range.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// A reconciliation decision computed purely from a retrieved session.
#[derive(Debug)]
struct OrderPlan {
    order: NewOrder,
    items: Vec<NewOrderItem>,
    skipped: Vec<SkippedLine>,
}

/// A session line that could not be mapped onto the catalog.
#[derive(Debug)]
struct SkippedLine {
    description: Option<String>,
    reason: String,
}

/// Orchestrates checkout-session creation and payment reconciliation.
#[derive(Clone)]
pub struct CheckoutService {
    pool: PgPool,
    stripe: StripeClient,
    base_url: String,
    currency: String,
    shipping_fee: Decimal,
    mailer: Option<EmailService>,
}

impl CheckoutService {
    /// Create a new checkout service.
    #[must_use]
    pub fn new(
        pool: PgPool,
        stripe: StripeClient,
        config: &StorefrontConfig,
        mailer: Option<EmailService>,
    ) -> Self {
        Self {
            pool,
            stripe,
            base_url: config.base_url.clone(),
            currency: config.stripe.currency.clone(),
            shipping_fee: config.stripe.shipping_fee,
            mailer,
        }
    }

    /// Price the cart against live stock and create a hosted checkout
    /// session. Returns the URL the customer must be redirected to.
    ///
    /// Every cart line is revalidated against the catalog here; the cart
    /// was checked at add time, but stock may have moved since.
    ///
    /// # Errors
    ///
    /// Returns `EmptyCart`, `ProductGone`, or `InsufficientStock` if the
    /// cart cannot be fulfilled as-is; `Stripe` or `Repository` on
    /// downstream failure. No session is created on error.
    pub async fn begin(
        &self,
        cart: &Cart,
        current_user: Option<&CurrentUser>,
        customer_email: &str,
        shipping_address: &str,
    ) -> Result<String, CheckoutError> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let products = self.load_cart_products(cart).await?;

        let mut lines = Vec::with_capacity(cart.lines().count() + 1);
        for (key, line) in cart.lines() {
            let product = products.get(key).ok_or_else(|| CheckoutError::ProductGone {
                name: line.name.clone(),
            })?;

            let available = product.units_available();
            if line.quantity > available {
                return Err(CheckoutError::InsufficientStock {
                    name: product.name.clone(),
                    available,
                });
            }

            lines.push(CreateSessionLine {
                name: line.name.clone(),
                unit_amount: to_minor_units(line.unit_price)?,
                quantity: line.quantity,
                product_id: Some(product.id),
            });
        }

        if self.shipping_fee > Decimal::ZERO {
            lines.push(CreateSessionLine {
                name: SHIPPING_LINE_NAME.to_owned(),
                unit_amount: to_minor_units(self.shipping_fee)?,
                quantity: 1,
                product_id: None,
            });
        }

        let mut metadata = vec![(
            SHIPPING_ADDRESS_METADATA_KEY.to_owned(),
            shipping_address.to_owned(),
        )];
        if let Some(user) = current_user {
            metadata.push((CUSTOMER_ID_METADATA_KEY.to_owned(), user.id.to_string()));
        }

        let request = CreateSessionRequest {
            currency: self.currency.clone(),
            customer_email: customer_email.to_owned(),
            // Stripe substitutes the placeholder with the session id on
            // redirect; it must reach the API verbatim.
            success_url: format!(
                "{}/payment/return?session_id={{CHECKOUT_SESSION_ID}}",
                self.base_url
            ),
            cancel_url: format!("{}/payment/cancel", self.base_url),
            metadata,
            lines,
        };

        let session = self.stripe.create_checkout_session(&request).await?;
        session.url.ok_or_else(|| {
            CheckoutError::Stripe(StripeError::Parse(
                "created session carries no redirect url".to_owned(),
            ))
        })
    }

    /// Reconcile a payment return into a local order, creating it if this
    /// is the first visit for the session.
    ///
    /// The session id comes from an untrusted query parameter and is only
    /// ever used as a lookup key; payment state, total, items, and
    /// customer identity are all taken from the retrieved session.
    ///
    /// # Errors
    ///
    /// Returns `MissingSessionReference` if no id was supplied,
    /// `PaymentNotCompleted` for unpaid sessions (no order is created),
    /// `Stripe` or `Repository` on downstream failure.
    pub async fn reconcile(&self, session_id: Option<&str>) -> Result<Order, CheckoutError> {
        let session_id = session_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(CheckoutError::MissingSessionReference)?;

        let orders = OrderRepository::new(&self.pool);
        let outcome = reconcile_session(&orders, session_id, || {
            self.stripe.retrieve_checkout_session(session_id)
        })
        .await?;

        match outcome {
            Reconciliation::Created(order) => {
                tracing::info!(
                    order_id = %order.id,
                    payment_session_id = %order.payment_session_id,
                    total = %order.total_paid,
                    "Created order from payment session"
                );
                self.send_confirmation(&order).await;
                Ok(order)
            }
            Reconciliation::Existing(order) => Ok(order),
        }
    }

    /// Load the catalog rows for every product in the cart, keyed the
    /// same way the cart keys its lines.
    async fn load_cart_products(
        &self,
        cart: &Cart,
    ) -> Result<HashMap<String, crate::models::product::Product>, CheckoutError> {
        let ids: Vec<ProductId> = cart
            .lines()
            .filter_map(|(key, _)| key.parse::<ProductId>().ok())
            .collect();

        let catalog = CatalogRepository::new(&self.pool);
        let products = catalog.list_by_ids(&ids).await?;

        Ok(products
            .into_iter()
            .filter(|p| p.available)
            .map(|p| (p.id.to_string(), p))
            .collect())
    }

    /// Best-effort confirmation email. A delivery failure is logged and
    /// swallowed; the order is already committed.
    async fn send_confirmation(&self, order: &Order) {
        let Some(mailer) = &self.mailer else {
            return;
        };
        if order.customer_email.is_empty() {
            return;
        }

        if let Err(e) = mailer.send_order_confirmation(order).await {
            tracing::error!(
                order_id = %order.id,
                error = %e,
                "Failed to send order confirmation email"
            );
        }
    }
}

/// Order persistence as reconciliation sees it. Split out from the
/// repository so replay and insert-race behavior can be exercised
/// without a database.
trait OrderStore {
    async fn find_by_payment_session(
        &self,
        payment_session_id: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    async fn create_with_items(
        &self,
        order: &NewOrder,
        items: &[NewOrderItem],
    ) -> Result<Order, RepositoryError>;
}

impl OrderStore for OrderRepository<'_> {
    async fn find_by_payment_session(
        &self,
        payment_session_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::find_by_payment_session(self, payment_session_id).await
    }

    async fn create_with_items(
        &self,
        order: &NewOrder,
        items: &[NewOrderItem],
    ) -> Result<Order, RepositoryError> {
        OrderRepository::create_with_items(self, order, items).await
    }
}

/// How a reconciliation resolved: `Created` carries an order persisted
/// by this call, `Existing` one found from an earlier or concurrent
/// reconciliation of the same session.
#[derive(Debug)]
enum Reconciliation {
    Created(Order),
    Existing(Order),
}

/// Resolve a payment session to exactly one order.
///
/// The store is consulted before the payment API is, so a replayed
/// return URL never triggers a remote retrieve. If the insert loses a
/// race with a concurrent reconciliation, the winner's order is
/// adopted.
async fn reconcile_session<S, F, Fut>(
    store: &S,
    session_id: &str,
    retrieve: F,
) -> Result<Reconciliation, CheckoutError>
where
    S: OrderStore,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<CheckoutSession, StripeError>>,
{
    if let Some(existing) = store.find_by_payment_session(session_id).await? {
        return Ok(Reconciliation::Existing(existing));
    }

    let session = retrieve().await?;
    let plan = plan_order(&session)?;

    for skipped in &plan.skipped {
        tracing::warn!(
            payment_session_id = %session.id,
            description = skipped.description.as_deref().unwrap_or("<none>"),
            reason = %skipped.reason,
            "Skipping unrecoverable payment session line"
        );
    }

    match store.create_with_items(&plan.order, &plan.items).await {
        Ok(order) => Ok(Reconciliation::Created(order)),
        Err(RepositoryError::Conflict(_)) => {
            let order = store
                .find_by_payment_session(session_id)
                .await?
                .ok_or_else(|| {
                    RepositoryError::Conflict("order vanished after conflict".to_owned())
                })?;
            Ok(Reconciliation::Existing(order))
        }
        Err(e) => Err(e.into()),
    }
}

/// Decide what order a retrieved session should become. Pure: no I/O,
/// no clock, everything comes from the session.
fn plan_order(session: &CheckoutSession) -> Result<OrderPlan, CheckoutError> {
    if session.payment_status != PaymentStatus::Paid {
        return Err(CheckoutError::PaymentNotCompleted);
    }

    // The session total is authoritative; never recompute it from lines.
    let total_minor = session.amount_total.ok_or(CheckoutError::MissingTotal)?;
    let total_paid = from_minor_units(total_minor);

    let customer_id = session
        .metadata
        .get(CUSTOMER_ID_METADATA_KEY)
        .and_then(|raw| raw.parse::<UserId>().ok());
    let customer_email = session.customer_email().unwrap_or_default().to_owned();
    let shipping_address = session
        .metadata
        .get(SHIPPING_ADDRESS_METADATA_KEY)
        .cloned()
        .unwrap_or_default();

    let mut items = Vec::new();
    let mut skipped = Vec::new();
    for line in session.lines() {
        match line.classify() {
            SessionLine::Product(product_line) => {
                let quantity = Decimal::from(product_line.quantity);
                let unit_price =
                    (from_minor_units(product_line.amount_total) / quantity).round_dp(2);
                items.push(NewOrderItem {
                    product_id: product_line.product_id,
                    quantity: i32::try_from(product_line.quantity).unwrap_or(i32::MAX),
                    unit_price,
                });
            }
            // Fee lines carry no product on purpose.
            SessionLine::Fee { .. } => {}
            SessionLine::Unrecoverable {
                description,
                reason,
            } => skipped.push(SkippedLine {
                description,
                reason,
            }),
        }
    }

    Ok(OrderPlan {
        order: NewOrder {
            customer_id,
            customer_email,
            shipping_address,
            total_paid,
            payment_session_id: session.id.clone(),
        },
        items,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;

    use greenstem_core::{OrderId, ProductId};

    use super::*;

    /// In-memory order store with the same uniqueness guarantee the
    /// database enforces on the payment-session id.
    struct MemoryOrderStore {
        orders: Mutex<Vec<Order>>,
    }

    impl MemoryOrderStore {
        fn new() -> Self {
            Self {
                orders: Mutex::new(Vec::new()),
            }
        }

        fn len(&self) -> usize {
            self.orders.lock().expect("store lock").len()
        }
    }

    impl OrderStore for MemoryOrderStore {
        async fn find_by_payment_session(
            &self,
            payment_session_id: &str,
        ) -> Result<Option<Order>, RepositoryError> {
            Ok(self
                .orders
                .lock()
                .expect("store lock")
                .iter()
                .find(|o| o.payment_session_id == payment_session_id)
                .cloned())
        }

        async fn create_with_items(
            &self,
            order: &NewOrder,
            _items: &[NewOrderItem],
        ) -> Result<Order, RepositoryError> {
            let mut orders = self.orders.lock().expect("store lock");
            if orders
                .iter()
                .any(|o| o.payment_session_id == order.payment_session_id)
            {
                return Err(RepositoryError::Conflict(
                    "duplicate payment session".to_owned(),
                ));
            }
            let id = i32::try_from(orders.len()).expect("small id") + 1;
            let created = stored_order(id, order);
            orders.push(created.clone());
            Ok(created)
        }
    }

    /// Store that simulates losing the insert race: the first lookup
    /// sees nothing, the insert hits the unique index, and by the next
    /// lookup the concurrent winner's order is visible.
    struct ContestedOrderStore {
        winner: Order,
        lookups: AtomicUsize,
    }

    impl OrderStore for ContestedOrderStore {
        async fn find_by_payment_session(
            &self,
            _payment_session_id: &str,
        ) -> Result<Option<Order>, RepositoryError> {
            if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(None)
            } else {
                Ok(Some(self.winner.clone()))
            }
        }

        async fn create_with_items(
            &self,
            order: &NewOrder,
            _items: &[NewOrderItem],
        ) -> Result<Order, RepositoryError> {
            Err(RepositoryError::Conflict(format!(
                "duplicate key on {}",
                order.payment_session_id
            )))
        }
    }

    fn stored_order(id: i32, new: &NewOrder) -> Order {
        Order {
            id: OrderId::new(id),
            customer_id: new.customer_id,
            customer_email: new.customer_email.clone(),
            shipping_address: new.shipping_address.clone(),
            total_paid: new.total_paid,
            payment_session_id: new.payment_session_id.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn paid_session_json() -> &'static str {
        r#"{
            "id": "cs_test_a1b2c3",
            "payment_status": "paid",
            "amount_total": 2300,
            "customer_details": {"email": "shopper@example.com"},
            "metadata": {"customer_id": "7", "shipping_address": "12 Vine St"},
            "line_items": {
                "data": [
                    {
                        "description": "Boston Fern",
                        "quantity": 2,
                        "amount_total": 2000,
                        "price": {"product": {"metadata": {"product_id": "41"}}}
                    },
                    {
                        "description": "Shipping",
                        "quantity": 1,
                        "amount_total": 300,
                        "price": {"product": {"metadata": {}}}
                    }
                ]
            }
        }"#
    }

    fn session(json: &str) -> CheckoutSession {
        serde_json::from_str(json).expect("session fixture decodes")
    }

    #[test]
    fn test_plan_order_from_paid_session() {
        let plan = plan_order(&session(paid_session_json())).expect("plan");

        assert_eq!(plan.order.payment_session_id, "cs_test_a1b2c3");
        assert_eq!(plan.order.total_paid, Decimal::new(2300, 2));
        assert_eq!(plan.order.customer_id, Some(7.into()));
        assert_eq!(plan.order.customer_email, "shopper@example.com");
        assert_eq!(plan.order.shipping_address, "12 Vine St");

        // The shipping fee line carries no product metadata and produces
        // no order item; it still counts toward the session total.
        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.items[0].product_id, ProductId::new(41));
        assert_eq!(plan.items[0].quantity, 2);
        assert_eq!(plan.items[0].unit_price, Decimal::new(1000, 2));
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_plan_order_rejects_unpaid_session() {
        let json = r#"{"id": "cs_x", "payment_status": "unpaid", "amount_total": 2300}"#;
        let err = plan_order(&session(json)).expect_err("unpaid");
        assert!(matches!(err, CheckoutError::PaymentNotCompleted));
    }

    #[test]
    fn test_plan_order_rejects_missing_total() {
        let json = r#"{"id": "cs_x", "payment_status": "paid"}"#;
        let err = plan_order(&session(json)).expect_err("no total");
        assert!(matches!(err, CheckoutError::MissingTotal));
    }

    #[test]
    fn test_plan_order_guest_session_has_no_customer() {
        let json = r#"{
            "id": "cs_guest",
            "payment_status": "paid",
            "amount_total": 500,
            "customer_details": {"email": "guest@example.com"},
            "metadata": {"shipping_address": "1 Elm Ave"},
            "line_items": {
                "data": [{
                    "quantity": 1,
                    "amount_total": 500,
                    "price": {"product": {"metadata": {"product_id": "3"}}}
                }]
            }
        }"#;

        let plan = plan_order(&session(json)).expect("plan");
        assert_eq!(plan.order.customer_id, None);
        assert_eq!(plan.order.customer_email, "guest@example.com");
        assert_eq!(plan.items.len(), 1);
    }

    #[test]
    fn test_plan_order_skips_malformed_line_but_keeps_order() {
        let json = r#"{
            "id": "cs_partial",
            "payment_status": "paid",
            "amount_total": 1500,
            "metadata": {},
            "line_items": {
                "data": [
                    {
                        "description": "Mystery",
                        "quantity": 1,
                        "amount_total": 500,
                        "price": {"product": {"metadata": {"product_id": "not-a-number"}}}
                    },
                    {
                        "quantity": 1,
                        "amount_total": 1000,
                        "price": {"product": {"metadata": {"product_id": "9"}}}
                    }
                ]
            }
        }"#;

        let plan = plan_order(&session(json)).expect("plan");
        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.items[0].product_id, ProductId::new(9));
        assert_eq!(plan.skipped.len(), 1);
        // The authoritative total still covers the skipped line.
        assert_eq!(plan.order.total_paid, Decimal::new(1500, 2));
    }

    #[tokio::test]
    async fn test_reconcile_replay_yields_single_order() {
        let store = MemoryOrderStore::new();
        let retrieves = AtomicUsize::new(0);

        let first = reconcile_session(&store, "cs_test_a1b2c3", || {
            retrieves.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, StripeError>(session(paid_session_json())) }
        })
        .await
        .expect("first reconcile");

        let second = reconcile_session(&store, "cs_test_a1b2c3", || {
            retrieves.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, StripeError>(session(paid_session_json())) }
        })
        .await
        .expect("second reconcile");

        let Reconciliation::Created(created) = first else {
            panic!("first visit should create the order");
        };
        let Reconciliation::Existing(found) = second else {
            panic!("replay should find the order, not create another");
        };

        assert_eq!(found.id, created.id);
        assert_eq!(store.len(), 1);
        // The replay is answered from our own records; the payment API
        // is consulted exactly once.
        assert_eq!(retrieves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reconcile_lost_race_adopts_winning_order() {
        let plan = plan_order(&session(paid_session_json())).expect("plan");
        let store = ContestedOrderStore {
            winner: stored_order(42, &plan.order),
            lookups: AtomicUsize::new(0),
        };

        let outcome = reconcile_session(&store, "cs_test_a1b2c3", || async {
            Ok::<_, StripeError>(session(paid_session_json()))
        })
        .await
        .expect("reconcile after losing the race");

        let Reconciliation::Existing(order) = outcome else {
            panic!("losing the insert race should adopt the existing order");
        };
        assert_eq!(order.id, OrderId::new(42));
    }

    #[test]
    fn test_plan_order_unit_price_from_line_total() {
        // 3 units for 10.00 total: unit price rounds to 3.33.
        let json = r#"{
            "id": "cs_split",
            "payment_status": "paid",
            "amount_total": 1000,
            "metadata": {},
            "line_items": {
                "data": [{
                    "quantity": 3,
                    "amount_total": 1000,
                    "price": {"product": {"metadata": {"product_id": "5"}}}
                }]
            }
        }"#;

        let plan = plan_order(&session(json)).expect("plan");
        assert_eq!(plan.items[0].unit_price, Decimal::new(333, 2));
    }
}
