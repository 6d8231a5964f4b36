//! Session-related types and helpers.

use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use greenstem_core::{Email, OrderId, UserId};

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Whether the user may run privileged operations.
    pub is_staff: bool,
}

/// Session keys.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the session shopping cart.
    pub const CART: &str = "cart";

    /// Key for the most recently reconciled order, so guest checkouts
    /// can view their own confirmation page.
    pub const LAST_ORDER: &str = "last_order";

    /// Key for one-shot flash messages.
    pub const FLASH: &str = "flash";
}

/// Store a one-shot flash message in the session.
///
/// Failures are logged and swallowed; a lost notice never fails a request.
pub async fn set_flash(session: &Session, message: &str) {
    if let Err(e) = session.insert(keys::FLASH, message.to_owned()).await {
        tracing::warn!("Failed to store flash message: {e}");
    }
}

/// Take the pending flash message out of the session, if any.
pub async fn take_flash(session: &Session) -> Option<String> {
    session.remove::<String>(keys::FLASH).await.ok().flatten()
}

/// Remember the order a guest just placed so the detail page is visible
/// to them without an account.
pub async fn remember_order(session: &Session, order_id: OrderId) {
    if let Err(e) = session.insert(keys::LAST_ORDER, order_id).await {
        tracing::warn!("Failed to store order reference in session: {e}");
    }
}

/// The order id remembered for this session, if any.
pub async fn remembered_order(session: &Session) -> Option<OrderId> {
    session.get::<OrderId>(keys::LAST_ORDER).await.ok().flatten()
}
