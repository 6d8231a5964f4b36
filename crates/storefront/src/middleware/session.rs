//! Session layer setup.
//!
//! Carts, flash messages, and the signed-in user all live in
//! Postgres-backed tower-sessions state keyed by this cookie.

use sqlx::PgPool;
use tower_sessions::cookie::{SameSite, time::Duration};
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::StorefrontConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "gs_session";

/// Sessions expire after a week without activity. Long enough to keep a
/// cart around between visits, short enough to bound table growth.
const SESSION_IDLE_DAYS: i64 = 7;

/// Build the session layer backed by the shared Postgres pool.
///
/// The `Secure` cookie flag follows the configured base URL scheme, so
/// local plain-HTTP development keeps working without a flag of its own.
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &StorefrontConfig,
) -> SessionManagerLayer<PostgresStore> {
    // The store's table is created by `PostgresStore::migrate` at startup.
    let store = PostgresStore::new(pool.clone());
    let is_secure = config.base_url.starts_with("https://");

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::days(SESSION_IDLE_DAYS)))
        .with_secure(is_secure)
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
