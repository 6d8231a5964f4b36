//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (request coverage and error capture)
//! 2. Session layer (tower-sessions with `PostgreSQL` store)
//! 3. Rate limiting (governor, applied per route group)

pub mod auth;
pub mod rate_limit;
pub mod session;

pub use auth::{OptionalAuth, RequireAuth, RequireStaff, clear_current_user, set_current_user};
pub use rate_limit::{auth_rate_limiter, form_rate_limiter};
pub use session::create_session_layer;
