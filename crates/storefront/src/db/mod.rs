//! Database operations for the storefront `PostgreSQL`.
//!
//! ## Tables
//!
//! - `categories` / `products` - the catalog
//! - `users` - site authentication
//! - `orders` / `order_items` - reconciled purchases
//! - `contact_messages` - contact form submissions
//! - `tower_sessions.session` - session storage (created by the session store)
//!
//! # Migrations
//!
//! Migrations are embedded from `crates/storefront/migrations/` and run on
//! startup via [`MIGRATOR`].

pub mod catalog;
pub mod contact;
pub mod orders;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use catalog::CatalogRepository;
pub use contact::ContactRepository;
pub use orders::OrderRepository;
pub use users::UserRepository;

/// Embedded migrations for the storefront database.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
