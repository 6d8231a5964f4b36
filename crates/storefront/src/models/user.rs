//! User domain types.
//!
//! These types represent validated domain objects separate from database
//! row types.

use chrono::{DateTime, Utc};

use greenstem_core::{Email, UserId};

/// A storefront user (domain type).
#[derive(Debug, Clone)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Staff users may run privileged operations such as bulk order
    /// history deletion.
    pub is_staff: bool,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}
