//! Authentication error types.

use thiserror::Error;

use greenstem_core::EmailError;

use crate::db::RepositoryError;

/// Errors that can occur during authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Email/password combination is wrong. Deliberately indistinct
    /// about which half failed.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account already exists for this email.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password does not meet minimum requirements.
    #[error("weak password: {0}")]
    WeakPassword(String),

    /// Email address failed validation.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Password hashing or verification machinery failed.
    #[error("password hash error: {0}")]
    Hash(String),

    /// Database operation failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
