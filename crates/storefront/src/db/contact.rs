//! Contact message repository.

use sqlx::PgPool;

use greenstem_core::ContactMessageId;

use super::RepositoryError;

/// Repository for contact form submissions.
pub struct ContactRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ContactRepository<'a> {
    /// Create a new contact repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store a contact form submission.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(
        &self,
        name: &str,
        email: &str,
        message: &str,
    ) -> Result<ContactMessageId, RepositoryError> {
        let id: (i32,) = sqlx::query_as(
            r"
            INSERT INTO contact_messages (name, email, message)
            VALUES ($1, $2, $3)
            RETURNING id
            ",
        )
        .bind(name)
        .bind(email)
        .bind(message)
        .fetch_one(self.pool)
        .await?;

        Ok(ContactMessageId::new(id.0))
    }
}
