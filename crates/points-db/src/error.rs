//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] errors with additional context about which operation failed.

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A snapshot was rejected before writing.
    #[error("invalid snapshot for {address}: {reason}")]
    InvalidSnapshot {
        /// The snapshot's address.
        address: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A stored row could not be converted back into a snapshot.
    #[error("corrupt row for {address}: {reason}")]
    CorruptRow {
        /// The row's address.
        address: String,
        /// What could not be decoded.
        reason: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
