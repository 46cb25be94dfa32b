//! Error types for the snapshot engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps every failure
//! mode during startup. Failures inside a snapshot cycle are handled by the
//! scheduler and never reach `main`.

/// Top-level error for the snapshot engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: points_core::config::ConfigError,
    },

    /// The rarity table could not be loaded.
    #[error("rarity table error: {source}")]
    Rarity {
        /// The underlying rarity error.
        #[from]
        source: points_scoring::RarityError,
    },

    /// The scaling factors were rejected.
    #[error("scoring error: {source}")]
    Scoring {
        /// The underlying scoring error.
        #[from]
        source: points_scoring::ScoringError,
    },

    /// Database connection or migration failed.
    #[error("database error: {source}")]
    Db {
        /// The underlying database error.
        #[from]
        source: points_db::DbError,
    },

    /// The JSON-RPC client could not be created.
    #[error("RPC error: {source}")]
    Rpc {
        /// The underlying RPC error.
        #[from]
        source: crate::rpc::RpcError,
    },
}
