//! Error types for Followgraph
//!
//! All errors in the crate are converted to `AppError`. Callers embedding the
//! subsystem map variants to their own transport concerns.

use thiserror::Error;

/// Application-wide error type
///
/// This enum represents all possible errors that can occur in the subsystem.
/// Validation, NotFound, Conflict, Cooldown, and Forbidden propagate to the
/// caller unchanged; best-effort side channels (cache, cooldown store, audit
/// trail, event publish) never surface here from a primary mutation.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (missing account or edge)
    #[error("Resource not found")]
    NotFound,

    /// Access denied (privacy rule, unprivileged operation)
    #[error("Access denied")]
    Forbidden,

    /// Validation error (self-follow, malformed id)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflicting relationship state (duplicate edge)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Re-follow attempted while the pair's cooldown is active
    #[error("Cooldown active: retry in {0} second(s)")]
    Cooldown(u64),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
