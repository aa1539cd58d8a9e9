//! Error types for the PostgreSQL durable tier.

use sqlx_core::error::Error as SqlxError;
use strata_core::{Tier, TierError};

/// Errors specific to the PostgreSQL durable tier.
#[derive(Debug, thiserror::Error)]
pub enum PostgresTierError {
    /// Query or connection failure reported by sqlx.
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresTierError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Returns `true` for errors where the database was never reached.
fn is_connection_error(err: &SqlxError) -> bool {
    matches!(
        err,
        SqlxError::Io(_)
            | SqlxError::Tls(_)
            | SqlxError::PoolTimedOut
            | SqlxError::PoolClosed
            | SqlxError::WorkerCrashed
    )
}

impl From<PostgresTierError> for TierError {
    fn from(err: PostgresTierError) -> Self {
        match err {
            PostgresTierError::Database(e) if is_connection_error(&e) => {
                TierError::connection(Tier::Durable, e.to_string())
            }
            PostgresTierError::Database(e) => TierError::backend(Tier::Durable, e.to_string()),
            PostgresTierError::Migration(message) => {
                TierError::backend(Tier::Durable, format!("Migration error: {message}"))
            }
            PostgresTierError::Config { message } => TierError::backend(Tier::Durable, message),
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresTierError>;
