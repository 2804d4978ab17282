//! Error types shared by the core and its collaborators.
//!
//! Engine-level errors (setup, dispatch, execution) are defined in
//! cordon-framework.

use thiserror::Error;

/// A type-erased error returned by listeners, plugins and collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur when a sender delivers a reply.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Message send failed.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// No sender is registered for this bot.
    #[error("bot '{id}' not found")]
    BotNotFound {
        /// The missing bot id.
        id: i64,
    },
}

// =============================================================================
// Database Errors
// =============================================================================

/// Errors raised by a persistence backend while attaching state.
#[derive(Debug, Clone, Error)]
pub enum DatabaseError {
    /// The backend could not serve the request.
    #[error("database backend error: {0}")]
    Backend(String),

    /// Stored data could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl DatabaseError {
    /// Creates a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for persistence operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;
