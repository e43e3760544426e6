//! Common error types for idlink

use thiserror::Error;

/// Common result type for idlink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the store, the reconciler and the HTTP layer
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store failure not originating from sqlx (constraint, connectivity, injected faults)
    #[error("Store error: {0}")]
    Store(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested contact not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request (neither email nor phone supplied)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A store returned data that breaks the contact graph invariants
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures reported by the storage layer
    pub fn is_store_failure(&self) -> bool {
        match self {
            #[cfg(feature = "sqlx")]
            Error::Database(_) => true,
            Error::Store(_) => true,
            _ => false,
        }
    }
}
