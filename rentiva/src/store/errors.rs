//! Business store error types.

use thiserror::Error;

/// Errors from the stored-procedure-backed business store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Referenced row does not exist within the caller's tenant scope
    #[error("{0} not found")]
    NotFound(&'static str),
}

impl StoreError {
    /// Get a client-safe error message without driver detail.
    pub fn client_message(&self) -> String {
        match self {
            StoreError::Database(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
