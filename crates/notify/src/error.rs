//! Delivery errors

use thiserror::Error;

/// Errors from notifiers and audit sinks
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for delivery operations
pub type NotifyResult<T> = Result<T, NotifyError>;

impl NotifyError {
    /// Create a delivery failure
    pub fn delivery(reason: impl Into<String>) -> Self {
        NotifyError::Delivery(reason.into())
    }
}
