//! Shared Error Types
//!
//! Error types for the request and body types shared by the queue, the sync
//! engine and the worker bridge.
//!
//! # Error Categories
//!
//! - `SerializationError` - JSON or base64 encoding/decoding failures
//! - `ValidationError` - Data validation failures (bad method, bad header)
//!
//! # Usage
//!
//! ```rust
//! use offline_sync::shared::error::SharedError;
//!
//! let error = SharedError::validation("method", "GET requests cannot be queued");
//! ```
use thiserror::Error;

/// Error types shared by every layer that handles queued requests
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedError {
    /// JSON or base64 serialization/deserialization error
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Human-readable error message
        message: String,
    },

    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },
}

impl SharedError {
    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SharedError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

impl From<base64::DecodeError> for SharedError {
    fn from(err: base64::DecodeError) -> Self {
        Self::serialization(format!("base64 error: {}", err))
    }
}
