//! Shared Module
//!
//! Types used by every part of the offline layer: request/response shapes,
//! request bodies and their durable encoding, configuration and errors.
//!
//! # Overview
//!
//! Nothing in here performs I/O. The client side (`crate::client`) and the
//! health server (`crate::backend`) both build on these types.

/// Request bodies and their stored form
pub mod body;

/// Offline layer configuration
pub mod config;

/// Shared error types
pub mod error;

/// Transport-neutral request and response types
pub mod http;

/// Re-export commonly used types for convenience
pub use body::{EncodedFile, FilePart, FormBody, RequestBody, StoredBody};
pub use config::{ConfigError, OfflineConfig, OfflineConfigBuilder};
pub use error::SharedError;
pub use http::{CacheMode, Credentials, HttpMethod, OutboundRequest, TransportResponse};
