//! offline-sync - Main Library
//!
//! An offline-first synchronization layer for HTTP clients. Mutating requests
//! made while the server is unreachable are persisted to a durable local queue
//! and replayed, in submission order, once connectivity returns.
//!
//! # Module Structure
//!
//! - **`shared`** - Types shared by every layer
//!   - Request/response shapes, request bodies and their stored encoding
//!   - Configuration and error types
//!
//! - **`client`** - The offline layer itself
//!   - `local_db`: SQLite storage behind the queue
//!   - `offline`: transport, durable queue, request interceptor, `OfflineManager`
//!   - `sync`: connectivity prober, sync engine, status observable, notifications
//!   - `worker`: shell cache, fetch policies, background sync bridge
//!
//! - **`backend`** - Health endpoint server (only compiled with `ssr` feature)
//!
//! # Feature Flags
//!
//! - **`ssr`** - Builds the Axum health server and the `offline-sync-server` binary
//!
//! # Usage
//!
//! ```rust,no_run
//! use offline_sync::client::offline::OfflineManager;
//! use offline_sync::client::ClientConfig;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = OfflineManager::open(ClientConfig::from_env()?).await?;
//! manager.start();
//!
//! let mut status = manager.monitor().subscribe();
//! manager
//!     .fetch()
//!     .post_json(manager.api_url("/api/items"), json!({ "name": "Test" }))
//!     .await?;
//!
//! status.changed().await?;
//! println!("{:?}", *status.borrow());
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! Every handle (`OfflineFetch`, `OfflineMonitor`, `SyncEngine`) is `Send + Sync`
//! and meant to be shared behind `Arc` or cloned. At most one drain of the
//! queue runs at any instant, no matter how many triggers fire.

/// Shared types and data structures
pub mod shared;

/// Offline queue, sync engine and worker bridge
pub mod client;

/// Backend server-side code
#[cfg(feature = "ssr")]
pub mod backend;
