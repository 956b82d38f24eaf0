//! Client Module
//!
//! Everything that runs next to the application: the durable queue, the
//! interceptor in front of the network, the sync engine that drains the queue,
//! the observable status, and the worker that serves the cached shell.

/// Client configuration with session token
pub mod config;

/// SQLite storage for the queue
pub mod local_db;

/// Transport, queue store, interceptor and manager
pub mod offline;

/// Connectivity, replay and status
pub mod sync;

/// Shell cache and background sync bridge
pub mod worker;

pub use config::ClientConfig;
pub use offline::{FetchOutcome, OfflineError, OfflineFetch, OfflineManager};
pub use sync::{OfflineMonitor, OfflineStatus, SyncEngine, SyncReport};
