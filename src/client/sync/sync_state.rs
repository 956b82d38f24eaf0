//! # Sync State
//!
//! The engine's `idle -> syncing -> idle` machine, the shared pending counter
//! and the combined status snapshot handed to the UI.

use crate::client::sync::network_monitor::{ConnectionState, ConnectivityState};
use std::sync::Arc;
use tokio::sync::watch;

/// Sync engine phase; there is no terminal error phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
}

impl SyncState {
    pub fn is_syncing(self) -> bool {
        self == SyncState::Syncing
    }
}

/// Number of queued requests, shared by the interceptor and the engine
#[derive(Debug, Clone)]
pub struct PendingCount {
    tx: Arc<watch::Sender<usize>>,
}

impl Default for PendingCount {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingCount {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> usize {
        *self.tx.borrow()
    }

    pub fn set(&self, count: usize) {
        self.tx.send_if_modified(|current| {
            let changed = *current != count;
            *current = count;
            changed
        });
    }

    pub fn increment(&self) {
        self.tx.send_modify(|current| *current += 1);
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }
}

/// Everything the UI needs to render offline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfflineStatus {
    pub is_online: bool,
    pub has_internet: bool,
    pub has_server: bool,
    pub pending: usize,
    pub is_syncing: bool,
    pub connection: ConnectionState,
}

impl OfflineStatus {
    pub fn new(connectivity: ConnectivityState, pending: usize, sync: SyncState) -> Self {
        Self {
            is_online: connectivity.is_online(),
            has_internet: connectivity.has_internet,
            has_server: connectivity.has_server,
            pending,
            is_syncing: sync.is_syncing(),
            connection: connectivity.connection(),
        }
    }
}

impl Default for OfflineStatus {
    fn default() -> Self {
        Self::new(ConnectivityState::offline(), 0, SyncState::Idle)
    }
}
