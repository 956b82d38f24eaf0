//! # Sync Engine
//!
//! Drains the durable queue against the network, in submission order, with at
//! most one drain running at any instant.
//!
//! ## Architecture
//!
//! - **Network Monitor**: internet and server probes, link state
//! - **Scheduler**: reconnect and periodic drain decisions
//! - **Sync State**: `idle -> syncing -> idle`, pending counter, status snapshot
//! - **Status**: `OfflineMonitor`, the observable the UI depends on
//! - **Notifications**: debounced connectivity and sync-result messages
//! - **Metrics**: totals over every drain
//!
//! ## Replay rules
//!
//! - Items are replayed one at a time; a failing item never blocks the next
//! - An item is removed only after an HTTP success response
//! - A failed item stays queued with its retry counter bumped
//! - Errors never escape `sync`; they are counted in the `SyncReport`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use offline_sync::client::offline::OfflineManager;
//! use offline_sync::shared::OfflineConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = OfflineManager::open(OfflineConfig::default().into()).await?;
//! let report = manager.engine().sync().await;
//! println!("synced {}, failed {}", report.synced, report.failed);
//! # Ok(())
//! # }
//! ```

pub mod metrics;
pub mod network_monitor;
pub mod notifications;
pub mod scheduler;
pub mod status;
pub mod sync_state;

pub use metrics::SyncMetrics;
pub use network_monitor::{ConnectionState, ConnectivityProber, ConnectivityState, LinkEvent, LinkState};
pub use notifications::{Notification, NotificationLevel, Notifier};
pub use scheduler::{SyncScheduler, SyncTrigger};
pub use status::OfflineMonitor;
pub use sync_state::{OfflineStatus, PendingCount, SyncState};

use crate::client::offline::queue::{PendingItem, QueueStore};
use crate::client::offline::transport::{Transport, TransportError};
use crate::shared::error::SharedError;
use futures_util::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;

/// Outcome of one `sync` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.synced == 0 && self.failed == 0
    }
}

/// Why a single replay did not succeed
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("stored body could not be decoded: {0}")]
    Decode(#[from] SharedError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("server responded with status {0}")]
    Rejected(u16),
}

/// Holds the single-flight flag for the duration of a sync call
///
/// `Syncing` is published only once a drain actually begins. Dropping the
/// guard, including during a panic unwind, releases the flag and returns the
/// engine to `Idle`.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
    state: &'a watch::Sender<SyncState>,
}

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool, state: &'a watch::Sender<SyncState>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(Self { flag, state })
    }

    fn begin_drain(&self) {
        self.state.send_replace(SyncState::Syncing);
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
        self.state.send_if_modified(|state| {
            let was_syncing = state.is_syncing();
            *state = SyncState::Idle;
            was_syncing
        });
    }
}

/// Replays queued requests
pub struct SyncEngine {
    store: Arc<dyn QueueStore>,
    transport: Arc<dyn Transport>,
    prober: Arc<ConnectivityProber>,
    pending: PendingCount,
    in_flight: AtomicBool,
    state: watch::Sender<SyncState>,
    metrics: Mutex<SyncMetrics>,
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &*self.state.borrow())
            .field("pending", &self.pending.get())
            .finish()
    }
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn QueueStore>,
        transport: Arc<dyn Transport>,
        prober: Arc<ConnectivityProber>,
        pending: PendingCount,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            store,
            transport,
            prober,
            pending,
            in_flight: AtomicBool::new(false),
            state,
            metrics: Mutex::new(SyncMetrics::new()),
        }
    }

    /// Drain the queue once
    ///
    /// Returns an empty report without touching the queue when a drain is
    /// already running or the connectivity re-check says offline. An offline
    /// link answers the re-check without any network call.
    pub async fn sync(&self) -> SyncReport {
        let Some(guard) = FlightGuard::acquire(&self.in_flight, &self.state) else {
            tracing::debug!("[Sync] Drain already in progress, skipping");
            self.with_metrics(|m| m.record_skip());
            return SyncReport::default();
        };

        let connectivity = self.prober.check().await;
        if !connectivity.is_online() {
            tracing::debug!("[Sync] Not online ({}), skipping", connectivity.connection());
            self.with_metrics(|m| m.record_skip());
            drop(guard);
            return SyncReport::default();
        }

        guard.begin_drain();
        self.with_metrics(|m| m.record_start());
        let outcome = AssertUnwindSafe(self.drain()).catch_unwind().await;
        self.refresh_pending().await;
        drop(guard);

        let report = match outcome {
            Ok(report) => report,
            Err(_) => {
                tracing::error!("[Sync] Drain aborted by a panic; remaining items stay queued");
                SyncReport::default()
            }
        };
        self.with_metrics(|m| m.record_finish(&report));
        report
    }

    async fn drain(&self) -> SyncReport {
        let mut report = SyncReport::default();

        let items = match self.store.list_pending().await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!("[Sync] Could not read queue: {}", e);
                return report;
            }
        };
        if items.is_empty() {
            return report;
        }

        tracing::info!("[Sync] Replaying {} queued request(s)", items.len());
        for item in items {
            match self.replay(&item).await {
                Ok(()) => {
                    if let Err(e) = self.store.remove(item.id).await {
                        tracing::error!("[Sync] Replayed #{} but could not remove it: {}", item.id, e);
                    }
                    report.synced += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "[Sync] Replay of #{} {} {} failed: {}",
                        item.id,
                        item.method,
                        item.url,
                        e
                    );
                    if let Err(e) = self.store.record_failure(item.id).await {
                        tracing::error!("[Sync] Could not record failure of #{}: {}", item.id, e);
                    }
                    report.failed += 1;
                }
            }
        }

        if let Err(e) = self.store.mark_synced().await {
            tracing::error!("[Sync] Could not record sync time: {}", e);
        }
        tracing::info!("[Sync] Done: {} synced, {} failed", report.synced, report.failed);
        report
    }

    async fn replay(&self, item: &PendingItem) -> Result<(), ReplayError> {
        let request = item.to_request()?;
        let response = self.transport.send(request).await?;
        if response.is_success() {
            tracing::debug!("[Sync] #{} -> {}", item.id, response.status);
            Ok(())
        } else {
            Err(ReplayError::Rejected(response.status))
        }
    }

    /// Re-read the queue size into the shared counter
    pub async fn refresh_pending(&self) -> usize {
        match self.store.count().await {
            Ok(count) => {
                self.pending.set(count);
                count
            }
            Err(e) => {
                tracing::error!("[Sync] Could not count queue: {}", e);
                self.pending.get()
            }
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.state.borrow().is_syncing()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn pending(&self) -> &PendingCount {
        &self.pending
    }

    pub fn prober(&self) -> &Arc<ConnectivityProber> {
        &self.prober
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    /// RFC 3339 time of the last completed drain
    pub async fn last_synced(&self) -> Option<String> {
        self.store.last_synced().await.ok().flatten()
    }

    pub fn metrics(&self) -> SyncMetrics {
        self.metrics
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    fn with_metrics(&self, update: impl FnOnce(&mut SyncMetrics)) {
        if let Ok(mut metrics) = self.metrics.lock() {
            update(&mut metrics);
        }
    }
}
