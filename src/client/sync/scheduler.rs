//! # Sync Scheduler
//!
//! Decides when the monitor should start a drain on its own: once after the
//! link comes back with work queued, and periodically while online with work
//! queued. Manual and worker-relayed triggers bypass it.

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// What caused a drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Offline to online edge with pending work
    Reconnect,
    /// Explicit user action
    Manual,
    /// Background sync relayed from the worker
    Background,
    /// Periodic timer while online with pending work
    Periodic,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncTrigger::Reconnect => "reconnect",
            SyncTrigger::Manual => "manual",
            SyncTrigger::Background => "background",
            SyncTrigger::Periodic => "periodic",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct SyncScheduler {
    was_online: Option<bool>,
    periodic_interval: Option<Duration>,
    last_sync: Option<Instant>,
}

impl SyncScheduler {
    pub fn new(periodic_interval: Option<Duration>) -> Self {
        Self {
            was_online: None,
            periodic_interval,
            last_sync: None,
        }
    }

    /// Feed a composite connectivity observation
    ///
    /// Returns `Reconnect` on an offline to online edge with pending work. The
    /// first observation is never an edge.
    pub fn observe(&mut self, online: bool, pending: usize) -> Option<SyncTrigger> {
        let previous = self.was_online.replace(online);
        match previous {
            Some(false) if online && pending > 0 => Some(SyncTrigger::Reconnect),
            _ => None,
        }
    }

    /// Whether a periodic drain is due at `now`
    pub fn periodic_due(&self, online: bool, pending: usize, now: Instant) -> bool {
        let Some(interval) = self.periodic_interval else {
            return false;
        };
        if !online || pending == 0 {
            return false;
        }
        match self.last_sync {
            Some(last) => now.duration_since(last) >= interval,
            None => true,
        }
    }

    pub fn record_sync(&mut self, now: Instant) {
        self.last_sync = Some(now);
    }

    pub fn periodic_interval(&self) -> Option<Duration> {
        self.periodic_interval
    }
}
