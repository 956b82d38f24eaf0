//! # Notifications
//!
//! Short, auto-dismissing messages for the UI. Connectivity notifications fire
//! only when the composite state changes, and never sooner than the debounce
//! window after the previous one, so flaky links do not produce a storm.

use crate::client::sync::network_monitor::ConnectionState;
use crate::client::sync::SyncReport;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn for_connection(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Online => Self::new(
                NotificationLevel::Success,
                "Back online",
                "Connection restored",
            ),
            ConnectionState::OfflineServer => Self::new(
                NotificationLevel::Warning,
                "Server unreachable",
                "Changes are saved locally and will sync when the server is back",
            ),
            ConnectionState::OfflineInternet => Self::new(
                NotificationLevel::Warning,
                "No internet connection",
                "Changes are saved locally and will sync when you reconnect",
            ),
        }
    }

    /// Summary of a drain; `None` when nothing was replayed
    pub fn for_sync(report: &SyncReport) -> Option<Self> {
        let SyncReport { synced, failed } = *report;
        match (synced, failed) {
            (0, 0) => None,
            (synced, 0) => Some(Self::new(
                NotificationLevel::Success,
                "Changes synced",
                format!("{} pending change(s) synced", synced),
            )),
            (0, failed) => Some(Self::new(
                NotificationLevel::Error,
                "Sync failed",
                format!("{} change(s) could not be synced and will be retried", failed),
            )),
            (synced, failed) => Some(Self::new(
                NotificationLevel::Warning,
                "Partially synced",
                format!("{} change(s) synced, {} will be retried", synced, failed),
            )),
        }
    }
}

/// Debounced connectivity notifications
#[derive(Debug)]
pub struct Notifier {
    debounce: Duration,
    last_state: Option<ConnectionState>,
    last_sent: Option<Instant>,
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(debounce: Duration, sender: broadcast::Sender<Notification>) -> Self {
        Self {
            debounce,
            last_state: None,
            last_sent: None,
            sender,
        }
    }

    /// Feed a composite observation; returns the notification if one was sent
    ///
    /// The first observation only notifies when it is not `Online`. A change
    /// inside the debounce window is dropped, and the next observation after
    /// the window compares against the last state actually announced.
    pub fn observe(&mut self, state: ConnectionState) -> Option<Notification> {
        let now = Instant::now();

        let Some(last_state) = self.last_state else {
            self.last_state = Some(state);
            if state.is_online() {
                return None;
            }
            return Some(self.send(Notification::for_connection(state), now));
        };

        if last_state == state {
            return None;
        }
        if let Some(sent) = self.last_sent {
            if now.duration_since(sent) < self.debounce {
                tracing::debug!("[Sync] Suppressed {} notification inside debounce window", state);
                return None;
            }
        }

        self.last_state = Some(state);
        Some(self.send(Notification::for_connection(state), now))
    }

    fn send(&mut self, notification: Notification, now: Instant) -> Notification {
        self.last_sent = Some(now);
        let _ = self.sender.send(notification.clone());
        notification
    }
}
