//! Background sync registration
//!
//! `BackgroundSyncRegistry` stands in for the platform capability: tags
//! registered while offline are held and fired at the worker when the link
//! comes back. `SyncSignal` is what the interceptor calls after every enqueue;
//! it uses the registry when available and otherwise posts straight to the
//! worker.

use crate::client::sync::network_monitor::{LinkEvent, LinkState};
use crate::client::worker::WorkerMessage;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct BackgroundSyncRegistry {
    pending: Mutex<BTreeSet<String>>,
    worker: mpsc::UnboundedSender<WorkerMessage>,
    link: LinkState,
}

impl BackgroundSyncRegistry {
    pub fn new(worker: mpsc::UnboundedSender<WorkerMessage>, link: LinkState) -> Self {
        Self {
            pending: Mutex::new(BTreeSet::new()),
            worker,
            link,
        }
    }

    /// Register `tag`; fires at once when the link is already up
    pub fn register(&self, tag: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(tag.to_string());
        }
        if self.link.is_online() {
            self.fire_pending();
        }
    }

    pub fn pending_tags(&self) -> Vec<String> {
        self.pending
            .lock()
            .map(|pending| pending.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Deliver every held tag to the worker; returns how many were fired
    pub fn fire_pending(&self) -> usize {
        let tags = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => return 0,
        };
        let mut fired = 0;
        for tag in tags {
            if self.worker.send(WorkerMessage::BackgroundSync { tag }).is_ok() {
                fired += 1;
            }
        }
        if fired > 0 {
            tracing::debug!("[Worker] Fired {} background sync tag(s)", fired);
        }
        fired
    }

    /// Fire held tags whenever the link comes back online
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let mut events = self.link.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(LinkEvent::Online) => {
                        registry.fire_pending();
                    }
                    Ok(LinkEvent::Offline) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        if registry.link.is_online() {
                            registry.fire_pending();
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[derive(Debug, Clone)]
enum SignalRoute {
    Registry(Arc<BackgroundSyncRegistry>),
    Direct(mpsc::UnboundedSender<WorkerMessage>),
}

/// Asks for a background sync after work was queued
#[derive(Debug, Clone)]
pub struct SyncSignal {
    tag: String,
    route: SignalRoute,
}

impl SyncSignal {
    /// Platform background sync is available
    pub fn registered(registry: Arc<BackgroundSyncRegistry>, tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            route: SignalRoute::Registry(registry),
        }
    }

    /// No platform support; message the worker directly
    pub fn direct(worker: mpsc::UnboundedSender<WorkerMessage>, tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            route: SignalRoute::Direct(worker),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn request_sync(&self) {
        match &self.route {
            SignalRoute::Registry(registry) => registry.register(&self.tag),
            SignalRoute::Direct(worker) => {
                let message = WorkerMessage::SyncRequested {
                    tag: self.tag.clone(),
                };
                if worker.send(message).is_err() {
                    tracing::warn!("[Worker] Worker is gone; sync request for '{}' dropped", self.tag);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_registry_holds_tags_until_online() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = LinkState::new(false);
        let registry = Arc::new(BackgroundSyncRegistry::new(tx, link.clone()));
        let handle = registry.spawn();

        registry.register("offline-sync");
        registry.register("offline-sync");
        assert_eq!(registry.pending_tags(), vec!["offline-sync".to_string()]);
        assert!(rx.try_recv().is_err());

        link.set_online(true);
        let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message, WorkerMessage::BackgroundSync { tag: "offline-sync".into() });
        assert!(registry.pending_tags().is_empty());
        handle.abort();
    }

    #[test]
    fn test_registry_fires_immediately_when_online() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = BackgroundSyncRegistry::new(tx, LinkState::new(true));

        registry.register("offline-sync");
        assert_eq!(
            rx.try_recv().unwrap(),
            WorkerMessage::BackgroundSync { tag: "offline-sync".into() }
        );
    }

    #[test]
    fn test_direct_signal_posts_sync_requested() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let signal = SyncSignal::direct(tx, "offline-sync");

        signal.request_sync();
        assert_eq!(
            rx.try_recv().unwrap(),
            WorkerMessage::SyncRequested { tag: "offline-sync".into() }
        );
    }
}
