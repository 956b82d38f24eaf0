//! # Offline Status
//!
//! `OfflineMonitor` is the one object the rest of the application depends on.
//! It combines the prober, the pending counter and the engine state into an
//! `OfflineStatus` snapshot, starts drains on reconnect, and emits debounced
//! notifications.
//!
//! Clones share one background task, so any number of UI components can hold
//! a handle without multiplying probes.

use crate::client::sync::network_monitor::{ConnectivityProber, ConnectivityState};
use crate::client::sync::notifications::{Notification, Notifier};
use crate::client::sync::scheduler::{SyncScheduler, SyncTrigger};
use crate::client::sync::sync_state::{OfflineStatus, PendingCount, SyncState};
use crate::client::sync::{SyncEngine, SyncReport};
use crate::client::worker::ClientMessage;
use crate::shared::config::OfflineConfig;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, Sleep};

#[derive(Debug, Clone)]
struct MonitorSettings {
    debounce: Duration,
    settle: Duration,
    periodic: Option<Duration>,
}

#[derive(Debug)]
struct MonitorInner {
    engine: Arc<SyncEngine>,
    prober: Arc<ConnectivityProber>,
    pending: PendingCount,
    settings: MonitorSettings,
    status: Arc<watch::Sender<OfflineStatus>>,
    notifications: broadcast::Sender<Notification>,
    client_messages: Mutex<Option<broadcast::Receiver<ClientMessage>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MonitorInner {
    fn abort_tasks(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// Reactive offline status
#[derive(Debug, Clone)]
pub struct OfflineMonitor {
    inner: Arc<MonitorInner>,
}

impl OfflineMonitor {
    pub fn new(engine: Arc<SyncEngine>, config: &OfflineConfig) -> Self {
        let prober = Arc::clone(engine.prober());
        let pending = engine.pending().clone();
        let (status, _) = watch::channel(OfflineStatus::default());
        let (notifications, _) = broadcast::channel(32);

        Self {
            inner: Arc::new(MonitorInner {
                engine,
                prober,
                pending,
                settings: MonitorSettings {
                    debounce: config.notification_debounce,
                    settle: config.reconnect_settle,
                    periodic: config.periodic_sync_interval,
                },
                status: Arc::new(status),
                notifications,
                client_messages: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Listen for messages relayed by the worker
    pub fn with_client_messages(self, messages: broadcast::Receiver<ClientMessage>) -> Self {
        if let Ok(mut slot) = self.inner.client_messages.lock() {
            *slot = Some(messages);
        }
        self
    }

    /// Current status, read live from the underlying components
    pub fn status(&self) -> OfflineStatus {
        let sync = if self.inner.engine.is_syncing() {
            SyncState::Syncing
        } else {
            SyncState::Idle
        };
        OfflineStatus::new(self.inner.prober.state(), self.inner.pending.get(), sync)
    }

    /// Status updates published by the background task
    pub fn subscribe(&self) -> watch::Receiver<OfflineStatus> {
        self.inner.status.subscribe()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    /// Drain now and announce the result
    pub async fn sync_now(&self) -> SyncReport {
        run_sync(&self.inner.engine, &self.inner.notifications, SyncTrigger::Manual).await
    }

    /// Re-probe connectivity now
    pub async fn check_connection(&self) -> ConnectivityState {
        self.inner.prober.check().await
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .tasks
            .lock()
            .map(|tasks| !tasks.is_empty())
            .unwrap_or(false)
    }

    /// Start polling and the status loop; calling it again is a no-op
    pub fn start(&self) {
        let Ok(mut tasks) = self.inner.tasks.lock() else {
            return;
        };
        if !tasks.is_empty() {
            return;
        }

        let client_messages = self
            .inner
            .client_messages
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());

        tasks.push(self.inner.prober.spawn_polling());

        let task = StatusTask {
            engine: Arc::clone(&self.inner.engine),
            prober: Arc::clone(&self.inner.prober),
            pending: self.inner.pending.clone(),
            settings: self.inner.settings.clone(),
            status: Arc::clone(&self.inner.status),
            notifications: self.inner.notifications.clone(),
            client_messages,
        };
        tasks.push(tokio::spawn(task.run()));
        tracing::debug!("[Sync] Offline monitor started");
    }

    /// Stop background work; the monitor can be started again
    pub fn shutdown(&self) {
        self.inner.abort_tasks();
        tracing::debug!("[Sync] Offline monitor stopped");
    }
}

async fn run_sync(
    engine: &SyncEngine,
    notifications: &broadcast::Sender<Notification>,
    trigger: SyncTrigger,
) -> SyncReport {
    tracing::debug!("[Sync] Drain requested ({})", trigger);
    let report = engine.sync().await;
    if let Some(notification) = Notification::for_sync(&report) {
        let _ = notifications.send(notification);
    }
    report
}

fn spawn_sync(
    engine: &Arc<SyncEngine>,
    notifications: &broadcast::Sender<Notification>,
    trigger: SyncTrigger,
) {
    let engine = Arc::clone(engine);
    let notifications = notifications.clone();
    tokio::spawn(async move {
        run_sync(&engine, &notifications, trigger).await;
    });
}

/// State owned by the background status loop
struct StatusTask {
    engine: Arc<SyncEngine>,
    prober: Arc<ConnectivityProber>,
    pending: PendingCount,
    settings: MonitorSettings,
    status: Arc<watch::Sender<OfflineStatus>>,
    notifications: broadcast::Sender<Notification>,
    client_messages: Option<broadcast::Receiver<ClientMessage>>,
}

impl StatusTask {
    async fn run(mut self) {
        let mut connectivity = self.prober.subscribe();
        let mut sync_state = self.engine.subscribe();
        let mut pending = self.pending.subscribe();
        self.engine.refresh_pending().await;
        let mut scheduler = SyncScheduler::new(self.settings.periodic);
        let mut notifier = Notifier::new(self.settings.debounce, self.notifications.clone());
        let mut settle: Option<Pin<Box<Sleep>>> = None;

        let mut periodic = tokio::time::interval(self.settings.periodic.unwrap_or(Duration::from_secs(3600)));
        periodic.set_missed_tick_behavior(MissedTickBehavior::Delay);
        periodic.reset();

        // Seed with the pre-probe state so the first successful probe after
        // startup counts as a reconnect and drains leftovers
        let initial = *connectivity.borrow_and_update();
        scheduler.observe(initial.is_online(), self.pending.get());
        self.publish();

        loop {
            tokio::select! {
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *connectivity.borrow_and_update();
                    notifier.observe(state.connection());
                    if let Some(SyncTrigger::Reconnect) = scheduler.observe(state.is_online(), self.pending.get()) {
                        tracing::info!("[Sync] Back online with {} pending, syncing shortly", self.pending.get());
                        settle = Some(Box::pin(tokio::time::sleep(self.settings.settle)));
                    }
                    if !state.is_online() {
                        settle = None;
                    }
                    self.publish();
                }
                changed = sync_state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    sync_state.borrow_and_update();
                    self.publish();
                }
                changed = pending.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    pending.borrow_and_update();
                    self.publish();
                }
                message = recv_client_message(&mut self.client_messages) => {
                    self.handle_client_message(message);
                }
                _ = wait_settle(&mut settle) => {
                    settle = None;
                    if self.prober.state().is_online() && self.pending.get() > 0 {
                        scheduler.record_sync(Instant::now());
                        spawn_sync(&self.engine, &self.notifications, SyncTrigger::Reconnect);
                    }
                }
                _ = periodic.tick(), if self.settings.periodic.is_some() => {
                    let now = Instant::now();
                    if scheduler.periodic_due(self.prober.state().is_online(), self.pending.get(), now) {
                        scheduler.record_sync(now);
                        spawn_sync(&self.engine, &self.notifications, SyncTrigger::Periodic);
                    }
                }
            }
        }
    }

    fn handle_client_message(&mut self, message: Option<ClientMessage>) {
        match message {
            Some(ClientMessage::TriggerSync { tag }) => {
                tracing::debug!("[Sync] Worker relayed background sync '{}'", tag);
                spawn_sync(&self.engine, &self.notifications, SyncTrigger::Background);
            }
            Some(ClientMessage::Connectivity { online }) => {
                tracing::debug!("[Sync] Worker reports online={}, re-probing", online);
                let prober = Arc::clone(&self.prober);
                tokio::spawn(async move {
                    prober.check().await;
                });
            }
            None => {
                self.client_messages = None;
            }
        }
    }

    fn publish(&self) {
        let sync = if self.engine.is_syncing() {
            SyncState::Syncing
        } else {
            SyncState::Idle
        };
        let status = OfflineStatus::new(self.prober.state(), self.pending.get(), sync);
        self.status.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }
}

/// Next worker message; pends forever without a worker. `None` once the
/// worker is gone.
async fn recv_client_message(
    messages: &mut Option<broadcast::Receiver<ClientMessage>>,
) -> Option<ClientMessage> {
    let Some(rx) = messages.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(message) => return Some(message),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("[Sync] Skipped {} worker messages", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

async fn wait_settle(settle: &mut Option<Pin<Box<Sleep>>>) {
    match settle.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::local_db::LocalDatabase;
    use crate::client::sync::network_monitor::LinkState;
    use crate::client::offline::queue::{NewPendingItem, QueueStore, SqliteQueueStore};
    use crate::client::offline::transport::mock::MockTransport;
    use crate::shared::http::{HttpMethod, TransportResponse};
    use std::sync::atomic::{AtomicBool, Ordering};

    const PROBE: &str = "http://probe.test/favicon.ico";

    struct Harness {
        monitor: OfflineMonitor,
        link: LinkState,
        store: Arc<SqliteQueueStore>,
        transport: Arc<MockTransport>,
        server_up: Arc<AtomicBool>,
    }

    async fn harness(link_online: bool) -> Harness {
        let config = OfflineConfig::builder()
            .server_url("http://app.test")
            .internet_probe_url(PROBE)
            .poll_interval(Duration::from_millis(100))
            .reconnect_settle(Duration::from_millis(50))
            .periodic_sync_interval(None)
            .build()
            .unwrap();

        let server_up = Arc::new(AtomicBool::new(true));
        let up = server_up.clone();
        let transport = Arc::new(MockTransport::with(move |req| {
            if req.url.ends_with("/api/health") && !up.load(Ordering::SeqCst) {
                Ok(TransportResponse::new(503, ""))
            } else {
                Ok(TransportResponse::new(200, "{}"))
            }
        }));

        let db = Arc::new(LocalDatabase::open_in_memory().await.unwrap());
        let store = Arc::new(SqliteQueueStore::new(db, config.max_file_bytes));
        let link = LinkState::new(link_online);
        let prober =
            Arc::new(ConnectivityProber::new(transport.clone(), &config).with_link(link.clone()));
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            transport.clone(),
            prober,
            PendingCount::new(),
        ));
        let monitor = OfflineMonitor::new(engine, &config);

        Harness {
            monitor,
            link,
            store,
            transport,
            server_up,
        }
    }

    async fn wait_for(rx: &mut watch::Receiver<OfflineStatus>, check: impl Fn(&OfflineStatus) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| check(s)))
            .await
            .expect("status condition not reached")
            .unwrap();
    }

    #[tokio::test]
    async fn test_status_reflects_probe_results() {
        let h = harness(true).await;
        h.server_up.store(false, Ordering::SeqCst);
        let mut rx = h.monitor.subscribe();

        h.monitor.start();
        wait_for(&mut rx, |s| s.has_internet && !s.has_server).await;

        let status = h.monitor.status();
        assert!(!status.is_online);
        assert_eq!(status.connection, crate::client::sync::ConnectionState::OfflineServer);
    }

    #[tokio::test]
    async fn test_reconnect_drains_queue() {
        let h = harness(false).await;
        h.store
            .enqueue(NewPendingItem::new(HttpMethod::Post, "http://app.test/api/items"))
            .await
            .unwrap();
        let mut rx = h.monitor.subscribe();

        h.monitor.start();
        wait_for(&mut rx, |s| s.pending == 1 && !s.is_online).await;
        assert!(h.transport.calls().is_empty());

        h.link.set_online(true);
        wait_for(&mut rx, |s| s.is_online && s.pending == 0 && !s.is_syncing).await;

        assert_eq!(h.store.count().await.unwrap(), 0);
        assert_eq!(h.transport.mutating_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_going_offline_notifies() {
        let h = harness(true).await;
        let mut notifications = h.monitor.notifications();
        let mut rx = h.monitor.subscribe();

        h.monitor.start();
        wait_for(&mut rx, |s| s.is_online).await;

        h.link.set_online(false);
        let notification = tokio::time::timeout(Duration::from_secs(5), notifications.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notification.title, "No internet connection");
    }

    #[tokio::test]
    async fn test_sync_now_announces_result() {
        let h = harness(true).await;
        h.store
            .enqueue(NewPendingItem::new(HttpMethod::Delete, "http://app.test/api/items/4"))
            .await
            .unwrap();
        let mut notifications = h.monitor.notifications();

        let report = h.monitor.sync_now().await;
        assert_eq!(report, SyncReport { synced: 1, failed: 0 });
        assert_eq!(
            notifications.try_recv().unwrap().level,
            crate::client::sync::NotificationLevel::Success
        );
    }

    #[tokio::test]
    async fn test_sync_now_is_noop_while_link_offline() {
        let h = harness(false).await;
        h.store
            .enqueue(NewPendingItem::new(HttpMethod::Post, "http://app.test/api/items"))
            .await
            .unwrap();

        assert_eq!(h.monitor.sync_now().await, SyncReport::default());
        assert!(h.transport.calls().is_empty());
        assert_eq!(h.store.count().await.unwrap(), 1);
        assert!(!h.monitor.status().is_online);
    }

    #[tokio::test]
    async fn test_worker_trigger_starts_sync() {
        let h = harness(true).await;
        let (tx, rx) = broadcast::channel(4);
        let monitor = h.monitor.clone().with_client_messages(rx);
        h.store
            .enqueue(NewPendingItem::new(HttpMethod::Put, "http://app.test/api/items/1"))
            .await
            .unwrap();

        monitor.start();
        tx.send(ClientMessage::TriggerSync { tag: "offline-sync".into() }).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while h.store.count().await.unwrap() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_shutdown_stops() {
        let h = harness(true).await;
        let other = h.monitor.clone();

        h.monitor.start();
        other.start();
        assert_eq!(h.monitor.inner.tasks.lock().unwrap().len(), 2);

        other.shutdown();
        assert!(!h.monitor.is_running());
    }
}
