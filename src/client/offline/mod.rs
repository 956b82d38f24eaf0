//! # Offline Requests
//!
//! Offline-first request handling: mutating requests that cannot reach the
//! server are written to the durable queue and replayed later by the
//! `SyncEngine`.
//!
//! ## Architecture
//!
//! - **Transport**: the one seam through which requests leave the process
//! - **Queue**: `QueueStore` over the local SQLite database
//! - **Interceptor**: `OfflineFetch`, the drop-in for a plain `fetch`
//! - **Manager**: `OfflineManager`, which owns and wires every component
//!
//! ## Interception rules
//!
//! - `GET` passes straight through and is never queued; a network failure
//!   becomes a synthetic 503
//! - A mutating request while the link is down is queued without a network call
//! - A mutating request that fails at the network level or with a non-2xx
//!   status is queued
//! - Only a failure to queue surfaces as an error
//!
//! ## Usage
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
//! let url = manager.api_url("/api/users");
//! let outcome = manager.fetch().post_json(url, json!({ "name": "Test" })).await?;
//! if outcome.is_queued() {
//!     println!("saved offline, will sync later");
//! }
//! # Ok(())
//! # }
//! ```

pub mod queue;
pub mod transport;

pub use queue::{NewPendingItem, PendingItem, QueueStore, SqliteQueueStore, StoreError};
pub use transport::{HttpTransport, Transport, TransportError};

use crate::client::config::ClientConfig;
use crate::client::local_db::LocalDatabase;
use crate::client::sync::network_monitor::{ConnectivityProber, LinkState};
use crate::client::sync::status::OfflineMonitor;
use crate::client::sync::sync_state::PendingCount;
use crate::client::sync::SyncEngine;
use crate::client::worker::{BackgroundSyncRegistry, SyncSignal, WorkerBridge, WorkerMessage};
use crate::shared::body::{FormBody, RequestBody};
use crate::shared::config::{ConfigError, OfflineConfig};
use crate::shared::http::{HttpMethod, OutboundRequest, TransportResponse};
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum OfflineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0} requests are never queued")]
    NotQueueable(HttpMethod),

    #[error("failed to open queue database: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What became of an intercepted request
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The server answered
    Completed(TransportResponse),
    /// Saved to the queue for a later drain
    Queued { id: i64 },
    /// A read failed and nothing could be served
    Unavailable,
}

impl FetchOutcome {
    /// HTTP-equivalent status: 202 when queued, 503 when unavailable
    pub fn status(&self) -> u16 {
        match self {
            FetchOutcome::Completed(response) => response.status,
            FetchOutcome::Queued { .. } => 202,
            FetchOutcome::Unavailable => 503,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, FetchOutcome::Queued { .. })
    }

    pub fn into_response(self) -> TransportResponse {
        match self {
            FetchOutcome::Completed(response) => response,
            FetchOutcome::Queued { id } => TransportResponse::synthetic_json(
                202,
                &serde_json::json!({ "queued": true, "id": id }),
            ),
            FetchOutcome::Unavailable => TransportResponse::service_unavailable(),
        }
    }
}

/// Offline-aware request interceptor
#[derive(Clone)]
pub struct OfflineFetch {
    store: Arc<dyn QueueStore>,
    transport: Arc<dyn Transport>,
    link: LinkState,
    pending: PendingCount,
    signal: SyncSignal,
}

impl fmt::Debug for OfflineFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineFetch")
            .field("online", &self.link.is_online())
            .field("pending", &self.pending.get())
            .field("signal", &self.signal)
            .finish()
    }
}

impl OfflineFetch {
    pub fn new(
        store: Arc<dyn QueueStore>,
        transport: Arc<dyn Transport>,
        link: LinkState,
        pending: PendingCount,
        signal: SyncSignal,
    ) -> Self {
        Self {
            store,
            transport,
            link,
            pending,
            signal,
        }
    }

    pub async fn fetch(&self, request: OutboundRequest) -> Result<FetchOutcome, OfflineError> {
        if !request.method.is_mutating() {
            return Ok(match self.transport.send(request).await {
                Ok(response) => FetchOutcome::Completed(response),
                Err(e) => {
                    tracing::debug!("[Queue] Read failed, reporting unavailable: {}", e);
                    FetchOutcome::Unavailable
                }
            });
        }

        if !self.link.is_online() {
            return self.enqueue(request).await;
        }

        let request = request.no_store();
        match self.transport.send(request.clone()).await {
            Ok(response) if response.is_success() => Ok(FetchOutcome::Completed(response)),
            Ok(response) => {
                tracing::warn!(
                    "[Queue] {} {} answered {}, queueing for retry",
                    request.method,
                    request.url,
                    response.status
                );
                self.enqueue(request).await
            }
            Err(e) => {
                tracing::warn!("[Queue] {} {} failed ({}), queueing", request.method, request.url, e);
                self.enqueue(request).await
            }
        }
    }

    async fn enqueue(&self, request: OutboundRequest) -> Result<FetchOutcome, OfflineError> {
        let method = request.method;
        let item = NewPendingItem::try_from(request).map_err(|_| OfflineError::NotQueueable(method))?;
        let id = self.store.enqueue(item).await?;

        self.pending.increment();
        self.signal.request_sync();
        Ok(FetchOutcome::Queued { id })
    }

    pub async fn get(&self, url: impl Into<String>) -> Result<FetchOutcome, OfflineError> {
        self.fetch(OutboundRequest::get(url)).await
    }

    pub async fn post_json(
        &self,
        url: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<FetchOutcome, OfflineError> {
        self.fetch(OutboundRequest::post(url).with_json(value)).await
    }

    pub async fn put_json(
        &self,
        url: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<FetchOutcome, OfflineError> {
        self.fetch(OutboundRequest::put(url).with_json(value)).await
    }

    pub async fn patch_json(
        &self,
        url: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<FetchOutcome, OfflineError> {
        self.fetch(OutboundRequest::patch(url).with_json(value)).await
    }

    pub async fn delete(&self, url: impl Into<String>) -> Result<FetchOutcome, OfflineError> {
        self.fetch(OutboundRequest::delete(url)).await
    }

    pub async fn post_form(&self, url: impl Into<String>, form: FormBody) -> Result<FetchOutcome, OfflineError> {
        self.fetch(OutboundRequest::post(url).with_body(RequestBody::Form(form)))
            .await
    }
}

/// Main offline manager coordinating all offline functionality
pub struct OfflineManager {
    config: ClientConfig,
    http: Option<HttpTransport>,
    store: Arc<dyn QueueStore>,
    link: LinkState,
    engine: Arc<SyncEngine>,
    monitor: OfflineMonitor,
    fetch: OfflineFetch,
    worker: Arc<WorkerBridge>,
    worker_tx: mpsc::UnboundedSender<WorkerMessage>,
    worker_rx: Mutex<Option<mpsc::UnboundedReceiver<WorkerMessage>>>,
    registry: Option<Arc<BackgroundSyncRegistry>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for OfflineManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineManager")
            .field("server_url", &self.config.server_url())
            .field("engine", &self.engine)
            .field("worker", &self.worker)
            .finish()
    }
}

impl OfflineManager {
    /// Open the queue database and assemble the offline layer
    pub async fn open(config: ClientConfig) -> Result<Self, OfflineError> {
        let db = match &config.offline().db_path {
            Some(path) => LocalDatabase::open(path).await?,
            None => LocalDatabase::new().await?,
        };
        Ok(Self::with_http(config, db))
    }

    /// Like `open`, with a private in-memory queue
    pub async fn in_memory(config: ClientConfig) -> Result<Self, OfflineError> {
        let db = LocalDatabase::open_in_memory().await?;
        Ok(Self::with_http(config, db))
    }

    fn with_http(config: ClientConfig, db: LocalDatabase) -> Self {
        let http = HttpTransport::default();
        http.set_token(config.get_token().cloned());

        let store = Arc::new(SqliteQueueStore::new(Arc::new(db), config.offline().max_file_bytes));
        let link = LinkState::default();
        let mut manager = Self::with_parts(config, store, Arc::new(http.clone()), link);
        manager.http = Some(http);
        manager
    }

    /// Assemble from caller-supplied parts
    pub fn with_parts(
        config: ClientConfig,
        store: Arc<dyn QueueStore>,
        transport: Arc<dyn Transport>,
        link: LinkState,
    ) -> Self {
        let offline = config.offline().clone();
        let pending = PendingCount::new();

        let prober = Arc::new(
            ConnectivityProber::new(Arc::clone(&transport), &offline).with_link(link.clone()),
        );
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            prober,
            pending.clone(),
        ));

        let worker = Arc::new(WorkerBridge::new(Arc::clone(&transport), &offline));
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();

        let (signal, registry) = if offline.background_sync {
            let registry = Arc::new(BackgroundSyncRegistry::new(worker_tx.clone(), link.clone()));
            (SyncSignal::registered(Arc::clone(&registry), offline.sync_tag.clone()), Some(registry))
        } else {
            (SyncSignal::direct(worker_tx.clone(), offline.sync_tag.clone()), None)
        };

        let monitor = OfflineMonitor::new(Arc::clone(&engine), &offline)
            .with_client_messages(worker.subscribe());
        let fetch = OfflineFetch::new(Arc::clone(&store), transport, link.clone(), pending, signal);

        Self {
            config,
            http: None,
            store,
            link,
            engine,
            monitor,
            fetch,
            worker,
            worker_tx,
            worker_rx: Mutex::new(Some(worker_rx)),
            registry,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the worker, the background sync listener and the monitor
    ///
    /// Idempotent; must be called inside a tokio runtime.
    pub fn start(&self) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };
        if let Some(rx) = self.worker_rx.lock().ok().and_then(|mut slot| slot.take()) {
            let worker = Arc::clone(&self.worker);
            tasks.push(tokio::spawn(async move {
                if let Err(e) = worker.install().await {
                    tracing::warn!("[Worker] Shell precache failed: {}", e);
                }
            }));
            tasks.push(Arc::clone(&self.worker).spawn(rx));
            if let Some(registry) = &self.registry {
                tasks.push(registry.spawn());
            }
        }
        self.monitor.start();
        tracing::info!("[Sync] Offline layer started for {}", self.config.server_url());
    }

    pub fn fetch(&self) -> &OfflineFetch {
        &self.fetch
    }

    pub fn monitor(&self) -> &OfflineMonitor {
        &self.monitor
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn link(&self) -> &LinkState {
        &self.link
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    pub fn worker(&self) -> &Arc<WorkerBridge> {
        &self.worker
    }

    /// Channel for posting messages to the worker
    pub fn worker_handle(&self) -> mpsc::UnboundedSender<WorkerMessage> {
        self.worker_tx.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Set or clear the session token used for requests and replays
    pub fn set_token(&mut self, token: Option<String>) {
        if let Some(http) = &self.http {
            http.set_token(token.clone());
        }
        self.config.set_token(token);
    }

    pub fn api_url(&self, path: &str) -> String {
        self.config.api_url(path)
    }

    pub fn offline_config(&self) -> &OfflineConfig {
        self.config.offline()
    }
}

impl Drop for OfflineManager {
    fn drop(&mut self) {
        self.monitor.shutdown();
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}
