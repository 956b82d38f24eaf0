//! # Worker Bridge
//!
//! The service-worker side of the offline layer. It owns the shell cache,
//! applies a fetch policy per request class, and relays sync triggers and
//! connectivity verdicts to every open client. It never replays queued
//! requests itself; that stays with the `SyncEngine`, which has the session.
//!
//! Clients talk to the worker only through messages:
//!
//! - `WorkerMessage` flows in over an unbounded `mpsc` channel
//! - `ClientMessage` flows out over a `broadcast` channel, one receiver per client
//!
//! ## Usage
//!
//! ```rust,no_run
//! use offline_sync::client::offline::transport::HttpTransport;
//! use offline_sync::client::worker::{WorkerBridge, WorkerMessage};
//! use offline_sync::shared::OfflineConfig;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let bridge = Arc::new(WorkerBridge::new(Arc::new(HttpTransport::default()), &OfflineConfig::default()));
//! let mut client = bridge.subscribe();
//! let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//! let _task = Arc::clone(&bridge).spawn(rx);
//!
//! tx.send(WorkerMessage::CheckConnectivity).ok();
//! let verdict = client.recv().await;
//! # }
//! ```

pub mod background_sync;
pub mod cache;

pub use background_sync::{BackgroundSyncRegistry, SyncSignal};
pub use cache::{CacheError, RequestClass, ShellCache, OFFLINE_PAGE};

use crate::client::offline::transport::Transport;
use crate::shared::config::OfflineConfig;
use crate::shared::http::{OutboundRequest, TransportResponse};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Messages posted to the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    /// The platform fired a background sync for `tag`
    BackgroundSync { tag: String },
    /// A client asked for a sync directly, without platform support
    SyncRequested { tag: String },
    /// A client wants a fresh connectivity verdict
    CheckConnectivity,
}

/// Messages broadcast by the worker to every client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    TriggerSync { tag: String },
    Connectivity { online: bool },
}

pub struct WorkerBridge {
    transport: Arc<dyn Transport>,
    cache: Arc<ShellCache>,
    server_url: String,
    health_url: String,
    probe_timeout: Duration,
    sync_tag: String,
    shell_assets: Vec<String>,
    clients: broadcast::Sender<ClientMessage>,
    last_verdict: Mutex<Option<bool>>,
}

impl fmt::Debug for WorkerBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerBridge")
            .field("server_url", &self.server_url)
            .field("sync_tag", &self.sync_tag)
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl WorkerBridge {
    pub fn new(transport: Arc<dyn Transport>, config: &OfflineConfig) -> Self {
        let (clients, _) = broadcast::channel(32);
        Self {
            transport,
            cache: Arc::new(ShellCache::new()),
            server_url: config.server_url.trim_end_matches('/').to_string(),
            health_url: config.health_url(),
            probe_timeout: config.probe_timeout,
            sync_tag: config.sync_tag.clone(),
            shell_assets: config.shell_assets.clone(),
            clients,
            last_verdict: Mutex::new(None),
        }
    }

    /// Precache the configured shell assets
    pub async fn install(&self) -> Result<usize, CacheError> {
        self.cache
            .install(self.transport.as_ref(), &self.server_url, &self.shell_assets)
            .await
    }

    pub fn cache(&self) -> &Arc<ShellCache> {
        &self.cache
    }

    /// New client connection
    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.clients.subscribe()
    }

    /// Serve a request according to its class
    ///
    /// Always yields a response; network failures with nothing cached become
    /// a structured 503.
    pub async fn handle_fetch(&self, request: OutboundRequest) -> TransportResponse {
        let class = RequestClass::of(&request);
        let path = request.path();

        match class {
            RequestClass::Api => match self.transport.send(request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!("[Worker] API request to {} failed: {}", path, e);
                    TransportResponse::service_unavailable()
                }
            },
            RequestClass::Navigation => match self.transport.send(request).await {
                Ok(response) => {
                    if response.is_success() {
                        self.cache.put(path, response.clone());
                    }
                    response
                }
                Err(e) => {
                    tracing::debug!("[Worker] Navigation to {} failed, serving from cache: {}", path, e);
                    self.cache
                        .get(&path)
                        .or_else(|| self.cache.get(OFFLINE_PAGE))
                        .unwrap_or_else(TransportResponse::service_unavailable)
                }
            },
            RequestClass::Static => {
                if let Some(cached) = self.cache.get(&path) {
                    self.refresh_in_background(request, path);
                    return cached;
                }
                match self.transport.send(request).await {
                    Ok(response) => {
                        if response.is_success() {
                            self.cache.put(path, response.clone());
                        }
                        response
                    }
                    Err(e) => {
                        tracing::debug!("[Worker] Static asset {} unavailable: {}", path, e);
                        TransportResponse::service_unavailable()
                    }
                }
            }
        }
    }

    fn refresh_in_background(&self, request: OutboundRequest, path: String) {
        let transport = Arc::clone(&self.transport);
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            match transport.send(request).await {
                Ok(response) if response.is_success() => cache.put(path, response),
                Ok(_) | Err(_) => {}
            }
        });
    }

    /// Relay a platform background sync to every client
    ///
    /// Returns whether the tag was ours.
    pub fn on_background_sync(&self, tag: &str) -> bool {
        if tag != self.sync_tag {
            tracing::debug!("[Worker] Ignoring background sync for unknown tag '{}'", tag);
            return false;
        }
        let delivered = self
            .clients
            .send(ClientMessage::TriggerSync { tag: tag.to_string() })
            .unwrap_or(0);
        tracing::info!("[Worker] Relayed sync '{}' to {} client(s)", tag, delivered);
        true
    }

    pub async fn handle_message(&self, message: WorkerMessage) {
        match message {
            WorkerMessage::BackgroundSync { tag } | WorkerMessage::SyncRequested { tag } => {
                self.on_background_sync(&tag);
            }
            WorkerMessage::CheckConnectivity => {
                let online = self.probe_server().await;
                self.broadcast_verdict(online);
            }
        }
    }

    async fn probe_server(&self) -> bool {
        let request = OutboundRequest::get(self.health_url.clone())
            .no_store()
            .with_timeout(self.probe_timeout);
        matches!(
            tokio::time::timeout(self.probe_timeout, self.transport.send(request)).await,
            Ok(Ok(response)) if response.is_success()
        )
    }

    /// Broadcast a verdict only when it differs from the last one sent
    fn broadcast_verdict(&self, online: bool) {
        let Ok(mut last) = self.last_verdict.lock() else {
            return;
        };
        if *last == Some(online) {
            return;
        }
        *last = Some(online);
        let _ = self.clients.send(ClientMessage::Connectivity { online });
    }

    /// Process incoming messages until every sender is gone
    pub fn spawn(self: Arc<Self>, mut messages: mpsc::UnboundedReceiver<WorkerMessage>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = messages.recv().await {
                self.handle_message(message).await;
            }
            tracing::debug!("[Worker] Message channel closed");
        })
    }
}
