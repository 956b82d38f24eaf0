//! # Network Monitor
//!
//! Tells "no internet at all" apart from "internet fine, our server is down".
//!
//! ## Features
//!
//! - **Link state**: the host's immediate online flag, with change events
//! - **Two probes**: a third-party resource for internet reachability and the
//!   first-party health endpoint for server reachability, run concurrently
//! - **Single-flight**: at most one probe cycle runs at a time
//! - **Polling**: re-probes on an interval and on every link change
//!
//! ## Usage
//!
//! ```rust,no_run
//! use offline_sync::client::offline::transport::HttpTransport;
//! use offline_sync::client::sync::network_monitor::{ConnectivityProber, LinkState};
//! use offline_sync::shared::OfflineConfig;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let link = LinkState::new(true);
//! let prober = Arc::new(
//!     ConnectivityProber::new(Arc::new(HttpTransport::default()), &OfflineConfig::default())
//!         .with_link(link.clone()),
//! );
//! let state = prober.check().await;
//! println!("composite state: {}", state.connection());
//!
//! let polling = prober.spawn_polling();
//! # polling.abort();
//! # }
//! ```

use crate::client::offline::transport::Transport;
use crate::shared::config::OfflineConfig;
use crate::shared::http::{Credentials, OutboundRequest};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Change of the host's immediate online flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Online,
    Offline,
}

/// The host's immediate online flag
///
/// Cheap to read synchronously; set by whatever observes the OS network
/// interfaces. Going offline here is authoritative, going online only
/// prompts a probe.
#[derive(Debug, Clone)]
pub struct LinkState {
    online: Arc<AtomicBool>,
    events: broadcast::Sender<LinkEvent>,
}

impl LinkState {
    pub fn new(online: bool) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            online: Arc::new(AtomicBool::new(online)),
            events,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Update the flag, emitting an event only when it actually changes
    pub fn set_online(&self, online: bool) {
        if self.online.swap(online, Ordering::SeqCst) == online {
            return;
        }
        tracing::info!("[Probe] Link went {}", if online { "online" } else { "offline" });
        let event = if online { LinkEvent::Online } else { LinkEvent::Offline };
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Result of one probe cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectivityState {
    pub has_internet: bool,
    pub has_server: bool,
}

impl ConnectivityState {
    pub fn new(has_internet: bool, has_server: bool) -> Self {
        Self {
            has_internet,
            has_server,
        }
    }

    pub fn offline() -> Self {
        Self::default()
    }

    pub fn is_online(&self) -> bool {
        self.has_internet && self.has_server
    }

    pub fn connection(&self) -> ConnectionState {
        ConnectionState::from(*self)
    }
}

/// Composite connectivity verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Online,
    /// Internet reachable, application server not
    OfflineServer,
    /// No internet, whatever the server probe said
    OfflineInternet,
}

impl From<ConnectivityState> for ConnectionState {
    fn from(state: ConnectivityState) -> Self {
        match (state.has_internet, state.has_server) {
            (false, _) => ConnectionState::OfflineInternet,
            (true, false) => ConnectionState::OfflineServer,
            (true, true) => ConnectionState::Online,
        }
    }
}

impl ConnectionState {
    pub fn is_online(self) -> bool {
        self == ConnectionState::Online
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Online => "online",
            ConnectionState::OfflineServer => "offline-server",
            ConnectionState::OfflineInternet => "offline-internet",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clears the in-flight flag when a probe cycle ends or is cancelled
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Probes internet and server reachability
pub struct ConnectivityProber {
    transport: Arc<dyn Transport>,
    internet_probe_url: String,
    health_url: String,
    timeout: Duration,
    poll_interval: Duration,
    link: LinkState,
    in_flight: AtomicBool,
    state: watch::Sender<ConnectivityState>,
}

impl fmt::Debug for ConnectivityProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityProber")
            .field("internet_probe_url", &self.internet_probe_url)
            .field("health_url", &self.health_url)
            .field("timeout", &self.timeout)
            .field("link_online", &self.link.is_online())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl ConnectivityProber {
    pub fn new(transport: Arc<dyn Transport>, config: &OfflineConfig) -> Self {
        let (state, _) = watch::channel(ConnectivityState::offline());
        Self {
            transport,
            internet_probe_url: config.internet_probe_url.clone(),
            health_url: config.health_url(),
            timeout: config.probe_timeout,
            poll_interval: config.poll_interval,
            link: LinkState::default(),
            in_flight: AtomicBool::new(false),
            state,
        }
    }

    /// Follow `link`; while it reads offline no probe is sent
    pub fn with_link(mut self, link: LinkState) -> Self {
        self.link = link;
        self
    }

    pub fn link(&self) -> &LinkState {
        &self.link
    }

    /// Whether the third-party probe resource loads
    ///
    /// Any response counts as reachable; only a transport error or the
    /// timeout means no internet.
    pub async fn has_internet(&self) -> bool {
        let separator = if self.internet_probe_url.contains('?') { '&' } else { '?' };
        let url = format!(
            "{}{}_={}",
            self.internet_probe_url,
            separator,
            chrono::Utc::now().timestamp_millis()
        );
        let request = OutboundRequest::get(url)
            .no_store()
            .with_credentials(Credentials::Omit)
            .with_timeout(self.timeout);

        match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!("[Probe] Internet probe failed: {}", e);
                false
            }
            Err(_) => {
                tracing::debug!("[Probe] Internet probe timed out");
                false
            }
        }
    }

    /// Whether the health endpoint answers with a success status
    pub async fn has_server(&self) -> bool {
        let request = OutboundRequest::get(self.health_url.clone())
            .no_store()
            .with_timeout(self.timeout);

        match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => response.is_success(),
            Ok(Err(e)) => {
                tracing::debug!("[Probe] Health probe failed: {}", e);
                false
            }
            Err(_) => {
                tracing::debug!("[Probe] Health probe timed out");
                false
            }
        }
    }

    /// Run both probes and publish the result
    ///
    /// An offline link short-circuits to the offline state without touching
    /// the network. While another cycle is in flight this does not probe; it
    /// waits for that cycle to publish (bounded by twice the probe timeout)
    /// and returns the latest known state.
    pub async fn check(&self) -> ConnectivityState {
        if !self.link.is_online() {
            self.force_offline();
            return ConnectivityState::offline();
        }

        let mut rx = self.state.subscribe();

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let _ = tokio::time::timeout(self.timeout * 2, rx.changed()).await;
            return *rx.borrow();
        }

        let guard = CycleGuard(&self.in_flight);
        let (has_internet, has_server) = tokio::join!(self.has_internet(), self.has_server());
        let state = ConnectivityState::new(has_internet, has_server);
        drop(guard);

        self.publish(state);
        state
    }

    /// Mark both signals unreachable without probing
    pub fn force_offline(&self) {
        self.publish(ConnectivityState::offline());
    }

    fn publish(&self, state: ConnectivityState) {
        let previous = self.state.send_replace(state);
        if previous.connection() != state.connection() {
            tracing::info!(
                "[Probe] Connectivity {} -> {} (internet: {}, server: {})",
                previous.connection(),
                state.connection(),
                state.has_internet,
                state.has_server
            );
        }
    }

    /// Last published state
    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    /// Receives every published state, including unchanged ones
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }

    /// Poll on the configured interval and react to link changes
    ///
    /// While the link is offline, ticks force the offline state instead of
    /// probing.
    pub fn spawn_polling(self: &Arc<Self>) -> JoinHandle<()> {
        let prober = Arc::clone(self);
        let mut events = self.link.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(prober.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        prober.check().await;
                    }
                    event = events.recv() => match event {
                        Ok(LinkEvent::Online) => {
                            prober.check().await;
                        }
                        Ok(LinkEvent::Offline) => prober.force_offline(),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!("[Probe] Skipped {} link events", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }
}
