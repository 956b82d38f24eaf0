//! Shell cache and request classification
//!
//! The shell cache keeps the handful of assets needed to render the app
//! offline, keyed by URL path. API responses never enter it.

use crate::client::offline::transport::Transport;
use crate::shared::http::{HttpMethod, OutboundRequest, TransportResponse};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Path of the page served when a navigation fails with nothing cached
pub const OFFLINE_PAGE: &str = "/offline.html";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("failed to precache {path}: {reason}")]
    Precache { path: String, reason: String },
}

/// How the worker treats a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// `/api/*`: network only, never cached
    Api,
    /// Page load: network first, cache and offline page as fallback
    Navigation,
    /// Everything else: cache first, refreshed in the background
    Static,
}

impl RequestClass {
    pub fn classify(method: HttpMethod, path: &str, accept: Option<&str>) -> Self {
        if path == "/api" || path.starts_with("/api/") {
            return RequestClass::Api;
        }
        let wants_html = accept.is_some_and(|accept| accept.contains("text/html"));
        if method == HttpMethod::Get && wants_html {
            RequestClass::Navigation
        } else {
            RequestClass::Static
        }
    }

    pub fn of(request: &OutboundRequest) -> Self {
        Self::classify(request.method, &request.path(), request.header("accept"))
    }
}

/// Cached shell responses keyed by path
#[derive(Debug, Default)]
pub struct ShellCache {
    entries: RwLock<HashMap<String, TransportResponse>>,
}

impl ShellCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch every asset and cache them together
    ///
    /// Nothing is stored unless every asset loads with a success status.
    pub async fn install(
        &self,
        transport: &dyn Transport,
        base_url: &str,
        assets: &[String],
    ) -> Result<usize, CacheError> {
        let base_url = base_url.trim_end_matches('/');
        let mut fetched = Vec::with_capacity(assets.len());

        for path in assets {
            let request = OutboundRequest::get(format!("{}{}", base_url, path)).no_store();
            let response = transport.send(request).await.map_err(|e| CacheError::Precache {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            if !response.is_success() {
                return Err(CacheError::Precache {
                    path: path.clone(),
                    reason: format!("status {}", response.status),
                });
            }
            fetched.push((path.clone(), response));
        }

        let count = fetched.len();
        if let Ok(mut entries) = self.entries.write() {
            entries.extend(fetched);
        }
        tracing::info!("[Worker] Precached {} shell asset(s)", count);
        Ok(count)
    }

    pub fn get(&self, path: &str) -> Option<TransportResponse> {
        self.entries.read().ok()?.get(path).cloned()
    }

    pub fn put(&self, path: impl Into<String>, response: TransportResponse) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(path.into(), response);
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(path))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::offline::transport::mock::MockTransport;

    fn assets() -> Vec<String> {
        vec!["/".into(), "/icon.png".into(), OFFLINE_PAGE.into()]
    }

    #[test]
    fn test_classify() {
        assert_eq!(RequestClass::classify(HttpMethod::Get, "/api/users", Some("text/html")), RequestClass::Api);
        assert_eq!(RequestClass::classify(HttpMethod::Post, "/api", None), RequestClass::Api);
        assert_eq!(
            RequestClass::classify(HttpMethod::Get, "/settings", Some("text/html,application/xhtml+xml")),
            RequestClass::Navigation
        );
        assert_eq!(RequestClass::classify(HttpMethod::Get, "/app.js", Some("*/*")), RequestClass::Static);
        assert_eq!(RequestClass::classify(HttpMethod::Get, "/apiary.png", None), RequestClass::Static);

        let request = OutboundRequest::get("http://localhost:3000/api/health?x=1");
        assert_eq!(RequestClass::of(&request), RequestClass::Api);
    }

    #[tokio::test]
    async fn test_install_caches_all_assets() {
        let transport = MockTransport::with(|req| Ok(TransportResponse::new(200, req.url.clone())));
        let cache = ShellCache::new();

        let count = cache.install(&transport, "http://localhost:3000/", &assets()).await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(cache.get("/icon.png").unwrap().text(), "http://localhost:3000/icon.png");
        assert!(cache.contains(OFFLINE_PAGE));
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let transport = MockTransport::with(|req| {
            let status = if req.url.ends_with("/icon.png") { 404 } else { 200 };
            Ok(TransportResponse::new(status, ""))
        });
        let cache = ShellCache::new();

        let result = cache.install(&transport, "http://localhost:3000", &assets()).await;
        assert!(matches!(result, Err(CacheError::Precache { ref path, .. }) if path == "/icon.png"));
        assert!(cache.is_empty());
    }
}
