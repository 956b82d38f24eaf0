//! # Durable Request Queue
//!
//! Persists mutating requests that could not reach the server so they can be
//! replayed later, in submission order.
//!
//! ## Features
//!
//! - **Durable**: entries live in SQLite and survive restarts
//! - **FIFO**: `list_pending` orders by the assigned id, never by wall-clock time
//! - **Early validation**: oversized files, malformed headers and malformed
//!   file content types are rejected when enqueued, never at replay
//! - **Cheap counts**: `count` never loads rows
//!
//! ## Usage
//!
//! ```rust,no_run
//! use offline_sync::client::local_db::LocalDatabase;
//! use offline_sync::client::offline::queue::{NewPendingItem, QueueStore, SqliteQueueStore};
//! use offline_sync::shared::{HttpMethod, RequestBody};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Arc::new(LocalDatabase::open_in_memory().await?);
//! let store = SqliteQueueStore::new(db, 3_000_000);
//!
//! let id = store
//!     .enqueue(NewPendingItem::new(HttpMethod::Post, "http://127.0.0.1:3000/api/users")
//!         .with_body(RequestBody::Text("hi".into())))
//!     .await?;
//! assert_eq!(store.count().await?, 1);
//! store.remove(id).await?;
//! # Ok(())
//! # }
//! ```

use crate::client::local_db::queue::NewPendingRow;
use crate::client::local_db::{LocalDatabase, PendingRow};
use crate::shared::body::{RequestBody, StoredBody};
use crate::shared::error::SharedError;
use crate::shared::http::{Credentials, HttpMethod, OutboundRequest};
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::multipart::Part;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Queue store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// A multipart file exceeds the configured ceiling
    #[error("file '{name}' is {size} bytes, exceeding the {limit} byte limit")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    /// The entry could never be sent as an HTTP request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The store cannot accept writes at all
    #[error("queue store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored entry could not be turned back into a request
    #[error("invalid stored body: {0}")]
    InvalidBody(#[from] SharedError),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// One durable queue entry
#[derive(Debug, Clone, PartialEq)]
pub struct PendingItem {
    pub id: i64,
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<StoredBody>,
    /// Epoch milliseconds at enqueue time
    pub created_at: i64,
    pub retry_count: u32,
}

impl PendingItem {
    /// Rebuild the request for replay
    ///
    /// JSON bodies get an explicit `Content-Type`; form bodies drop any stored
    /// one so the transport can generate a fresh multipart boundary.
    pub fn to_request(&self) -> Result<OutboundRequest, SharedError> {
        let mut request = OutboundRequest::new(self.method, self.url.clone())
            .with_headers(self.headers.iter().map(|(k, v)| (k.as_str(), v.clone())))
            .with_credentials(Credentials::Include)
            .no_store();

        if let Some(stored) = &self.body {
            let body = stored.decode()?;
            match body {
                RequestBody::Json(_) => {
                    request = request.with_header("content-type", "application/json");
                }
                RequestBody::Form(_) => {
                    request.headers.remove("content-type");
                }
                RequestBody::Text(_) => {}
            }
            request = request.with_body(body);
        }

        Ok(request)
    }
}

impl TryFrom<PendingRow> for PendingItem {
    type Error = StoreError;

    fn try_from(row: PendingRow) -> Result<Self, Self::Error> {
        let method = row.method.parse::<HttpMethod>()?;
        let headers = serde_json::from_str(&row.headers)?;
        let body = row
            .body
            .as_deref()
            .map(serde_json::from_str::<StoredBody>)
            .transpose()?;

        Ok(Self {
            id: row.id,
            url: row.url,
            method,
            headers,
            body,
            created_at: row.created_at,
            retry_count: u32::try_from(row.retry_count).unwrap_or(u32::MAX),
        })
    }
}

/// A request about to be queued; the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewPendingItem {
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
}

impl NewPendingItem {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }
}

impl TryFrom<OutboundRequest> for NewPendingItem {
    type Error = SharedError;

    fn try_from(request: OutboundRequest) -> Result<Self, Self::Error> {
        if !request.method.is_mutating() {
            return Err(SharedError::validation(
                "method",
                format!("{} requests are never queued", request.method),
            ));
        }
        Ok(Self {
            url: request.url,
            method: request.method,
            headers: request.headers,
            body: request.body,
        })
    }
}

/// Durable FIFO of pending requests
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Validate, stamp and append an entry; returns the assigned id
    async fn enqueue(&self, item: NewPendingItem) -> Result<i64, StoreError>;

    /// Every entry, oldest first
    async fn list_pending(&self) -> Result<Vec<PendingItem>, StoreError>;

    /// Delete an entry; absent ids are ignored
    async fn remove(&self, id: i64) -> Result<(), StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    /// Note a failed replay attempt against an entry
    async fn record_failure(&self, id: i64) -> Result<(), StoreError>;

    /// Entries targeting `url`, oldest first
    async fn list_by_url(&self, url: &str) -> Result<Vec<PendingItem>, StoreError>;

    /// Remember that a drain just completed
    async fn mark_synced(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// RFC 3339 time of the last completed drain, if any
    async fn last_synced(&self) -> Result<Option<String>, StoreError> {
        Ok(None)
    }
}

/// `QueueStore` over the local SQLite database
#[derive(Debug, Clone)]
pub struct SqliteQueueStore {
    db: Arc<LocalDatabase>,
    max_file_bytes: u64,
}

impl SqliteQueueStore {
    pub fn new(db: Arc<LocalDatabase>, max_file_bytes: u64) -> Self {
        Self { db, max_file_bytes }
    }

    pub fn database(&self) -> &Arc<LocalDatabase> {
        &self.db
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    fn validate(&self, item: &NewPendingItem) -> Result<(), StoreError> {
        for (name, value) in &item.headers {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StoreError::InvalidRequest(format!("header {}: {}", name, e)))?;
            HeaderValue::from_str(value)
                .map_err(|e| StoreError::InvalidRequest(format!("header {}: {}", name, e)))?;
        }

        if let Some(RequestBody::Form(form)) = &item.body {
            if let Some(file) = form.files.iter().find(|f| f.size() > self.max_file_bytes) {
                return Err(StoreError::FileTooLarge {
                    name: file.name.clone(),
                    size: file.size(),
                    limit: self.max_file_bytes,
                });
            }
            for file in &form.files {
                Part::bytes(Vec::new()).mime_str(&file.mime_type).map_err(|e| {
                    StoreError::InvalidRequest(format!(
                        "file {} type {:?}: {}",
                        file.name, file.mime_type, e
                    ))
                })?;
            }
        }
        Ok(())
    }

    fn decode_rows(rows: Vec<PendingRow>) -> Result<Vec<PendingItem>, StoreError> {
        rows.into_iter().map(PendingItem::try_from).collect()
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn enqueue(&self, item: NewPendingItem) -> Result<i64, StoreError> {
        self.validate(&item)?;

        let stored = item.body.as_ref().map(StoredBody::from);
        let body_json = stored.as_ref().map(serde_json::to_string).transpose()?;
        let headers_json = serde_json::to_string(&item.headers)?;

        let id = self
            .db
            .insert_pending(NewPendingRow {
                url: &item.url,
                method: item.method.as_str(),
                headers: &headers_json,
                body_type: stored.as_ref().map(StoredBody::body_type),
                body: body_json.as_deref(),
                created_at: chrono::Utc::now().timestamp_millis(),
            })
            .await
            .map_err(|e| {
                tracing::error!("[Queue] Failed to persist {} {}: {}", item.method, item.url, e);
                StoreError::from(e)
            })?;

        tracing::debug!("[Queue] Enqueued #{} {} {}", id, item.method, item.url);
        Ok(id)
    }

    async fn list_pending(&self) -> Result<Vec<PendingItem>, StoreError> {
        Self::decode_rows(self.db.fetch_pending().await?)
    }

    async fn remove(&self, id: i64) -> Result<(), StoreError> {
        if !self.db.delete_pending(id).await? {
            tracing::debug!("[Queue] #{} already removed", id);
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.db.count_pending().await? as usize)
    }

    async fn record_failure(&self, id: i64) -> Result<(), StoreError> {
        self.db.increment_retry(id).await?;
        Ok(())
    }

    async fn list_by_url(&self, url: &str) -> Result<Vec<PendingItem>, StoreError> {
        Self::decode_rows(self.db.fetch_pending_by_url(url).await?)
    }

    async fn mark_synced(&self) -> Result<(), StoreError> {
        self.db.set_last_sync_time().await?;
        Ok(())
    }

    async fn last_synced(&self) -> Result<Option<String>, StoreError> {
        Ok(self.db.get_last_sync_time().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::body::FormBody;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn store(limit: u64) -> SqliteQueueStore {
        let db = LocalDatabase::open_in_memory().await.unwrap();
        SqliteQueueStore::new(Arc::new(db), limit)
    }

    fn post(path: &str) -> NewPendingItem {
        NewPendingItem::new(HttpMethod::Post, format!("http://localhost:3000{}", path))
    }

    #[tokio::test]
    async fn test_enqueue_assigns_ids_and_preserves_order() {
        let store = store(1_000).await;

        let mut ids = Vec::new();
        for i in 0..5 {
            let item = post("/api/items").with_body(RequestBody::Json(json!({ "n": i })));
            ids.push(store.enqueue(item).await.unwrap());
        }

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.iter().map(|p| p.id).collect::<Vec<_>>(), ids);
        for (i, item) in pending.iter().enumerate() {
            assert_eq!(item.body, Some(StoredBody::Json(json!({ "n": i }))));
            assert_eq!(item.retry_count, 0);
            assert!(item.created_at > 0);
        }
        assert_eq!(store.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_oversized_file_is_rejected_and_count_unchanged() {
        let store = store(10).await;
        store.enqueue(post("/api/ok")).await.unwrap();

        let form = FormBody::new()
            .field("folder", "docs")
            .file("file", "big.bin", "application/octet-stream", vec![0; 11]);
        let result = store
            .enqueue(post("/api/files").with_body(RequestBody::Form(form)))
            .await;

        assert_matches!(
            result,
            Err(StoreError::FileTooLarge { ref name, size: 11, limit: 10 }) if name == "big.bin"
        );
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unsendable_header_is_rejected_at_enqueue() {
        let store = store(10).await;

        let result = store
            .enqueue(post("/api/a").with_header("X-Note", "line one\nline two"))
            .await;
        assert_matches!(result, Err(StoreError::InvalidRequest(_)));

        let result = store.enqueue(post("/api/a").with_header("bad header", "v")).await;
        assert_matches!(result, Err(StoreError::InvalidRequest(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_file_type_is_rejected_at_enqueue() {
        let store = store(10).await;
        let form = FormBody::new().file("file", "logo.png", "image png", vec![1, 2, 3]);

        let result = store
            .enqueue(post("/api/files").with_body(RequestBody::Form(form)))
            .await;
        assert_matches!(result, Err(StoreError::InvalidRequest(ref msg)) if msg.contains("logo.png"));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_at_limit_is_accepted() {
        let store = store(10).await;
        let form = FormBody::new().file("file", "edge.bin", "application/octet-stream", vec![1; 10]);
        store
            .enqueue(post("/api/files").with_body(RequestBody::Form(form)))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = store(10).await;
        let id = store.enqueue(post("/api/a")).await.unwrap();

        store.remove(id).await.unwrap();
        store.remove(id).await.unwrap();
        store.remove(9_999).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_record_failure_increments_retry_count() {
        let store = store(10).await;
        let id = store.enqueue(post("/api/a")).await.unwrap();

        store.record_failure(id).await.unwrap();
        store.record_failure(id).await.unwrap();

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending[0].retry_count, 2);
    }

    #[tokio::test]
    async fn test_list_by_url() {
        let store = store(10).await;
        store.enqueue(post("/api/users")).await.unwrap();
        store.enqueue(post("/api/roles")).await.unwrap();

        let users = store.list_by_url("http://localhost:3000/api/users").await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].url, "http://localhost:3000/api/users");
    }

    #[tokio::test]
    async fn test_mark_synced_records_time() {
        let store = store(10).await;
        assert_eq!(store.last_synced().await.unwrap(), None);
        store.mark_synced().await.unwrap();
        assert!(store.last_synced().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        {
            let db = Arc::new(LocalDatabase::open(&path).await.unwrap());
            let store = SqliteQueueStore::new(db.clone(), 100);
            store
                .enqueue(post("/api/users").with_header("X-Tenant", "acme"))
                .await
                .unwrap();
            db.close().await;
        }

        let db = Arc::new(LocalDatabase::open(&path).await.unwrap());
        let store = SqliteQueueStore::new(db, 100);
        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].headers.get("x-tenant").map(String::as_str), Some("acme"));
    }

    #[test]
    fn test_get_requests_are_not_queueable() {
        let result = NewPendingItem::try_from(OutboundRequest::get("http://localhost/api/users"));
        assert_matches!(result, Err(SharedError::ValidationError { .. }));
    }

    #[test]
    fn test_to_request_sets_json_content_type() {
        let item = PendingItem {
            id: 1,
            url: "http://localhost/api/users".into(),
            method: HttpMethod::Put,
            headers: BTreeMap::from([("x-tenant".to_string(), "acme".to_string())]),
            body: Some(StoredBody::Json(json!({ "name": "Test" }))),
            created_at: 1,
            retry_count: 0,
        };

        let request = item.to_request().unwrap();
        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.header("x-tenant"), Some("acme"));
        assert_eq!(request.credentials, Credentials::Include);
        assert_eq!(request.body, Some(RequestBody::Json(json!({ "name": "Test" }))));
    }

    #[test]
    fn test_to_request_strips_form_content_type() {
        let body = RequestBody::Form(FormBody::new().file("f", "a.txt", "text/plain", b"abc".to_vec()));
        let item = PendingItem {
            id: 1,
            url: "http://localhost/api/files".into(),
            method: HttpMethod::Post,
            headers: BTreeMap::from([(
                "content-type".to_string(),
                "multipart/form-data; boundary=old".to_string(),
            )]),
            body: Some(StoredBody::from(&body)),
            created_at: 1,
            retry_count: 0,
        };

        let request = item.to_request().unwrap();
        assert_eq!(request.header("content-type"), None);
        assert_eq!(request.body, Some(body));
    }
}
