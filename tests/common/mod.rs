//! Common test utilities and helpers

use offline_sync::client::local_db::LocalDatabase;
use offline_sync::client::offline::SqliteQueueStore;
use offline_sync::shared::OfflineConfig;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Config pointed at `server_url` with intervals short enough for tests
pub fn fast_config(server_url: &str, db_path: &Path) -> OfflineConfig {
    OfflineConfig::builder()
        .server_url(server_url)
        .internet_probe_url(format!("{}/favicon.ico", server_url))
        .probe_timeout(Duration::from_millis(500))
        .poll_interval(Duration::from_millis(100))
        .notification_debounce(Duration::from_millis(10))
        .reconnect_settle(Duration::from_millis(50))
        .periodic_sync_interval(None)
        .db_path(db_path)
        .build()
        .expect("test config is valid")
}

/// File-backed queue store under `dir`
pub async fn file_store(dir: &Path, max_file_bytes: u64) -> Arc<SqliteQueueStore> {
    let db = LocalDatabase::open(dir.join("queue.db"))
        .await
        .expect("open queue database");
    Arc::new(SqliteQueueStore::new(Arc::new(db), max_file_bytes))
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .is_ok()
}
