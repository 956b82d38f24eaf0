//! End-to-end offline flow against a mock HTTP server

use crate::common::{fast_config, wait_until};
use offline_sync::client::offline::{OfflineManager, QueueStore};
use offline_sync::client::sync::ConnectionState;
use offline_sync::client::ClientConfig;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_health(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "status": "ok" })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/favicon.ico"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queued_while_offline_replays_once_on_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    Mock::given(method("POST"))
        .and(path("/api/items"))
        .and(body_json(json!({ "name": "Test", "email": "test@example.com" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let config = fast_config(&server.uri(), &dir.path().join("queue.db"));
    let manager = OfflineManager::open(ClientConfig::from(config)).await.unwrap();
    manager.link().set_online(false);
    manager.start();

    let outcome = manager
        .fetch()
        .post_json(
            manager.api_url("/api/items"),
            json!({ "name": "Test", "email": "test@example.com" }),
        )
        .await
        .unwrap();
    assert!(outcome.is_queued());
    assert_eq!(outcome.status(), 202);
    assert_eq!(manager.store().count().await.unwrap(), 1);

    manager.link().set_online(true);
    let store = manager.store().clone();
    let drained = wait_until(Duration::from_secs(10), || {
        let store = store.clone();
        async move { store.count().await.map(|n| n == 0).unwrap_or(false) }
    })
    .await;
    assert!(drained, "queue was not drained after reconnect");

    let engine = manager.engine().clone();
    let recorded = wait_until(Duration::from_secs(5), || {
        let engine = engine.clone();
        async move { engine.last_synced().await.is_some() && engine.metrics().items_synced == 1 }
    })
    .await;
    assert!(recorded, "sync run was not recorded");

    server.verify().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_down_keeps_work_until_health_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_health(&server, 503).await;

    let config = fast_config(&server.uri(), &dir.path().join("queue.db"));
    let manager = OfflineManager::open(ClientConfig::from(config)).await.unwrap();
    manager.start();

    // Unmatched routes answer 404, which is queued like any non-2xx
    let outcome = manager
        .fetch()
        .put_json(manager.api_url("/api/items/1"), json!({ "name": "Renamed" }))
        .await
        .unwrap();
    assert!(outcome.is_queued());

    let mut status = manager.monitor().subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| s.connection == ConnectionState::OfflineServer && s.pending == 1),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(manager.monitor().sync_now().await.synced, 0);
    assert_eq!(manager.store().count().await.unwrap(), 1);

    server.reset().await;
    mount_health(&server, 200).await;
    Mock::given(method("PUT"))
        .and(path("/api/items/1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = manager.store().clone();
    let drained = wait_until(Duration::from_secs(10), || {
        let store = store.clone();
        async move { store.count().await.map(|n| n == 0).unwrap_or(false) }
    })
    .await;
    assert!(drained, "queue was not drained after the server recovered");
    server.verify().await;
}
