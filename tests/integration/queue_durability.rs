//! Queue durability across restarts

use crate::common::file_store;
use offline_sync::client::offline::{NewPendingItem, QueueStore, StoreError};
use offline_sync::shared::{FormBody, HttpMethod, RequestBody, StoredBody};
use futures_util::future::join_all;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeSet;

#[tokio::test]
async fn test_entries_survive_reopen_in_order() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = file_store(dir.path(), 1024).await;
        store
            .enqueue(
                NewPendingItem::new(HttpMethod::Post, "http://app.test/api/items")
                    .with_header("X-Request-Source", "form")
                    .with_body(RequestBody::Json(json!({ "name": "first" }))),
            )
            .await
            .unwrap();
        store
            .enqueue(
                NewPendingItem::new(HttpMethod::Post, "http://app.test/api/upload").with_body(RequestBody::Form(
                    FormBody::new()
                        .field("title", "receipt")
                        .file("document", "receipt.png", "image/png", vec![1, 2, 3, 4]),
                )),
            )
            .await
            .unwrap();
        store.database().close().await;
    }

    let store = file_store(dir.path(), 1024).await;
    let items = store.list_pending().await.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items[0].id < items[1].id);
    assert!(items[0].created_at <= items[1].created_at);
    assert_eq!(items[0].headers.get("x-request-source").map(String::as_str), Some("form"));

    let replay = items[1].to_request().unwrap();
    assert_eq!(replay.header("content-type"), None);
    match replay.body {
        Some(RequestBody::Form(form)) => {
            assert_eq!(form.fields.get("title").map(String::as_str), Some("receipt"));
            assert_eq!(form.files[0].name, "receipt.png");
            assert_eq!(form.files[0].bytes, vec![1, 2, 3, 4]);
        }
        other => panic!("expected a form body, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failures_are_counted_durably() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let store = file_store(dir.path(), 1024).await;
        let id = store
            .enqueue(NewPendingItem::new(HttpMethod::Delete, "http://app.test/api/items/7"))
            .await
            .unwrap();
        store.record_failure(id).await.unwrap();
        store.record_failure(id).await.unwrap();
        store.database().close().await;
        id
    };

    let store = file_store(dir.path(), 1024).await;
    let items = store.list_by_url("http://app.test/api/items/7").await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, id);
    assert_eq!(items[0].retry_count, 2);

    store.remove(id).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_oversized_upload_leaves_queue_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path(), 4).await;

    let result = store
        .enqueue(NewPendingItem::new(HttpMethod::Post, "http://app.test/api/upload").with_body(
            RequestBody::Form(FormBody::new().file("document", "big.bin", "application/octet-stream", vec![0; 5])),
        ))
        .await;
    assert!(matches!(result, Err(StoreError::FileTooLarge { ref name, .. }) if name == "big.bin"));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_keep_their_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path(), 1024).await;

    let callers = (0..4).map(|caller| {
        let store = store.clone();
        tokio::spawn(async move {
            let mut ids = Vec::new();
            for seq in 0..8 {
                let url = format!("http://app.test/api/callers/{}", caller);
                let item = NewPendingItem::new(HttpMethod::Post, url)
                    .with_body(RequestBody::Json(json!({ "seq": seq })));
                ids.push(store.enqueue(item).await.unwrap());
            }
            ids
        })
    });
    let per_caller: Vec<Vec<i64>> = join_all(callers).await.into_iter().map(|r| r.unwrap()).collect();

    let items = store.list_pending().await.unwrap();
    assert_eq!(items.len(), 32);
    assert!(items.windows(2).all(|w| w[0].id < w[1].id));

    let listed: BTreeSet<i64> = items.iter().map(|i| i.id).collect();
    let returned: BTreeSet<i64> = per_caller.iter().flatten().copied().collect();
    assert_eq!(listed, returned);

    for (caller, ids) in per_caller.iter().enumerate() {
        let url = format!("http://app.test/api/callers/{}", caller);
        let seen: Vec<i64> = items.iter().filter(|i| i.url == url).map(|i| i.id).collect();
        assert_eq!(&seen, ids);

        let seqs: Vec<u64> = items
            .iter()
            .filter(|i| i.url == url)
            .filter_map(|i| match &i.body {
                Some(StoredBody::Json(value)) => value["seq"].as_u64(),
                _ => None,
            })
            .collect();
        assert_eq!(seqs, (0..8).collect::<Vec<u64>>());
    }
}
