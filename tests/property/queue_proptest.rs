//! Property-based tests for queue ordering

use offline_sync::client::local_db::LocalDatabase;
use offline_sync::client::offline::{NewPendingItem, QueueStore, SqliteQueueStore};
use offline_sync::shared::HttpMethod;
use proptest::prelude::*;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn method() -> impl Strategy<Value = HttpMethod> {
    prop_oneof![
        Just(HttpMethod::Post),
        Just(HttpMethod::Put),
        Just(HttpMethod::Patch),
        Just(HttpMethod::Delete),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_list_pending_preserves_submission_order(
        requests in prop::collection::vec((method(), "[a-z]{1,8}"), 1..20),
        removals in prop::collection::vec(any::<bool>(), 20),
    ) {
        let (expected, remaining) = runtime().block_on(async {
            let db = Arc::new(LocalDatabase::open_in_memory().await.unwrap());
            let store = SqliteQueueStore::new(db, 1024);

            let mut ids = Vec::new();
            for (method, segment) in &requests {
                let url = format!("http://app.test/api/{}", segment);
                ids.push(store.enqueue(NewPendingItem::new(*method, url)).await.unwrap());
            }

            let mut expected = Vec::new();
            for (i, id) in ids.iter().enumerate() {
                if removals[i] {
                    store.remove(*id).await.unwrap();
                } else {
                    expected.push(*id);
                }
            }

            let remaining: Vec<i64> = store.list_pending().await.unwrap().into_iter().map(|item| item.id).collect();
            (expected, remaining)
        });

        prop_assert_eq!(remaining.clone(), expected);
        prop_assert!(remaining.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
