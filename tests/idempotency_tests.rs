use std::sync::Arc;

use notification_relay::idempotency::{InMemoryProcessedStore, ProcessedStore};

/// Test: A marked message id is reported as already processed
#[tokio::test]
async fn test_marked_ids_are_reported_as_processed() {
    let store = InMemoryProcessedStore::new();

    assert!(!store.exists("m1").await.unwrap());

    store.mark_processed("m1").await.unwrap();

    assert!(store.exists("m1").await.unwrap());
    assert!(store.exists("m1").await.unwrap(), "exists must not consume the marker");
}

/// Test: Marking the same id twice is harmless
#[tokio::test]
async fn test_double_mark_is_idempotent() {
    let store = InMemoryProcessedStore::new();

    store.mark_processed("m1").await.unwrap();
    store.mark_processed("m1").await.unwrap();

    assert!(store.exists("m1").await.unwrap());
}

/// Test: Markers are independent per message id
#[tokio::test]
async fn test_distinct_ids_are_independent() {
    let store = InMemoryProcessedStore::new();

    store.mark_processed("m1").await.unwrap();

    assert!(store.exists("m1").await.unwrap());
    assert!(!store.exists("m2").await.unwrap());
}

/// Test: Concurrent checks and marks against one store are safe
#[tokio::test]
async fn test_concurrent_access_is_safe() {
    let store = Arc::new(InMemoryProcessedStore::new());

    let mut handles = vec![];
    for i in 0..10 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let id = format!("m{}", i % 3);
            store.mark_processed(&id).await.unwrap();
            store.exists(&id).await.unwrap()
        }));
    }

    let results: Vec<bool> = futures_util::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert!(results.iter().all(|&seen| seen), "every marked id must be visible");

    for i in 0..3 {
        assert!(store.exists(&format!("m{}", i)).await.unwrap());
    }
}
