// Integration tests for mounting, unmounting and refetching query subscriptions

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use recall::query_key;
use recall::subscription::http::{Query, QueryClient, QueryConfig, QueryError, QueryKey, QueryState};
use recall::subscription::{Subscription, SubscriptionManager};
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};

/// A query whose fetches block until `gate` is notified and count invocations.
fn gated_query(
    key: QueryKey,
    client: &Arc<QueryClient>,
    calls: &Arc<AtomicUsize>,
    gate: &Arc<Notify>,
) -> Query<usize> {
    let calls = calls.clone();
    let gate = gate.clone();
    Query::new(
        key,
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok::<_, QueryError>(n)
            }
            .boxed()
        },
        client.clone(),
    )
}

fn counting_query(
    key: QueryKey,
    client: &Arc<QueryClient>,
    calls: &Arc<AtomicUsize>,
) -> Query<usize> {
    let calls = calls.clone();
    Query::new(
        key,
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok::<_, QueryError>(n) }.boxed()
        },
        client.clone(),
    )
}

#[tokio::test]
async fn test_no_update_after_unmount() {
    let client = Arc::new(QueryClient::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());

    let mut manager = SubscriptionManager::new();
    manager.update(vec![Subscription::new(gated_query(
        query_key!["/api/reports", 1],
        &client,
        &calls,
        &gate,
    ))]);

    let loading = timeout(Duration::from_secs(1), manager.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(loading.is_loading());

    // Unmount while the fetch is still waiting, then let it finish.
    manager.update(Vec::new());
    gate.notify_waiters();
    sleep(Duration::from_millis(50)).await;

    assert_eq!(manager.try_recv(), None);
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test]
async fn test_subscribers_in_separate_owners_share_one_fetch() {
    let client = Arc::new(QueryClient::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());
    let key = query_key!["/api/tags"];

    let mut header = SubscriptionManager::new();
    let mut sidebar = SubscriptionManager::new();
    header.update(vec![Subscription::new(gated_query(key.clone(), &client, &calls, &gate))]);
    sidebar.update(vec![Subscription::new(gated_query(key, &client, &calls, &gate))]);

    // Both emit Loading before the shared fetch is released.
    for manager in [&mut header, &mut sidebar] {
        let loading = timeout(Duration::from_secs(1), manager.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(loading.is_loading());
    }
    sleep(Duration::from_millis(20)).await;
    gate.notify_waiters();

    for manager in [&mut header, &mut sidebar] {
        let settled = timeout(Duration::from_secs(1), manager.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(settled.data(), Some(&1));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalidation_refetches_matching_subscribers_only() {
    let client = Arc::new(QueryClient::new());
    let tag_calls = Arc::new(AtomicUsize::new(0));
    let report_calls = Arc::new(AtomicUsize::new(0));

    let mut manager = SubscriptionManager::new();
    manager.update(vec![
        Subscription::new(counting_query(query_key!["/api/tags"], &client, &tag_calls)),
        Subscription::new(counting_query(query_key!["/api/reports", 1], &client, &report_calls)),
    ]);

    // Loading + success for each.
    for _ in 0..4 {
        timeout(Duration::from_secs(1), manager.recv())
            .await
            .unwrap()
            .unwrap();
    }

    client.invalidate(&query_key!["/api/tags"]);

    let loading = timeout(Duration::from_secs(1), manager.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loading.key, query_key!["/api/tags"]);
    assert_eq!(loading.state, QueryState::Loading { previous: Some(1) });

    let refreshed = timeout(Duration::from_secs(1), manager.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.data(), Some(&2));

    sleep(Duration::from_millis(20)).await;
    assert_eq!(manager.try_recv(), None);
    assert_eq!(tag_calls.load(Ordering::SeqCst), 2);
    assert_eq!(report_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_remount_within_stale_time_uses_cache() {
    let client = Arc::new(QueryClient::with_config(QueryConfig::new(
        Duration::from_secs(60),
        None,
    )));
    let calls = Arc::new(AtomicUsize::new(0));
    let key = query_key!["/api/idea-sets", 2];

    let mut manager = SubscriptionManager::new();
    manager.update(vec![Subscription::new(counting_query(key.clone(), &client, &calls))]);
    for _ in 0..2 {
        timeout(Duration::from_secs(1), manager.recv())
            .await
            .unwrap()
            .unwrap();
    }

    manager.update(Vec::new());
    manager.update(vec![Subscription::new(counting_query(key, &client, &calls))]);

    let cached = timeout(Duration::from_secs(1), manager.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        cached.state,
        QueryState::Success {
            data: 1,
            is_stale: false
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_remount_after_stale_time_refetches_with_previous_data() {
    let client = Arc::new(QueryClient::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let key = query_key!["/api/flashcard-sets", 5];

    let mut manager = SubscriptionManager::new();
    manager.update(vec![Subscription::new(counting_query(key.clone(), &client, &calls))]);
    for _ in 0..2 {
        timeout(Duration::from_secs(1), manager.recv())
            .await
            .unwrap()
            .unwrap();
    }

    manager.update(Vec::new());
    manager.update(vec![Subscription::new(counting_query(key, &client, &calls))]);

    let loading = timeout(Duration::from_secs(1), manager.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loading.state, QueryState::Loading { previous: Some(1) });

    let refreshed = timeout(Duration::from_secs(1), manager.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.data(), Some(&2));
}
