//! Subscription coordinator tests: batching, ordering, staleness and
//! cancellation.

use serde_json::json;
use std::time::Duration;
use timeline_sync::remote::memory::RemoteOp;
use timeline_sync::{
    EngineConfig, EngineContext, EngineError, EntryId, Identity, MemoryBackends,
    MutationGateway, RemoteError, SubscriptionCoordinator, SyncStatus, ViewState,
};
use tokio::sync::watch;

struct Harness {
    context: EngineContext,
    backends: MemoryBackends,
    coordinator: SubscriptionCoordinator,
    gateway: MutationGateway,
    who: Identity,
}

fn harness() -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let (context, backends) = EngineContext::in_memory(EngineConfig::default());
    Harness {
        coordinator: SubscriptionCoordinator::new(context.clone()),
        gateway: MutationGateway::new(context.clone()),
        context,
        backends,
        who: Identity::new("u1"),
    }
}

impl Harness {
    fn seed_entry(&self, id: &str, created_at: i64) {
        self.backends.documents.seed(
            &self.context.entries_path(&self.who),
            id,
            json!({
                "title": id.to_uppercase(),
                "assetUrl": format!("memory://{}", id),
                "createdAt": created_at,
            }),
        );
    }

    fn seed_note(&self, entry: &str, id: &str, created_at: i64) {
        self.backends.documents.seed(
            &self.context.notes_path(&self.who, &EntryId(entry.into())),
            id,
            json!({"text": id, "createdAt": created_at}),
        );
    }
}

async fn wait_for<F>(rx: &mut watch::Receiver<ViewState>, mut pred: F) -> ViewState
where
    F: FnMut(&ViewState) -> bool,
{
    loop {
        {
            let state = rx.borrow_and_update();
            if pred(&state) {
                return state.clone();
            }
        }
        rx.changed().await.unwrap();
    }
}

fn entry_ids(state: &ViewState) -> Vec<String> {
    state.entries.iter().map(|e| e.id.0.clone()).collect()
}

// --- Ordering ---

#[tokio::test]
async fn test_view_is_sorted_at_both_levels() {
    let h = harness();
    h.seed_entry("a", 100);
    h.seed_entry("b", 300);
    h.seed_entry("c", 200);
    h.seed_note("a", "n2", 20);
    h.seed_note("a", "n1", 10);
    h.seed_note("a", "n3", 30);

    let mut rx = h.coordinator.view();
    let _sub = h.coordinator.subscribe(&h.who).await.unwrap();
    let state = wait_for(&mut rx, |s| s.is_live()).await;

    assert_eq!(entry_ids(&state), vec!["b", "c", "a"]);
    let notes: Vec<&str> = state.entries[2].notes.iter().map(|n| n.text.as_str()).collect();
    assert_eq!(notes, vec!["n1", "n2", "n3"]);
}

#[tokio::test]
async fn test_entries_written_through_gateway_appear_newest_first() {
    let h = harness();
    let mut rx = h.coordinator.view();
    let _sub = h.coordinator.subscribe(&h.who).await.unwrap();

    for title in ["first", "second", "third"] {
        h.gateway
            .create_entry(&h.who, title, None, Some(title.as_bytes()))
            .await
            .unwrap();
    }

    let state = wait_for(&mut rx, |s| s.is_live() && s.entries.len() == 3).await;
    let titles: Vec<&str> = state.entries.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["third", "second", "first"]);
}

// --- Staleness window ---

#[tokio::test(start_paused = true)]
async fn test_note_is_invisible_until_entry_changes() {
    let h = harness();
    let mut rx = h.coordinator.view();
    let _sub = h.coordinator.subscribe(&h.who).await.unwrap();

    let id = h
        .gateway
        .create_entry(&h.who, "Trip", None, Some(b"img"))
        .await
        .unwrap();
    let before = wait_for(&mut rx, |s| s.is_live() && s.entries.len() == 1).await;
    assert!(before.entries[0].notes.is_empty());

    h.gateway
        .add_note(&h.who, &id, "pack the charger")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    // The note is stored but no entry snapshot was delivered for it.
    let stored = h
        .backends
        .documents
        .documents(&h.context.notes_path(&h.who, &id));
    assert_eq!(stored.len(), 1);
    let unchanged = h.coordinator.current_view();
    assert_eq!(unchanged.revision, before.revision);
    assert!(unchanged.entries[0].notes.is_empty());

    // Any entry-level change re-runs the nested read.
    h.gateway
        .update_entry(&h.who, &id, "Trip (edited)", None)
        .await
        .unwrap();
    let after = wait_for(&mut rx, |s| s.is_live() && s.revision > before.revision).await;
    assert_eq!(after.entries[0].title, "Trip (edited)");
    assert_eq!(after.entries[0].notes.len(), 1);
    assert_eq!(after.entries[0].notes[0].text, "pack the charger");
}

#[tokio::test(start_paused = true)]
async fn test_steady_writes_hold_back_publish_until_quiet() {
    let h = harness();
    h.seed_entry("a", 1);
    let mut rx = h.coordinator.view();
    let _sub = h.coordinator.subscribe(&h.who).await.unwrap();
    let live = wait_for(&mut rx, |s| s.is_live()).await;

    h.backends
        .documents
        .faults()
        .set_latency(RemoteOp::GetCollection, Duration::from_secs(5));

    // A write every second against five-second nested reads: every batch is
    // superseded before it completes.
    for i in 0..10 {
        h.seed_entry(&format!("w{}", i), 10 + i);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.coordinator.current_view().revision, live.revision);
    }

    let settled = wait_for(&mut rx, |s| s.revision > live.revision).await;
    assert!(settled.is_live());
    assert_eq!(settled.revision, live.revision + 1);
    assert_eq!(settled.entries.len(), 11);
    assert_eq!(settled.entries[0].id.0, "w9");
}

// --- Batch failure ---

#[tokio::test]
async fn test_nested_read_failure_fails_whole_batch() {
    let h = harness();
    h.seed_entry("a", 1);
    h.seed_entry("b", 2);

    let mut rx = h.coordinator.view();
    let _sub = h.coordinator.subscribe(&h.who).await.unwrap();
    let live = wait_for(&mut rx, |s| s.is_live()).await;
    assert_eq!(live.entries.len(), 2);

    h.backends
        .documents
        .faults()
        .fail_next(RemoteOp::GetCollection, 1);
    h.seed_entry("c", 3);

    let failed = wait_for(&mut rx, |s| s.error().is_some()).await;
    assert!(matches!(
        failed.status,
        SyncStatus::Failed(EngineError::Subscription(RemoteError::Unavailable(_)))
    ));
    // No partial publish: the previous entries are kept.
    assert_eq!(entry_ids(&failed), vec!["b", "a"]);

    // The listener is still attached; the next snapshot recovers.
    h.seed_entry("d", 4);
    let recovered = wait_for(&mut rx, |s| s.is_live()).await;
    assert_eq!(entry_ids(&recovered), vec!["d", "c", "b", "a"]);
}

#[tokio::test]
async fn test_malformed_entry_fails_batch() {
    let h = harness();
    h.backends.documents.seed(
        &h.context.entries_path(&h.who),
        "broken",
        json!({"title": 42}),
    );

    let mut rx = h.coordinator.view();
    let _sub = h.coordinator.subscribe(&h.who).await.unwrap();
    let failed = wait_for(&mut rx, |s| s.error().is_some()).await;

    assert!(matches!(
        failed.error(),
        Some(EngineError::Subscription(RemoteError::InvalidData(_)))
    ));
    assert!(failed.entries.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_listener_failure_is_not_reestablished() {
    let h = harness();
    h.seed_entry("a", 1);

    let mut rx = h.coordinator.view();
    let _sub = h.coordinator.subscribe(&h.who).await.unwrap();
    wait_for(&mut rx, |s| s.is_live()).await;

    h.backends.documents.break_listeners(
        &h.context.entries_path(&h.who),
        RemoteError::PermissionDenied("rules changed".into()),
    );
    let failed = wait_for(&mut rx, |s| s.error().is_some()).await;
    assert!(matches!(
        failed.error(),
        Some(EngineError::Subscription(RemoteError::PermissionDenied(_)))
    ));

    h.seed_entry("b", 2);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.backends.documents.listener_count(), 0);
    assert_eq!(h.coordinator.current_view().revision, failed.revision);
}

// --- Cancellation ---

#[tokio::test(start_paused = true)]
async fn test_late_nested_result_after_cancel_is_discarded() {
    let h = harness();
    h.seed_entry("a", 1);

    let mut rx = h.coordinator.view();
    let sub = h.coordinator.subscribe(&h.who).await.unwrap();
    let published = wait_for(&mut rx, |s| s.is_live()).await;

    h.backends
        .documents
        .faults()
        .set_latency(RemoteOp::GetCollection, Duration::from_secs(5));
    let reads_before = h.backends.documents.faults().count(RemoteOp::GetCollection);
    h.seed_note("a", "n1", 2);
    h.seed_entry("b", 3);

    // Let the new batch start its nested reads, then cancel mid-flight.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.backends.documents.faults().count(RemoteOp::GetCollection) > reads_before);
    assert!(sub.cancel());
    assert!(!sub.cancel());

    tokio::time::sleep(Duration::from_secs(30)).await;
    let after = h.coordinator.current_view();
    assert_eq!(after.revision, published.revision);
    assert_eq!(entry_ids(&after), vec!["a"]);
    assert!(after.entries[0].notes.is_empty());
    assert_eq!(h.backends.documents.listener_count(), 0);
}

#[tokio::test]
async fn test_dropping_handle_detaches_listener() {
    let h = harness();
    let sub = h.coordinator.subscribe(&h.who).await.unwrap();
    assert_eq!(h.backends.documents.listener_count(), 1);

    drop(sub);
    assert_eq!(h.backends.documents.listener_count(), 0);
}

#[tokio::test]
async fn test_clear_resets_view_to_idle() {
    let h = harness();
    h.seed_entry("a", 1);
    let mut rx = h.coordinator.view();
    let sub = h.coordinator.subscribe(&h.who).await.unwrap();
    wait_for(&mut rx, |s| s.is_live()).await;

    h.coordinator.clear();

    assert!(sub.is_cancelled());
    let state = h.coordinator.current_view();
    assert_eq!(state.status, SyncStatus::Idle);
    assert_eq!(state.identity, None);
    assert!(state.entries.is_empty());
}
