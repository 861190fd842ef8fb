//! Top-level entry subscription with per-snapshot nested note reads.

use super::types::{Subscription, SubscriptionInner, SyncStatus, ViewSender, ViewState};
use crate::context::EngineContext;
use crate::error::{EngineError, RemoteError, RemoteResult, Result};
use crate::remote::{Document, DocumentStore, SnapshotEvent};
use crate::types::{CollectionPath, Entry, Identity, Note};
use crate::view::ViewAssembler;
use futures::future::try_join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Owns the live entry subscription and the view it feeds.
///
/// For every top-level snapshot, each entry's notes are read once (not
/// listened to). A note added after the last top-level snapshot therefore
/// stays invisible until some entry-level change produces a new snapshot.
pub struct SubscriptionCoordinator {
    context: EngineContext,
    view: ViewSender,
    /// The most recently installed subscription.
    installed: Mutex<Option<Arc<SubscriptionInner>>>,
}

impl SubscriptionCoordinator {
    pub fn new(context: EngineContext) -> Self {
        let (sender, _) = watch::channel(ViewState::default());
        Self {
            context,
            view: Arc::new(sender),
            installed: Mutex::new(None),
        }
    }

    /// Receiver of every published view.
    pub fn view(&self) -> watch::Receiver<ViewState> {
        self.view.subscribe()
    }

    /// The view as last published.
    pub fn current_view(&self) -> ViewState {
        self.view.borrow().clone()
    }

    /// Open the live subscription on `identity`'s entries.
    ///
    /// Any previously installed subscription is cancelled first. The view is
    /// reset to an empty `Loading` state for `identity`. Must be called from
    /// within a Tokio runtime.
    pub async fn subscribe(&self, identity: &Identity) -> Result<Subscription> {
        self.cancel_installed();

        let path = self.context.entries_path(identity);
        let listener = match self
            .context
            .documents
            .listen(&path, self.context.config.snapshot_buffer)
            .await
        {
            Ok(listener) => listener,
            Err(e) => {
                warn!(identity = %identity, error = %e, "listen failed");
                let err = EngineError::Subscription(e);
                let failed = err.clone();
                let identity = identity.clone();
                self.view.send_modify(move |state| {
                    *state = ViewState {
                        identity: Some(identity),
                        entries: Arc::new(Vec::new()),
                        status: SyncStatus::Failed(failed),
                        revision: state.revision + 1,
                    };
                });
                return Err(err);
            }
        };

        let inner = Arc::new(SubscriptionInner::new(
            identity.clone(),
            path,
            listener.id,
            self.context.documents.clone(),
            self.view.clone(),
        ));

        // A concurrent subscribe may have installed in the meantime.
        let previous = self.installed.lock().replace(inner.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let reset_identity = identity.clone();
        inner.publish(move |state| {
            state.identity = Some(reset_identity);
            state.entries = Arc::new(Vec::new());
            state.status = SyncStatus::Loading;
        });

        info!(identity = %identity, path = %inner.path, "subscribed");

        let pump = Pump {
            context: self.context.clone(),
            inner: inner.clone(),
        };
        tokio::spawn(pump.run(listener.receiver));

        Ok(Subscription { inner })
    }

    /// Cancel the installed subscription and publish an empty `Idle` view.
    pub fn clear(&self) {
        self.cancel_installed();
        self.view.send_modify(|state| {
            *state = ViewState {
                revision: state.revision + 1,
                ..ViewState::default()
            };
        });
    }

    fn cancel_installed(&self) {
        let previous = self.installed.lock().take();
        if let Some(previous) = previous {
            previous.cancel();
        }
    }
}

impl Drop for SubscriptionCoordinator {
    fn drop(&mut self) {
        self.cancel_installed();
    }
}

/// Drives one subscription: receives snapshots, runs batches, publishes.
struct Pump {
    context: EngineContext,
    inner: Arc<SubscriptionInner>,
}

/// What to do after a listener event.
enum Step {
    Batch(Vec<Document>),
    Stop,
}

impl Pump {
    async fn run(self, mut receiver: mpsc::Receiver<SnapshotEvent>) {
        let token = self.inner.token.clone();
        let mut pending: Option<Vec<Document>> = None;

        loop {
            let docs = match pending.take() {
                Some(docs) => docs,
                None => {
                    let event = tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        event = receiver.recv() => event,
                    };
                    match self.on_event(event) {
                        Step::Batch(docs) => docs,
                        Step::Stop => break,
                    }
                }
            };

            debug!(identity = %self.inner.identity, entries = docs.len(), "snapshot received");

            // Child of the subscription token: cancelling the handle or
            // superseding the batch stops every nested read in it.
            let batch_token = token.child_token();
            let batch = fetch_batch(
                &self.context,
                &self.inner.identity,
                docs,
                batch_token.clone(),
            );
            tokio::pin!(batch);

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(identity = %self.inner.identity, "in-flight batch discarded");
                    break;
                }
                event = receiver.recv() => {
                    batch_token.cancel();
                    debug!(identity = %self.inner.identity, "batch superseded by newer snapshot");
                    match self.on_event(event) {
                        Step::Batch(docs) => pending = Some(docs),
                        Step::Stop => break,
                    }
                }
                result = &mut batch => self.publish_batch(result),
            }
        }

        self.inner.mark_stopped();
        debug!(identity = %self.inner.identity, "subscription pump stopped");
    }

    fn on_event(&self, event: Option<SnapshotEvent>) -> Step {
        match event {
            Some(Ok(docs)) => Step::Batch(docs),
            Some(Err(e)) => {
                warn!(identity = %self.inner.identity, error = %e, "listener failed");
                // Stopped before the failure is visible in the view.
                self.inner.mark_stopped();
                self.publish_failure(e);
                Step::Stop
            }
            None => {
                self.inner.mark_stopped();
                if !self.inner.token.is_cancelled() {
                    warn!(identity = %self.inner.identity, "listener closed by store");
                    self.publish_failure(RemoteError::Unavailable("listener closed".into()));
                }
                Step::Stop
            }
        }
    }

    fn publish_batch(&self, result: RemoteResult<Vec<(Entry, Vec<Note>)>>) {
        match result {
            Ok(batch) => {
                let entries = Arc::new(ViewAssembler::assemble(batch));
                let count = entries.len();
                if self.inner.publish(move |state| {
                    state.entries = entries;
                    state.status = SyncStatus::Live;
                }) {
                    debug!(identity = %self.inner.identity, entries = count, "view published");
                }
            }
            Err(e) => {
                warn!(identity = %self.inner.identity, error = %e, "nested read failed, batch dropped");
                self.publish_failure(e);
            }
        }
    }

    /// Mark the view failed, keeping the last published entries.
    fn publish_failure(&self, error: RemoteError) {
        self.inner.publish(move |state| {
            state.status = SyncStatus::Failed(EngineError::Subscription(error));
        });
    }
}

/// Read every entry's notes concurrently. One failure fails the batch.
async fn fetch_batch(
    context: &EngineContext,
    identity: &Identity,
    docs: Vec<Document>,
    token: CancellationToken,
) -> RemoteResult<Vec<(Entry, Vec<Note>)>> {
    let entries = docs
        .iter()
        .map(Entry::from_document)
        .collect::<RemoteResult<Vec<_>>>()?;

    let reads = entries.into_iter().map(|entry| {
        let documents = context.documents.clone();
        let path = context.notes_path(identity, &entry.id);
        let token = token.clone();
        async move {
            let notes = read_notes(documents.as_ref(), &path, &token).await?;
            Ok((entry, notes))
        }
    });

    let result = try_join_all(reads).await;
    if result.is_err() {
        token.cancel();
    }
    result
}

/// One point-in-time read of a note collection.
async fn read_notes(
    documents: &dyn DocumentStore,
    path: &CollectionPath,
    token: &CancellationToken,
) -> RemoteResult<Vec<Note>> {
    let docs = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(RemoteError::Cancelled),
        docs = documents.get_collection(path) => docs?,
    };
    docs.iter().map(Note::from_document).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::context::MemoryBackends;
    use crate::remote::memory::RemoteOp;
    use crate::types::EntryId;
    use serde_json::json;
    use std::time::Duration;

    fn setup() -> (SubscriptionCoordinator, EngineContext, MemoryBackends) {
        let (context, backends) = EngineContext::in_memory(EngineConfig::default());
        (SubscriptionCoordinator::new(context.clone()), context, backends)
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

    #[tokio::test]
    async fn test_subscribe_publishes_entries_with_notes() {
        let (coordinator, context, backends) = setup();
        let who = Identity::new("u1");
        let entries = context.entries_path(&who);
        backends.documents.seed(
            &entries,
            "e1",
            json!({"title": "A", "assetUrl": "memory://a", "createdAt": 10}),
        );
        backends.documents.seed(
            &context.notes_path(&who, &EntryId("e1".into())),
            "n1",
            json!({"text": "hi", "createdAt": 11}),
        );

        let mut rx = coordinator.view();
        let _sub = coordinator.subscribe(&who).await.unwrap();
        let state = wait_for(&mut rx, |s| s.is_live()).await;

        assert_eq!(state.identity, Some(who));
        assert_eq!(state.entries.len(), 1);
        assert_eq!(state.entries[0].notes[0].text, "hi");
    }

    #[tokio::test]
    async fn test_resubscribe_cancels_previous() {
        let (coordinator, _context, backends) = setup();

        let first = coordinator.subscribe(&Identity::new("u1")).await.unwrap();
        assert_eq!(backends.documents.listener_count(), 1);

        let second = coordinator.subscribe(&Identity::new("u2")).await.unwrap();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(backends.documents.listener_count(), 1);

        // Already cancelled by the coordinator.
        assert!(!first.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_subscribes_leave_one_installed() {
        let (coordinator, _context, backends) = setup();
        backends
            .documents
            .faults()
            .set_latency(RemoteOp::Listen, Duration::from_secs(1));

        let (u1, u2) = (Identity::new("u1"), Identity::new("u2"));
        let (a, b) = tokio::join!(coordinator.subscribe(&u1), coordinator.subscribe(&u2));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.is_cancelled(), b.is_cancelled());
        assert_eq!(backends.documents.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_listener_failure_stops_subscription() {
        let (coordinator, context, backends) = setup();
        let who = Identity::new("u1");
        let mut rx = coordinator.view();
        let sub = coordinator.subscribe(&who).await.unwrap();
        wait_for(&mut rx, |s| s.is_live()).await;
        assert!(sub.is_running());

        backends.documents.break_listeners(
            &context.entries_path(&who),
            RemoteError::Unavailable("net".into()),
        );
        wait_for(&mut rx, |s| s.error().is_some()).await;

        assert!(!sub.is_running());
        assert!(!sub.is_cancelled());
    }

    #[tokio::test]
    async fn test_listen_failure_is_surfaced() {
        let (coordinator, _context, backends) = setup();
        backends.documents.faults().fail_next(RemoteOp::Listen, 1);

        let err = coordinator.subscribe(&Identity::new("u1")).await.unwrap_err();
        assert!(matches!(err, EngineError::Subscription(_)));
        assert!(coordinator.current_view().error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_snapshot_supersedes_in_flight_batch() {
        let (coordinator, context, backends) = setup();
        let who = Identity::new("u1");
        let entries = context.entries_path(&who);
        backends.documents.seed(
            &entries,
            "e1",
            json!({"title": "first", "assetUrl": "memory://a", "createdAt": 1}),
        );
        backends
            .documents
            .faults()
            .set_latency(RemoteOp::GetCollection, Duration::from_secs(5));

        let mut rx = coordinator.view();
        let _sub = coordinator.subscribe(&who).await.unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        backends.documents.seed(
            &entries,
            "e2",
            json!({"title": "second", "assetUrl": "memory://b", "createdAt": 2}),
        );

        let state = wait_for(&mut rx, |s| s.is_live()).await;
        assert_eq!(state.entries.len(), 2);
        assert_eq!(state.entries[0].title, "second");
    }
}
