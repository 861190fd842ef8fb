//! Subscription handle and published view state.

use crate::error::EngineError;
use crate::remote::{DocumentStore, ListenerId};
use crate::types::{CollectionPath, Identity};
use crate::view::EntryView;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Health of the published view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// No identity, nothing subscribed.
    Idle,
    /// Subscribed, first batch not yet published.
    Loading,
    /// The entries reflect the latest completed batch.
    Live,
    /// The last batch or the listener failed. Entries are those of the last
    /// successful batch.
    Failed(EngineError),
}

/// What the presentation layer renders.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewState {
    /// Identity the entries belong to.
    pub identity: Option<Identity>,
    /// Newest entry first, each entry's notes oldest first.
    pub entries: Arc<Vec<EntryView>>,
    pub status: SyncStatus,
    /// Bumped on every publish.
    pub revision: u64,
}

impl ViewState {
    pub fn is_live(&self) -> bool {
        self.status == SyncStatus::Live
    }

    pub fn error(&self) -> Option<&EngineError> {
        match &self.status {
            SyncStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            identity: None,
            entries: Arc::new(Vec::new()),
            status: SyncStatus::Idle,
            revision: 0,
        }
    }
}

/// Publishing side of the view, shared by every subscription of one
/// coordinator.
pub(crate) type ViewSender = Arc<watch::Sender<ViewState>>;

/// Shared state of one top-level subscription.
pub(crate) struct SubscriptionInner {
    pub(crate) identity: Identity,
    pub(crate) path: CollectionPath,
    pub(crate) listener: ListenerId,
    pub(crate) token: CancellationToken,
    pub(crate) documents: Arc<dyn DocumentStore>,
    pub(crate) view: ViewSender,
    cancelled: AtomicBool,
    /// Set once the pump has exited.
    stopped: AtomicBool,
}

impl SubscriptionInner {
    pub(crate) fn new(
        identity: Identity,
        path: CollectionPath,
        listener: ListenerId,
        documents: Arc<dyn DocumentStore>,
        view: ViewSender,
    ) -> Self {
        Self {
            identity,
            path,
            listener,
            token: CancellationToken::new(),
            documents,
            view,
            cancelled: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Detach from the store. Only the first call has an effect.
    ///
    /// The token is cancelled while holding the view lock, so a publish from
    /// this subscription either completed before this call or never happens.
    pub(crate) fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.view.send_if_modified(|_| {
            self.token.cancel();
            false
        });
        self.documents.unlisten(self.listener);
        debug!(identity = %self.identity, path = %self.path, "subscription cancelled");
        true
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Apply `update` to the view unless this subscription was cancelled.
    pub(crate) fn publish(&self, update: impl FnOnce(&mut ViewState)) -> bool {
        self.view.send_if_modified(|state| {
            if self.token.is_cancelled() {
                return false;
            }
            update(state);
            state.revision += 1;
            true
        })
    }
}

/// Handle to the live top-level subscription of one identity.
///
/// Cancelling stops future deliveries. Nested reads already in flight may
/// still complete, but their results are discarded. Dropping the handle
/// cancels it.
pub struct Subscription {
    pub(crate) inner: Arc<SubscriptionInner>,
}

impl Subscription {
    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    pub fn path(&self) -> &CollectionPath {
        &self.inner.path
    }

    /// Cancel the subscription. Returns false if it was already cancelled.
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Still receiving snapshots: not cancelled, and the listener has not
    /// failed or closed.
    pub fn is_running(&self) -> bool {
        !self.inner.is_cancelled() && !self.inner.is_stopped()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("identity", &self.inner.identity)
            .field("path", &self.inner.path)
            .field("cancelled", &self.is_cancelled())
            .field("running", &self.is_running())
            .finish()
    }
}
