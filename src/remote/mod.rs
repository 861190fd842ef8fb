//! Remote collaborators: document store, asset store and auth provider.
//!
//! The engine only talks to these traits. Each is object safe so the
//! composition root can hold them as `Arc<dyn ...>` inside
//! [`EngineContext`](crate::context::EngineContext).
//!
//! [`memory`] provides in-process implementations with fault injection,
//! used by the test suite.

pub mod memory;

use crate::error::RemoteResult;
use crate::types::{AssetRef, CollectionPath, Identity};
use async_trait::async_trait;
use std::fmt;
use tokio::sync::{mpsc, watch};

/// A document as delivered by the store.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: serde_json::Value,
}

/// Payload of a document create.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentWrite {
    pub data: serde_json::Value,
    /// Field the store fills in with its own clock.
    pub server_timestamp: Option<&'static str>,
}

impl DocumentWrite {
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            data,
            server_timestamp: None,
        }
    }

    pub fn with_server_timestamp(mut self, field: &'static str) -> Self {
        self.server_timestamp = Some(field);
        self
    }
}

/// Identifier of a live collection listener.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Debug for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerId({})", self.0)
    }
}

/// One delivery of a live listener: the full, current collection.
pub type SnapshotEvent = RemoteResult<Vec<Document>>;

/// Live listener on a collection.
///
/// The store sends the current contents on attach and again after each
/// change. A closed channel means the store dropped the listener.
pub struct Listener {
    pub id: ListenerId,
    pub receiver: mpsc::Receiver<SnapshotEvent>,
}

/// Opaque handle of an uploaded asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetHandle {
    pub path: String,
}

/// Hierarchical document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Attach a live listener to a collection.
    async fn listen(&self, path: &CollectionPath, buffer: usize) -> RemoteResult<Listener>;

    /// Detach a listener. Unknown ids are ignored.
    fn unlisten(&self, id: ListenerId);

    /// Point-in-time read of a collection.
    async fn get_collection(&self, path: &CollectionPath) -> RemoteResult<Vec<Document>>;

    /// Create a document, returning its store-assigned id.
    async fn create(&self, path: &CollectionPath, write: DocumentWrite) -> RemoteResult<String>;

    /// Merge `fields` into an existing document.
    async fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: serde_json::Value,
    ) -> RemoteResult<()>;

    async fn delete(&self, path: &CollectionPath, id: &str) -> RemoteResult<()>;
}

/// Binary asset store.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: &[u8]) -> RemoteResult<AssetHandle>;

    async fn public_ref(&self, handle: &AssetHandle) -> RemoteResult<AssetRef>;

    async fn delete(&self, asset: &AssetRef) -> RemoteResult<()>;
}

/// Identity provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_with_token(&self, token: &str) -> RemoteResult<Identity>;

    async fn sign_in_anonymous(&self) -> RemoteResult<Identity>;

    async fn sign_out(&self) -> RemoteResult<()>;

    /// Current identity, updated on every sign-in and sign-out.
    fn identity_changes(&self) -> watch::Receiver<Option<Identity>>;
}
