//! Shared client context.
//!
//! One `EngineContext` is built by the composition root and cloned into
//! every component. Nothing in the crate holds a process-wide client.

use crate::config::EngineConfig;
use crate::remote::memory::{MemoryAssetStore, MemoryAuthProvider, MemoryDocumentStore};
use crate::remote::{AssetStore, AuthProvider, DocumentStore};
use crate::retry::RetryPolicy;
use crate::types::{CollectionPath, EntryId, Identity};
use std::sync::Arc;

/// Collaborator clients plus configuration.
#[derive(Clone)]
pub struct EngineContext {
    pub config: EngineConfig,
    pub documents: Arc<dyn DocumentStore>,
    pub assets: Arc<dyn AssetStore>,
    pub auth: Arc<dyn AuthProvider>,
}

impl EngineContext {
    pub fn new(
        config: EngineConfig,
        documents: Arc<dyn DocumentStore>,
        assets: Arc<dyn AssetStore>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            config,
            documents,
            assets,
            auth,
        }
    }

    /// Context over fresh in-memory collaborators. The concrete stores are
    /// returned alongside so callers can inspect and script them.
    pub fn in_memory(config: EngineConfig) -> (Self, MemoryBackends) {
        let backends = MemoryBackends {
            documents: Arc::new(MemoryDocumentStore::new()),
            assets: Arc::new(MemoryAssetStore::new()),
            auth: Arc::new(MemoryAuthProvider::new()),
        };
        let context = Self::new(
            config,
            backends.documents.clone(),
            backends.assets.clone(),
            backends.auth.clone(),
        );
        (context, backends)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.retry.policy()
    }

    pub fn entries_path(&self, identity: &Identity) -> CollectionPath {
        CollectionPath::entries(&self.config.app_scope, identity)
    }

    pub fn notes_path(&self, identity: &Identity, entry: &EntryId) -> CollectionPath {
        CollectionPath::notes(&self.config.app_scope, identity, entry)
    }

    /// Upload path of an asset: `{app_scope}/users/{identity}/assets/{sha256}`.
    pub fn asset_path(&self, identity: &Identity, digest_hex: &str) -> String {
        format!(
            "{}/users/{}/assets/{}",
            self.config.app_scope, identity, digest_hex
        )
    }
}

/// Concrete handles behind an in-memory [`EngineContext`].
#[derive(Clone)]
pub struct MemoryBackends {
    pub documents: Arc<MemoryDocumentStore>,
    pub assets: Arc<MemoryAssetStore>,
    pub auth: Arc<MemoryAuthProvider>,
}
