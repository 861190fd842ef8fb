//! In-process asset store.

use super::faults::{FaultPlan, RemoteOp};
use crate::error::{RemoteError, RemoteResult};
use crate::remote::{AssetHandle, AssetStore};
use crate::types::AssetRef;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Scheme of the public references handed out by [`MemoryAssetStore`].
pub const MEMORY_REF_PREFIX: &str = "memory://";

/// Asset bytes kept in memory, keyed by upload path.
#[derive(Default)]
pub struct MemoryAssetStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    faults: FaultPlan,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Bytes stored behind a public reference.
    pub fn get(&self, asset: &AssetRef) -> Option<Vec<u8>> {
        let path = asset.0.strip_prefix(MEMORY_REF_PREFIX)?;
        self.objects.read().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn upload(&self, path: &str, bytes: &[u8]) -> RemoteResult<AssetHandle> {
        self.faults.enter(RemoteOp::Upload, path).await?;
        self.objects.write().insert(path.to_string(), bytes.to_vec());
        Ok(AssetHandle {
            path: path.to_string(),
        })
    }

    async fn public_ref(&self, handle: &AssetHandle) -> RemoteResult<AssetRef> {
        self.faults.enter(RemoteOp::PublicRef, handle.path.as_str()).await?;
        if !self.objects.read().contains_key(&handle.path) {
            return Err(RemoteError::NotFound(handle.path.clone()));
        }
        Ok(AssetRef(format!("{}{}", MEMORY_REF_PREFIX, handle.path)))
    }

    async fn delete(&self, asset: &AssetRef) -> RemoteResult<()> {
        self.faults.enter(RemoteOp::DeleteAsset, asset.0.as_str()).await?;
        let path = asset
            .0
            .strip_prefix(MEMORY_REF_PREFIX)
            .ok_or_else(|| RemoteError::InvalidData(format!("foreign asset ref: {}", asset)))?;
        match self.objects.write().remove(path) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(asset.0.clone())),
        }
    }
}
