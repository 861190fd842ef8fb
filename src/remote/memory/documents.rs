//! In-process document store with live collection listeners.

use super::faults::{FaultPlan, RemoteOp};
use crate::error::{RemoteError, RemoteResult};
use crate::remote::{Document, DocumentStore, DocumentWrite, Listener, ListenerId, SnapshotEvent};
use crate::types::{CollectionPath, Timestamp};
use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError, Sender};
use tracing::debug;

/// Internal listener state.
struct ListenerSlot {
    path: CollectionPath,
    sender: Sender<SnapshotEvent>,
}

impl ListenerSlot {
    /// Returns false if the receiver is gone or its buffer is full.
    fn try_send(&self, event: SnapshotEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Document store kept entirely in memory.
///
/// Listeners receive the whole collection when attached and after every
/// write to that exact collection. Writes to a sub-collection do not notify
/// listeners of the parent collection.
pub struct MemoryDocumentStore {
    /// Documents by collection path, then by id (delivery order).
    collections: RwLock<HashMap<CollectionPath, BTreeMap<String, serde_json::Value>>>,
    /// Active listeners.
    listeners: RwLock<HashMap<ListenerId, ListenerSlot>>,
    next_listener: AtomicU64,
    next_doc: AtomicU64,
    /// Last server timestamp handed out, for strict monotonicity.
    clock: AtomicI64,
    faults: FaultPlan,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            next_doc: AtomicU64::new(1),
            clock: AtomicI64::new(0),
            faults: FaultPlan::new(),
        }
    }

    /// Scripted failures, latency and the call log.
    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Current documents of a collection, in delivery order.
    pub fn documents(&self, path: &CollectionPath) -> Vec<Document> {
        self.collections
            .read()
            .get(path)
            .map(|docs| to_documents(docs))
            .unwrap_or_default()
    }

    /// Push `error` to every listener on `path` and drop them.
    pub fn break_listeners(&self, path: &CollectionPath, error: RemoteError) {
        let mut listeners = self.listeners.write();
        let broken: Vec<ListenerId> = listeners
            .iter()
            .filter(|(_, slot)| &slot.path == path)
            .map(|(id, _)| *id)
            .collect();
        for id in broken {
            if let Some(slot) = listeners.remove(&id) {
                let _ = slot.try_send(Err(error.clone()));
            }
        }
    }

    /// Write a document with a caller-chosen id, bypassing faults and the
    /// call log. Listeners are notified as for any other write.
    pub fn seed(&self, path: &CollectionPath, id: &str, data: serde_json::Value) {
        self.collections
            .write()
            .entry(path.clone())
            .or_default()
            .insert(id.to_string(), data);
        self.notify(path);
    }

    fn server_timestamp(&self) -> Timestamp {
        let now = Timestamp::now().0;
        let mut last = self.clock.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .clock
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Timestamp(next),
                Err(current) => last = current,
            }
        }
    }

    /// Ids are hashes of a counter so delivery order is unrelated to
    /// creation order.
    fn allocate_id(&self) -> String {
        let n = self.next_doc.fetch_add(1, Ordering::SeqCst);
        let digest = Sha256::digest(n.to_le_bytes());
        hex::encode(&digest[..10])
    }

    /// Broadcast the collection at `path`. Drops listeners that fail to receive.
    fn notify(&self, path: &CollectionPath) {
        let snapshot = self.documents(path);
        let mut to_remove = Vec::new();

        {
            let listeners = self.listeners.read();
            for (id, slot) in listeners.iter() {
                if &slot.path == path && !slot.try_send(Ok(snapshot.clone())) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut listeners = self.listeners.write();
            for id in to_remove {
                debug!(listener = id.0, path = %path, "dropping slow listener");
                listeners.remove(&id);
            }
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn to_documents(docs: &BTreeMap<String, serde_json::Value>) -> Vec<Document> {
    docs.iter()
        .map(|(id, data)| Document {
            id: id.clone(),
            data: data.clone(),
        })
        .collect()
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn listen(&self, path: &CollectionPath, buffer: usize) -> RemoteResult<Listener> {
        self.faults.enter(RemoteOp::Listen, path.as_str()).await?;

        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let slot = ListenerSlot {
            path: path.clone(),
            sender,
        };

        // Initial delivery happens under the write lock so no write can slip
        // between attach and the first snapshot.
        let mut listeners = self.listeners.write();
        let _ = slot.try_send(Ok(self.documents(path)));
        listeners.insert(id, slot);

        Ok(Listener { id, receiver })
    }

    fn unlisten(&self, id: ListenerId) {
        self.listeners.write().remove(&id);
    }

    async fn get_collection(&self, path: &CollectionPath) -> RemoteResult<Vec<Document>> {
        self.faults.enter(RemoteOp::GetCollection, path.as_str()).await?;
        Ok(self.documents(path))
    }

    async fn create(&self, path: &CollectionPath, write: DocumentWrite) -> RemoteResult<String> {
        self.faults.enter(RemoteOp::Create, path.as_str()).await?;

        let mut data = write.data;
        if let Some(field) = write.server_timestamp {
            let object = data.as_object_mut().ok_or_else(|| {
                RemoteError::InvalidData("server timestamp requires an object".into())
            })?;
            object.insert(field.to_string(), serde_json::to_value(self.server_timestamp())?);
        }

        let id = self.allocate_id();
        self.collections
            .write()
            .entry(path.clone())
            .or_default()
            .insert(id.clone(), data);
        self.notify(path);
        Ok(id)
    }

    async fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: serde_json::Value,
    ) -> RemoteResult<()> {
        self.faults.enter(RemoteOp::Update, path.doc(id)).await?;

        let fields = match fields {
            serde_json::Value::Object(map) => map,
            _ => return Err(RemoteError::InvalidData("update requires an object".into())),
        };

        {
            let mut collections = self.collections.write();
            let doc = collections
                .get_mut(path)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| RemoteError::NotFound(path.doc(id)))?;
            let object = doc
                .as_object_mut()
                .ok_or_else(|| RemoteError::InvalidData(path.doc(id)))?;
            for (key, value) in fields {
                if value.is_null() {
                    object.remove(&key);
                } else {
                    object.insert(key, value);
                }
            }
        }

        self.notify(path);
        Ok(())
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> RemoteResult<()> {
        self.faults.enter(RemoteOp::Delete, path.doc(id)).await?;

        let removed = self
            .collections
            .write()
            .get_mut(path)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            self.notify(path);
        }
        Ok(())
    }
}
