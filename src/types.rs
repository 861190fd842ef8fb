//! Core types for the sync engine.

use crate::error::{RemoteError, RemoteResult};
use crate::remote::Document;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Stable token that scopes every storage path of one caller.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(token: impl Into<String>) -> Self {
        Identity(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-assigned identifier of an entry document.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub String);

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-assigned identifier of a note document.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(pub String);

impl fmt::Debug for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoteId({})", self.0)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public reference (URL) of an uploaded asset.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetRef(pub String);

impl fmt::Debug for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetRef({})", self.0)
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Path of a collection in the document store.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(pub String);

impl CollectionPath {
    /// `/namespace/{app_scope}/users/{identity}/entries`
    pub fn entries(app_scope: &str, identity: &Identity) -> Self {
        CollectionPath(format!(
            "/namespace/{}/users/{}/entries",
            app_scope, identity.0
        ))
    }

    /// `/namespace/{app_scope}/users/{identity}/entries/{entry_id}/notes`
    pub fn notes(app_scope: &str, identity: &Identity, entry: &EntryId) -> Self {
        CollectionPath(format!(
            "/namespace/{}/users/{}/entries/{}/notes",
            app_scope, identity.0, entry.0
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of one document inside this collection.
    pub fn doc(&self, id: &str) -> String {
        format!("{}/{}", self.0, id)
    }
}

impl fmt::Debug for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionPath({})", self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted entry document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRecord {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub asset_url: String,
    /// Filled in by the store; absent while a write is pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

/// Persisted note document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

/// Field name the store stamps with its own clock on create.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// An entry as delivered by the top-level subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub title: String,
    pub body: Option<String>,
    pub asset_ref: AssetRef,
    pub created_at: Option<Timestamp>,
}

impl Entry {
    /// Decode an entry from a delivered document.
    pub fn from_document(doc: &Document) -> RemoteResult<Self> {
        let record: EntryRecord = serde_json::from_value(doc.data.clone())
            .map_err(|e| RemoteError::InvalidData(format!("entry {}: {}", doc.id, e)))?;
        Ok(Self {
            id: EntryId(doc.id.clone()),
            title: record.title,
            body: record.body,
            asset_ref: AssetRef(record.asset_url),
            created_at: record.created_at,
        })
    }
}

/// A note as returned by a nested read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub text: String,
    pub created_at: Option<Timestamp>,
}

impl Note {
    /// Decode a note from a delivered document.
    pub fn from_document(doc: &Document) -> RemoteResult<Self> {
        let record: NoteRecord = serde_json::from_value(doc.data.clone())
            .map_err(|e| RemoteError::InvalidData(format!("note {}: {}", doc.id, e)))?;
        Ok(Self {
            id: NoteId(doc.id.clone()),
            text: record.text,
            created_at: record.created_at,
        })
    }
}
