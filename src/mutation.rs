//! Retry-protected writes: entries, notes and their assets.
//!
//! Every remote call is wrapped individually by the context's
//! [`RetryPolicy`]. Validation failures return before any remote call.
//! Nothing is applied locally: the subscription observes the result of a
//! write like any other change.

use crate::context::EngineContext;
use crate::error::{EngineError, MutationKind, Result, ValidationError};
use crate::remote::DocumentWrite;
use crate::retry::RetryPolicy;
use crate::types::{AssetRef, EntryId, EntryRecord, Identity, NoteId, NoteRecord, CREATED_AT_FIELD};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Performs writes against the document and asset stores.
pub struct MutationGateway {
    context: EngineContext,
    retry: RetryPolicy,
}

impl MutationGateway {
    pub fn new(context: EngineContext) -> Self {
        let retry = context.retry_policy();
        Self { context, retry }
    }

    /// Override the retry policy used for every write.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Upload the asset, then write the entry with a server-assigned
    /// `createdAt`.
    ///
    /// Fails with [`ValidationError::EmptyTitle`] or
    /// [`ValidationError::MissingAsset`] before any remote call. If the
    /// record write fails after the upload succeeded, the uploaded asset is
    /// left in place.
    pub async fn create_entry(
        &self,
        identity: &Identity,
        title: &str,
        body: Option<&str>,
        asset: Option<&[u8]>,
    ) -> Result<EntryId> {
        let title = required_title(title)?;
        let bytes = match asset {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Err(ValidationError::MissingAsset.into()),
        };

        let digest = hex::encode(Sha256::digest(bytes));
        let path = self.context.asset_path(identity, &digest);
        let assets = &self.context.assets;

        let handle = self
            .retry
            .execute_as("upload_asset", || assets.upload(&path, bytes))
            .await
            .map_err(EngineError::mutation(MutationKind::UploadAsset))?;
        let asset_ref = self
            .retry
            .execute_as("asset_public_ref", || assets.public_ref(&handle))
            .await
            .map_err(EngineError::mutation(MutationKind::UploadAsset))?;

        let record = EntryRecord {
            title,
            body: optional_body(body),
            asset_url: asset_ref.0,
            created_at: None,
        };
        let data = serde_json::to_value(&record).map_err(|e| EngineError::Mutation {
            operation: MutationKind::CreateEntry,
            source: e.into(),
        })?;
        let write = DocumentWrite::new(data).with_server_timestamp(CREATED_AT_FIELD);

        let entries = self.context.entries_path(identity);
        let documents = &self.context.documents;
        let id = self
            .retry
            .execute_as("create_entry", || documents.create(&entries, write.clone()))
            .await
            .map_err(|e| {
                warn!(identity = %identity, error = %e, "entry create failed after upload");
                EngineError::mutation(MutationKind::CreateEntry)(e)
            })?;

        info!(identity = %identity, entry = %id, "entry created");
        Ok(EntryId(id))
    }

    /// Replace the title and body of an entry. A `None` or blank body
    /// removes it.
    pub async fn update_entry(
        &self,
        identity: &Identity,
        id: &EntryId,
        title: &str,
        body: Option<&str>,
    ) -> Result<()> {
        let title = required_title(title)?;
        let fields = json!({
            "title": title,
            "body": optional_body(body),
        });

        let entries = self.context.entries_path(identity);
        let documents = &self.context.documents;
        self.retry
            .execute_as("update_entry", || {
                documents.update(&entries, &id.0, fields.clone())
            })
            .await
            .map_err(EngineError::mutation(MutationKind::UpdateEntry))?;

        info!(identity = %identity, entry = %id, "entry updated");
        Ok(())
    }

    /// Delete the entry's asset, then the entry.
    ///
    /// If the asset delete exhausts its retries the entry is left untouched.
    /// There is no rollback when the asset delete succeeds and the entry
    /// delete does not.
    pub async fn delete_entry(
        &self,
        identity: &Identity,
        id: &EntryId,
        asset: &AssetRef,
    ) -> Result<()> {
        let assets = &self.context.assets;
        self.retry
            .execute_as("delete_asset", || assets.delete(asset))
            .await
            .map_err(|e| {
                warn!(identity = %identity, entry = %id, error = %e, "asset delete failed, entry kept");
                EngineError::mutation(MutationKind::DeleteAsset)(e)
            })?;

        let entries = self.context.entries_path(identity);
        let documents = &self.context.documents;
        self.retry
            .execute_as("delete_entry", || documents.delete(&entries, &id.0))
            .await
            .map_err(|e| {
                warn!(identity = %identity, entry = %id, error = %e, "entry delete failed, asset already gone");
                EngineError::mutation(MutationKind::DeleteEntry)(e)
            })?;

        info!(identity = %identity, entry = %id, "entry deleted");
        Ok(())
    }

    /// Append a note to an entry.
    ///
    /// Blank text is ignored and returns `Ok(None)` without a remote call.
    /// The note does not trigger a new entry snapshot, so it shows up in the
    /// view only after the next entry-level change.
    pub async fn add_note(
        &self,
        identity: &Identity,
        entry: &EntryId,
        text: &str,
    ) -> Result<Option<NoteId>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let record = NoteRecord {
            text: text.to_string(),
            created_at: None,
        };
        let data = serde_json::to_value(&record).map_err(|e| EngineError::Mutation {
            operation: MutationKind::AddNote,
            source: e.into(),
        })?;
        let write = DocumentWrite::new(data).with_server_timestamp(CREATED_AT_FIELD);

        let notes = self.context.notes_path(identity, entry);
        let documents = &self.context.documents;
        let id = self
            .retry
            .execute_as("add_note", || documents.create(&notes, write.clone()))
            .await
            .map_err(EngineError::mutation(MutationKind::AddNote))?;

        info!(identity = %identity, entry = %entry, note = %id, "note added");
        Ok(Some(NoteId(id)))
    }
}

fn required_title(title: &str) -> std::result::Result<String, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(title.to_string())
}

fn optional_body(body: Option<&str>) -> Option<String> {
    body.map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
}
