//! # Timeline Sync
//!
//! A locally consistent, ordered mirror of a remote two-level collection:
//! entries, each owning a list of notes. Writes go through a retry-protected
//! gateway.
//!
//! ## Core Concepts
//!
//! - **Subscription**: one live listener on the caller's entries; every
//!   delivery triggers a one-shot read of each entry's notes
//! - **Batch**: the nested reads of one delivery, published all together or
//!   not at all
//! - **View**: entries newest first, notes oldest first, with a status
//! - **Gateway**: create/update/delete of entries and assets, note appends,
//!   each remote call retried with exponential backoff
//!
//! Notes are read once per entry delivery and never listened to. A note added
//! without any entry-level change stays out of the view until the next
//! entry-level change.
//!
//! ## Example
//!
//! ```ignore
//! use timeline_sync::{EngineConfig, EngineContext, SyncEngine};
//!
//! let (context, _backends) = EngineContext::in_memory(EngineConfig::default());
//! let engine = SyncEngine::new(context);
//! engine.start(None).await?;
//!
//! let id = engine.create_entry("Trip", Some("Day one"), Some(&photo)).await?;
//! engine.add_note(&id, "remember the tickets").await?;
//!
//! let mut view = engine.view();
//! view.changed().await?;
//! for entry in view.borrow().entries.iter() {
//!     println!("{} ({} notes)", entry.title, entry.notes.len());
//! }
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod mutation;
pub mod remote;
pub mod retry;
pub mod session;
pub mod subscriptions;
pub mod types;
pub mod view;

// Re-exports
pub use config::{EngineConfig, RetryConfig};
pub use context::{EngineContext, MemoryBackends};
pub use engine::SyncEngine;
pub use error::{EngineError, MutationKind, RemoteError, RemoteResult, Result, ValidationError};
pub use mutation::MutationGateway;
pub use remote::{
    AssetHandle, AssetStore, AuthProvider, Document, DocumentStore, DocumentWrite, Listener,
    ListenerId, SnapshotEvent,
};
pub use retry::{RetryPolicy, RetryState};
pub use session::IdentitySession;
pub use subscriptions::{Subscription, SubscriptionCoordinator, SyncStatus, ViewState};
pub use types::*;
pub use view::{EntryView, NoteView, ViewAssembler};
