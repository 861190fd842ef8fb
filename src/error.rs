//! Error types for the sync engine and its remote collaborators.

use std::fmt;
use thiserror::Error;

/// Failure reported by a remote collaborator (document store, asset store,
/// auth provider).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for RemoteError {
    fn from(e: serde_json::Error) -> Self {
        RemoteError::InvalidData(e.to_string())
    }
}

/// Caller input that failed a precondition. No remote call is made.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("an asset is required")]
    MissingAsset,

    #[error("no identity is signed in")]
    NotSignedIn,
}

/// Which write exhausted its retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationKind {
    UploadAsset,
    CreateEntry,
    UpdateEntry,
    DeleteAsset,
    DeleteEntry,
    AddNote,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::UploadAsset => "upload_asset",
            MutationKind::CreateEntry => "create_entry",
            MutationKind::UpdateEntry => "update_entry",
            MutationKind::DeleteAsset => "delete_asset",
            MutationKind::DeleteEntry => "delete_entry",
            MutationKind::AddNote => "add_note",
        };
        f.write_str(name)
    }
}

/// Main error type for engine operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Identity bootstrap exhausted its retries. Terminal for the session.
    #[error("Authentication failed: {0}")]
    Auth(#[source] RemoteError),

    /// The top-level listener or a nested read failed.
    #[error("Subscription failed: {0}")]
    Subscription(#[source] RemoteError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A write exhausted its retries. Nothing was applied locally.
    #[error("Mutation {operation} failed: {source}")]
    Mutation {
        operation: MutationKind,
        #[source]
        source: RemoteError,
    },
}

impl EngineError {
    pub(crate) fn mutation(operation: MutationKind) -> impl FnOnce(RemoteError) -> Self {
        move |source| EngineError::Mutation { operation, source }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type for collaborator calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
