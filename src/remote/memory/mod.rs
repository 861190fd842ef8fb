//! In-process collaborators.
//!
//! These back the test suite and local embedding. Each store carries a
//! [`FaultPlan`] that can script failures and latency per call kind and
//! records every call in order.

mod assets;
mod auth;
mod documents;
mod faults;

pub use assets::{MemoryAssetStore, MEMORY_REF_PREFIX};
pub use auth::MemoryAuthProvider;
pub use documents::MemoryDocumentStore;
pub use faults::{Call, FaultPlan, RemoteOp};
