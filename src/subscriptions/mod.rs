//! Live entry subscription feeding the assembled view.
//!
//! One top-level listener per identity delivers the full entry collection
//! after every entry-level change. Each delivery starts a batch:
//! - every entry's notes are read once, concurrently
//! - the batch publishes only when all reads succeed
//! - a newer delivery cancels a batch still in flight
//!
//! Notes are never listened to. Adding a note does not change any entry, so
//! it is not visible until the next entry-level change.
//!
//! # Example
//!
//! ```ignore
//! let coordinator = SubscriptionCoordinator::new(context);
//! let mut view = coordinator.view();
//! let subscription = coordinator.subscribe(&identity).await?;
//!
//! while view.changed().await.is_ok() {
//!     let state = view.borrow_and_update().clone();
//!     match state.status {
//!         SyncStatus::Live => render(&state.entries),
//!         SyncStatus::Failed(e) => show_error(e),
//!         _ => {}
//!     }
//! }
//! ```

mod coordinator;
mod types;

pub use coordinator::SubscriptionCoordinator;
pub use types::{Subscription, SyncStatus, ViewState};
