//! Versioned copy-on-write state store.
//!
//! - [`Snapshot`]: immutable, shareable view of committed state
//! - [`WorkingView`]: the single mutable view handle owns during a round,
//!   with a savepoint stack and per-transaction change tracking
//! - [`StateStore`]: publishes snapshots, enforces a single working view and
//!   refuses stale commits
//!
//! Snapshots are retained by reference count only. Nothing here knows about
//! transactions beyond "a group of writes that commits or rolls back together".

mod snapshot;
mod store;
mod working_view;

pub use concord_core::StateError;
pub use snapshot::Snapshot;
pub use store::{StateStore, DEFAULT_MAX_UNSIGNED_SNAPSHOTS};
pub use working_view::{Checkpoint, WorkingView};
