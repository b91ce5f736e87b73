//! Sync passes: fetch a subtree, detect changes, enrich stale documents in a
//! bounded worker pool, and store the records.

mod cancel;
mod status;
mod sync;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use status::{SyncHandle, SyncRegistry, SyncState, SyncStatus};
pub use sync::{FailedDocument, SyncOptions, SyncPass, SyncReport};
