//! revtrail Engine - the history operations hosts call
//!
//! Ties the pure core (diffing, filtering, summaries) to a
//! [`HistoryStore`](revtrail_store::HistoryStore):
//! - [`DiffHistory`]: record mutations, reconstruct versions, list the log
//! - [`CallContext`]: correlation ids, deadlines and cancellation per call
//! - [`reconstruct()`] / [`parse_version`]: reverse reconstruction helpers

pub mod context;
pub mod history;
pub mod reconstruct;
pub mod recorder;

pub use context::{CallContext, CancelSource, CancelToken};
pub use history::{DiffHistory, PendingMutation, SnapshotSource};
pub use reconstruct::{parse_version, reconstruct};
