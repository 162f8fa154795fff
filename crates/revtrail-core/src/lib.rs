//! revtrail Core - diff computation, filtering and projection
//!
//! This crate provides the store-independent parts of the history log:
//! - Structural JSON deltas with array element identity (`delta`)
//! - Field omit/pick policies applied before persistence (`filter`)
//! - Human-readable change summaries (`projection`)
//! - History records, entity references and attribution (`model`)
//! - Options loading (`config`), error and logging facilities

pub mod config;
pub mod delta;
pub mod errors;
pub mod filter;
pub mod logging_facility;
pub mod model;
pub mod projection;

pub use revtrail_core_types::schema;

// Re-export commonly used types
pub use config::{FailurePolicy, HistoryOptions, HistoryPolicy, RequiredField};
pub use delta::{compute, compute_with, patch, unpatch, Delta, ElementIdentity, IdOrIndex};
pub use errors::{ExError, ExErrorKind, HistoryError, Result};
pub use filter::{filter, FieldPolicy, PathPattern};
pub use model::{Attribution, EntityRef, HistoryRecord, Mutation, QueryOptions, SortOrder};
pub use projection::{summarize, summarize_all, ChangeSummary};
