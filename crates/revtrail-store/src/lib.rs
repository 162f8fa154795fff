//! revtrail Store - History log persistence
//!
//! Provides:
//! - The `HistoryStore` trait with compare-and-swap version assignment
//! - `append`, which retries a conflicting write once
//! - `CommitFence`, so an abandoned write never commits
//! - A SQLite backend with embedded, checksummed migrations
//! - An in-memory backend for tests and embedded use

pub mod db;
pub mod errors;
pub mod fence;
pub mod log;
pub mod memory;
pub mod migrations;
pub mod sqlite;
pub mod traits;

// Re-export key types
pub use errors::Result;
pub use fence::CommitFence;
pub use log::{append, append_fenced};
pub use memory::MemoryHistoryStore;
pub use sqlite::SqliteHistoryStore;
pub use traits::HistoryStore;
