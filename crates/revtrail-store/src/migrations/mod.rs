//! Schema migrations
//!
//! SQL files under `migrations/` are embedded at compile time and applied in
//! order. Each applied migration records a SHA-256 checksum; a later run that
//! finds a different checksum refuses to proceed.

mod embedded;
mod runner;

pub use runner::apply_migrations;
