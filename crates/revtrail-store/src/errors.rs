//! Error handling for revtrail-store
//!
//! Wraps revtrail-core ExError with store-specific helpers

use revtrail_core::errors::{ExError, ExErrorKind};
use revtrail_core::EntityRef;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration")
        .with_message(format!("Migration {} failed: {}", migration_id, reason))
}

/// Create a checksum mismatch error
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration_checksum")
        .with_message(format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ))
}

/// Create a version conflict error for a failed compare-and-swap append
pub fn version_conflict(entity: &EntityRef, expected: Option<u64>, actual: Option<u64>) -> ExError {
    let err = ExError::new(ExErrorKind::Conflict)
        .with_op("insert_next")
        .with_entity(entity.collection_name(), entity.collection_id())
        .with_message(format!(
            "expected latest version {:?}, found {:?}",
            expected, actual
        ));
    match actual {
        Some(version) => err.with_version(version),
        None => err,
    }
}

/// Create a database error from rusqlite::Error
///
/// Unique-constraint violations mean another writer claimed the version
/// first, so they surface as `Conflict` rather than `Persistence`.
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    let kind = match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            ExErrorKind::Conflict
        }
        _ => ExErrorKind::Persistence,
    };
    ExError::new(kind)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Create a serialization error for a stored column that failed to decode
pub fn corrupt_column(column: &str, err: impl std::fmt::Display) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op("decode_row")
        .with_message(format!("Invalid {} in history row: {}", column, err))
}

/// Create an error for a blocking task that panicked or was aborted
pub fn join_error(op: &str, err: tokio::task::JoinError) -> ExError {
    ExError::new(ExErrorKind::Internal)
        .with_op(op.to_string())
        .with_message(format!("Blocking store task failed: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_maps_to_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER UNIQUE); INSERT INTO t VALUES (1);")
            .unwrap();
        let err = conn
            .execute("INSERT INTO t VALUES (1)", [])
            .map_err(from_rusqlite)
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Conflict);
    }

    #[test]
    fn test_version_conflict_context() {
        let entity = EntityRef::new("users", "u1").unwrap();
        let err = version_conflict(&entity, Some(1), Some(2));
        assert_eq!(err.kind(), ExErrorKind::Conflict);
        assert_eq!(err.collection_id(), Some("u1"));
        assert_eq!(err.version(), Some(2));
    }
}
