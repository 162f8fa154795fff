use crate::errors::{checksum_mismatch, from_rusqlite, migration_error, Result};
use crate::migrations::embedded::{Migration, MIGRATIONS};
use rusqlite::{Connection, OptionalExtension};

/// Apply all pending migrations to the database
///
/// Already-applied migrations are skipped after their checksum is verified
/// against the embedded SQL.
///
/// # Errors
///
/// `Persistence` when a migration fails or an applied migration's checksum
/// no longer matches.
pub fn apply_migrations(conn: &mut Connection) -> Result<()> {
    create_schema_version_table(conn)?;

    for migration in MIGRATIONS {
        apply_migration(conn, migration)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist
fn create_schema_version_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY,
            migration_id TEXT NOT NULL UNIQUE,
            applied_at INTEGER NOT NULL,
            checksum TEXT
        )",
        [],
    )
    .map_err(from_rusqlite)?;

    Ok(())
}

/// Apply a single migration if not already applied
fn apply_migration(conn: &mut Connection, migration: &Migration) -> Result<()> {
    let migration_id = migration.id;
    let checksum = migration.checksum();

    let applied: Option<Option<String>> = conn
        .query_row(
            "SELECT checksum FROM schema_version WHERE migration_id = ?",
            [migration_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(from_rusqlite)?;

    if let Some(recorded) = applied {
        return match recorded {
            Some(recorded) if recorded != checksum => {
                Err(checksum_mismatch(migration_id, &recorded, &checksum))
            }
            _ => Ok(()),
        };
    }

    let tx = conn.transaction().map_err(from_rusqlite)?;

    tx.execute_batch(migration.sql)
        .map_err(|e| migration_error(migration_id, &e.to_string()))?;

    let now = chrono::Utc::now().timestamp();
    tx.execute(
        "INSERT INTO schema_version (migration_id, applied_at, checksum) VALUES (?, ?, ?)",
        rusqlite::params![migration_id, now, checksum],
    )
    .map_err(from_rusqlite)?;

    tx.commit().map_err(from_rusqlite)?;

    tracing::debug!(migration_id, "Applied migration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_migrations() {
        let mut conn = Connection::open_in_memory().unwrap();
        let result = apply_migrations(&mut conn);
        assert!(result.is_ok());
    }

    #[test]
    fn test_idempotency() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        let result = apply_migrations(&mut conn);
        assert!(result.is_ok());
    }

    #[test]
    fn test_tampered_checksum_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        conn.execute(
            "UPDATE schema_version SET checksum = 'deadbeef' WHERE migration_id = '001_histories'",
            [],
        )
        .unwrap();

        let err = apply_migrations(&mut conn).unwrap_err();
        assert!(err.message().contains("Checksum mismatch"));
    }
}
