//! SQLite-backed history store
//!
//! Rows live in the `histories` table (see `migrations/001_histories.sql`).
//! Diffs and user values are stored as JSON text; timestamps as unix
//! milliseconds. The `(collection_name, collection_id, version)` unique key
//! backs the compare-and-swap in `insert_next`, which runs inside a
//! `BEGIN IMMEDIATE` transaction so concurrent writers serialize on the
//! database write lock. The commit itself goes through the caller's
//! [`CommitFence`], so a write abandoned while it waited for the lock rolls
//! back instead of landing unseen.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};

use revtrail_core::errors::{ExError, ExErrorKind};
use revtrail_core::{Attribution, Delta, EntityRef, HistoryRecord, QueryOptions, SortOrder};

use crate::db;
use crate::errors::{corrupt_column, from_rusqlite, join_error, version_conflict, Result};
use crate::fence::CommitFence;
use crate::migrations::apply_migrations;
use crate::traits::HistoryStore;

const SELECT_COLUMNS: &str = "collection_name, collection_id, diff_json, user_json, reason, \
                              version, created_at, updated_at";

/// History store on a single SQLite connection
///
/// Calls run on tokio's blocking pool; the connection mutex serializes them
/// within this process, and SQLite's write lock across processes.
#[derive(Clone)]
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryStore {
    /// Open (or create) a history database file and apply migrations
    ///
    /// # Errors
    ///
    /// `Persistence` when the file cannot be opened or migrated.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut conn = db::open(path)?;
        db::configure(&conn)?;
        apply_migrations(&mut conn)?;
        Ok(Self::from_migrated(conn))
    }

    /// Open a private in-memory history database
    ///
    /// # Errors
    ///
    /// `Persistence` when SQLite cannot create or migrate the database.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = db::open_in_memory()?;
        apply_migrations(&mut conn)?;
        Ok(Self::from_migrated(conn))
    }

    fn from_migrated(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Append the next version of `entity` inside a caller's transaction
    ///
    /// For hosts that keep their records in the same SQLite database and
    /// want the history row to commit or roll back with their own write.
    /// The caller should open the transaction with
    /// `TransactionBehavior::Immediate` so the version read and the insert
    /// are not interleaved with another writer.
    ///
    /// # Errors
    ///
    /// `Conflict` if another writer claimed the version, `Persistence` for
    /// other database failures.
    pub fn append_in_tx(
        tx: &Transaction,
        entity: &EntityRef,
        diff: Delta,
        attribution: &Attribution,
    ) -> Result<HistoryRecord> {
        let latest = latest_version_tx(tx, entity)?;
        insert_record_tx(tx, entity, latest, diff, attribution)
    }

    async fn with_conn<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| {
                ExError::new(ExErrorKind::Internal)
                    .with_op(op)
                    .with_message("SQLite connection mutex poisoned")
            })?;
            f(&mut guard)
        })
        .await
        .map_err(|e| join_error(op, e))?
    }
}

impl std::fmt::Debug for SqliteHistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHistoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn latest_version(&self, entity: &EntityRef) -> Result<Option<u64>> {
        let entity = entity.clone();
        self.with_conn("latest_version", move |conn| latest_version_tx(conn, &entity))
            .await
    }

    async fn insert_next_fenced(
        &self,
        entity: &EntityRef,
        expected_latest: Option<u64>,
        diff: Delta,
        attribution: &Attribution,
        fence: &CommitFence,
    ) -> Result<HistoryRecord> {
        let entity = entity.clone();
        let attribution = attribution.clone();
        let fence = fence.clone();
        self.with_conn("insert_next", move |conn| {
            fence.check("insert_next")?;
            // May wait up to the busy timeout for another writer
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(from_rusqlite)?;
            fence.check("insert_next")?;

            let actual = latest_version_tx(&tx, &entity)?;
            if actual != expected_latest {
                return Err(version_conflict(&entity, expected_latest, actual));
            }

            let record = insert_record_tx(&tx, &entity, actual, diff, &attribution)?;
            fence.commit("insert_next", || tx.commit().map_err(from_rusqlite))?;
            Ok(record)
        })
        .await
    }

    async fn records_descending(
        &self,
        entity: &EntityRef,
        min_version: u64,
    ) -> Result<Vec<HistoryRecord>> {
        let entity = entity.clone();
        self.with_conn("records_descending", move |conn| {
            let sql = format!(
                "SELECT {} FROM histories \
                 WHERE collection_name = ?1 AND collection_id = ?2 AND version >= ?3 \
                 ORDER BY version DESC",
                SELECT_COLUMNS
            );
            query_records(
                conn,
                &sql,
                params![
                    entity.collection_name(),
                    entity.collection_id(),
                    to_sql_version(min_version)?
                ],
            )
        })
        .await
    }

    async fn records_all(
        &self,
        entity: &EntityRef,
        options: &QueryOptions,
    ) -> Result<Vec<HistoryRecord>> {
        let entity = entity.clone();
        let options = options.clone();
        self.with_conn("records_all", move |conn| {
            let direction = match options.sort {
                SortOrder::Ascending => "ASC",
                SortOrder::Descending => "DESC",
            };
            let sql = format!(
                "SELECT {} FROM histories \
                 WHERE collection_name = ?1 AND collection_id = ?2 \
                 ORDER BY version {} LIMIT ?3 OFFSET ?4",
                SELECT_COLUMNS, direction
            );
            // SQLite treats a negative LIMIT as unbounded
            let limit = options
                .limit
                .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
                .unwrap_or(-1);
            let offset = i64::try_from(options.skip).unwrap_or(i64::MAX);
            query_records(
                conn,
                &sql,
                params![entity.collection_name(), entity.collection_id(), limit, offset],
            )
        })
        .await
    }
}

fn to_sql_version(version: u64) -> Result<i64> {
    i64::try_from(version).map_err(|_| {
        ExError::new(ExErrorKind::InvalidArgument)
            .with_op("to_sql_version")
            .with_version(version)
            .with_message("version exceeds SQLite integer range")
    })
}

fn latest_version_tx(conn: &Connection, entity: &EntityRef) -> Result<Option<u64>> {
    let latest: Option<i64> = conn
        .query_row(
            "SELECT MAX(version) FROM histories WHERE collection_name = ?1 AND collection_id = ?2",
            params![entity.collection_name(), entity.collection_id()],
            |row| row.get(0),
        )
        .optional()
        .map_err(from_rusqlite)?
        .flatten();

    latest
        .map(|v| u64::try_from(v).map_err(|e| corrupt_column("version", e)))
        .transpose()
}

fn insert_record_tx(
    conn: &Connection,
    entity: &EntityRef,
    latest: Option<u64>,
    diff: Delta,
    attribution: &Attribution,
) -> Result<HistoryRecord> {
    let version = latest.map_or(0, |v| v + 1);
    let record = HistoryRecord::new(entity, version, diff, attribution);

    let diff_json = serde_json::to_string(&record.diff).map_err(|e| {
        ExError::new(ExErrorKind::Serialization)
            .with_op("insert_next")
            .with_message(format!("Failed to serialize diff: {}", e))
    })?;
    let user_json = record
        .user
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| {
            ExError::new(ExErrorKind::Serialization)
                .with_op("insert_next")
                .with_message(format!("Failed to serialize user: {}", e))
        })?;

    let inserted = conn.execute(
        "INSERT INTO histories (
            collection_name, collection_id, diff_json, user_json, reason,
            version, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.collection_name,
            record.collection_id,
            diff_json,
            user_json,
            record.reason,
            to_sql_version(version)?,
            record.created_at.timestamp_millis(),
            record.updated_at.timestamp_millis(),
        ],
    );
    if let Err(err) = inserted {
        let err = from_rusqlite(err);
        return Err(if err.kind() == ExErrorKind::Conflict {
            version_conflict(entity, latest, Some(version))
        } else {
            err
        });
    }

    tracing::debug!(
        collection_name = %record.collection_name,
        collection_id = %record.collection_id,
        version = record.version,
        "Appended history record"
    );

    Ok(record)
}

/// Row as stored, before JSON and timestamp decoding
struct StoredRow {
    collection_name: String,
    collection_id: String,
    diff_json: String,
    user_json: Option<String>,
    reason: Option<String>,
    version: i64,
    created_at: i64,
    updated_at: i64,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            collection_name: row.get(0)?,
            collection_id: row.get(1)?,
            diff_json: row.get(2)?,
            user_json: row.get(3)?,
            reason: row.get(4)?,
            version: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn decode(self) -> Result<HistoryRecord> {
        let diff: Delta =
            serde_json::from_str(&self.diff_json).map_err(|e| corrupt_column("diff_json", e))?;
        let user = self
            .user_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| corrupt_column("user_json", e))?;

        Ok(HistoryRecord {
            collection_name: self.collection_name,
            collection_id: self.collection_id,
            diff,
            user,
            reason: self.reason,
            version: u64::try_from(self.version).map_err(|e| corrupt_column("version", e))?,
            created_at: millis_to_datetime("created_at", self.created_at)?,
            updated_at: millis_to_datetime("updated_at", self.updated_at)?,
        })
    }
}

fn millis_to_datetime(column: &str, millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| corrupt_column(column, format!("timestamp {} out of range", millis)))
}

fn query_records(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<HistoryRecord>> {
    let mut stmt = conn.prepare(sql).map_err(from_rusqlite)?;
    let rows = stmt
        .query_map(params, StoredRow::from_row)
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;

    rows.into_iter().map(StoredRow::decode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity() -> EntityRef {
        EntityRef::new("users", "u1").unwrap()
    }

    fn diff(value: serde_json::Value) -> Delta {
        Delta::from_value(&value).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();
        let attribution = Attribution::new()
            .with_user(json!({"id": 7}))
            .with_reason("birthday");

        let written = store
            .insert_next(&entity(), None, diff(json!({"age": [30, 31]})), &attribution)
            .await
            .unwrap();

        let all = store
            .records_all(&entity(), &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(all, vec![written]);
        assert_eq!(all[0].user, Some(json!({"id": 7})));
    }

    #[tokio::test]
    async fn test_stale_expectation_is_conflict() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();
        store
            .insert_next(&entity(), None, diff(json!({"a": [1]})), &Attribution::new())
            .await
            .unwrap();

        let err = store
            .insert_next(&entity(), None, diff(json!({"b": [1]})), &Attribution::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Conflict);
        assert_eq!(err.version(), Some(0));
    }

    #[tokio::test]
    async fn test_write_abandoned_while_locked_rolls_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("history.db");
        let store = SqliteHistoryStore::open(&path).unwrap();

        let blocker = Connection::open(&path).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

        let fence = CommitFence::new();
        let pending = {
            let store = store.clone();
            let fence = fence.clone();
            tokio::spawn(async move {
                let change = diff(json!({"a": [1, 2]}));
                store
                    .insert_next_fenced(&entity(), None, change, &Attribution::new(), &fence)
                    .await
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(fence.abort(ExErrorKind::Timeout));
        blocker.execute_batch("COMMIT").unwrap();

        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Timeout);
        assert!(!fence.is_committed());
        assert_eq!(store.latest_version(&entity()).await.unwrap(), None);
    }

    #[test]
    fn test_append_in_host_transaction_rolls_back() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();

        {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .unwrap();
            let record = SqliteHistoryStore::append_in_tx(
                &tx,
                &entity(),
                diff(json!({"a": [1, 2]})),
                &Attribution::new(),
            )
            .unwrap();
            assert_eq!(record.version, 0);
            // dropped without commit
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM histories", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let tx = conn.transaction().unwrap();
        SqliteHistoryStore::append_in_tx(&tx, &entity(), diff(json!({"a": [1, 2]})), &Attribution::new())
            .unwrap();
        let second = SqliteHistoryStore::append_in_tx(
            &tx,
            &entity(),
            diff(json!({"a": [2, 3]})),
            &Attribution::new(),
        )
        .unwrap();
        tx.commit().unwrap();
        assert_eq!(second.version, 1);
    }

    #[test]
    fn test_corrupt_diff_column_is_serialization_error() {
        let row = StoredRow {
            collection_name: "users".to_string(),
            collection_id: "u1".to_string(),
            diff_json: r#"{"bio": ["@@ -1 +1 @@", 0, 2]}"#.to_string(),
            user_json: None,
            reason: None,
            version: 0,
            created_at: 0,
            updated_at: 0,
        };
        let err = row.decode().unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Serialization);
    }
}
