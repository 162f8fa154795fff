//! Reverse reconstruction of past versions.

use serde_json::Value;

use revtrail_core::errors::{ExError, HistoryError};
use revtrail_core::{unpatch, EntityRef};
use revtrail_store::HistoryStore;

/// Rebuild `entity` as it was before the mutation logged at `target_version`
///
/// Starts from `current` (or `{}` when the live record is gone) and reverses
/// every record with `version >= target_version`, newest first. A target
/// beyond the latest version returns the starting snapshot unchanged.
///
/// # Errors
///
/// `InvalidArgument` for a negative target or a record whose diff does not
/// fit the snapshot; store errors pass through.
pub async fn reconstruct<S>(
    store: &S,
    entity: &EntityRef,
    current: Option<Value>,
    target_version: i64,
) -> Result<Value, ExError>
where
    S: HistoryStore + ?Sized,
{
    let min_version = u64::try_from(target_version).map_err(|_| {
        ExError::from(HistoryError::InvalidVersion {
            input: target_version.to_string(),
        })
    })?;

    let records = store.records_descending(entity, min_version).await?;
    let mut state = current.unwrap_or_else(|| Value::Object(Default::default()));

    for record in &records {
        unpatch(&mut state, &record.diff).map_err(|e| {
            ExError::from(e)
                .with_entity(entity.collection_name(), entity.collection_id())
                .with_version(record.version)
        })?;
    }

    tracing::debug!(
        collection_name = entity.collection_name(),
        collection_id = entity.collection_id(),
        version = min_version,
        record_count = records.len(),
        "Reconstructed version"
    );
    Ok(state)
}

/// Parse a caller-supplied version string
///
/// # Errors
///
/// `InvalidArgument` when `input` is not a base-10 integer.
pub fn parse_version(input: &str) -> Result<i64, ExError> {
    input.trim().parse::<i64>().map_err(|_| {
        ExError::from(HistoryError::InvalidVersion {
            input: input.to_string(),
        })
    })
}
