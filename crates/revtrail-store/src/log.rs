//! Appending to the history log

use std::time::Instant;

use revtrail_core::errors::ExErrorKind;
use revtrail_core::{log_op_end, log_op_error, log_op_start};
use revtrail_core::{Attribution, Delta, EntityRef, HistoryRecord};

use crate::errors::Result;
use crate::fence::CommitFence;
use crate::traits::HistoryStore;

/// Append `diff` as the next version of `entity`
///
/// Reads the latest version and writes the next one with a compare-and-swap.
/// A `Conflict` triggers one re-read and retry; a second conflict is
/// returned to the caller.
///
/// # Errors
///
/// `Conflict` after the retry is exhausted, or whatever the store raises.
pub async fn append<S>(
    store: &S,
    entity: &EntityRef,
    diff: Delta,
    attribution: &Attribution,
) -> Result<HistoryRecord>
where
    S: HistoryStore + ?Sized,
{
    append_fenced(store, entity, diff, attribution, &CommitFence::new()).await
}

/// [`append`] committing through `fence`
///
/// Once `fence` is aborted no attempt, first or retry, commits.
///
/// # Errors
///
/// As [`append`], plus the fence's abort kind.
pub async fn append_fenced<S>(
    store: &S,
    entity: &EntityRef,
    diff: Delta,
    attribution: &Attribution,
    fence: &CommitFence,
) -> Result<HistoryRecord>
where
    S: HistoryStore + ?Sized,
{
    let start = Instant::now();
    log_op_start!(
        "append",
        collection_name = entity.collection_name(),
        collection_id = entity.collection_id()
    );

    let result = append_with_retry(store, entity, diff, attribution, fence).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(record) => {
            log_op_end!("append", duration_ms = duration_ms, version = record.version);
        }
        Err(err) => {
            log_op_error!("append", err.clone(), duration_ms = duration_ms);
        }
    }
    result
}

async fn append_with_retry<S>(
    store: &S,
    entity: &EntityRef,
    diff: Delta,
    attribution: &Attribution,
    fence: &CommitFence,
) -> Result<HistoryRecord>
where
    S: HistoryStore + ?Sized,
{
    let expected = store.latest_version(entity).await?;
    match store
        .insert_next_fenced(entity, expected, diff.clone(), attribution, fence)
        .await
    {
        Err(err) if err.kind() == ExErrorKind::Conflict => {
            tracing::debug!(
                collection_name = entity.collection_name(),
                collection_id = entity.collection_id(),
                expected = ?expected,
                "Version conflict on append, retrying once"
            );
            let expected = store.latest_version(entity).await?;
            store
                .insert_next_fenced(entity, expected, diff, attribution, fence)
                .await
        }
        other => other,
    }
}
