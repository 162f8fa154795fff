use async_trait::async_trait;

use revtrail_core::{Attribution, Delta, EntityRef, HistoryRecord, QueryOptions};

use crate::errors::Result;
use crate::fence::CommitFence;

/// Storage for the append-only history log.
///
/// A `HistoryStore` keeps, per entity reference, a gapless sequence of
/// [`HistoryRecord`]s numbered from 0. Records are written once and never
/// updated or deleted.
///
/// ## Version Assignment
///
/// `insert_next` is a compare-and-swap: the caller states which version it
/// believes is the latest, and the write only lands if that is still true.
/// Two writers racing on the same entity therefore cannot both claim the
/// same version; the loser gets `Conflict` and may re-read and retry (see
/// [`crate::append`]).
///
/// ## Abandoned Writes
///
/// `insert_next_fenced` must commit only through
/// [`CommitFence::commit`]. A caller that stops waiting aborts the fence, and
/// a write that has not committed by then must leave no record behind, even
/// when it keeps running after its future is dropped.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so a single store can be
/// shared across tasks behind an `Arc`.
#[async_trait]
pub trait HistoryStore: Send + Sync + 'static {
    /// Highest stored version for `entity`, or `None` when it has no history.
    async fn latest_version(&self, entity: &EntityRef) -> Result<Option<u64>>;

    /// Append a record at `expected_latest + 1` (or 0 when `None`),
    /// committing through `fence`.
    ///
    /// Returns `Err(Conflict)` if the latest stored version is not
    /// `expected_latest`, and the fence's abort kind if it was aborted
    /// before the commit.
    async fn insert_next_fenced(
        &self,
        entity: &EntityRef,
        expected_latest: Option<u64>,
        diff: Delta,
        attribution: &Attribution,
        fence: &CommitFence,
    ) -> Result<HistoryRecord>;

    /// [`insert_next_fenced`](Self::insert_next_fenced) with a fence nobody
    /// aborts.
    async fn insert_next(
        &self,
        entity: &EntityRef,
        expected_latest: Option<u64>,
        diff: Delta,
        attribution: &Attribution,
    ) -> Result<HistoryRecord> {
        let fence = CommitFence::new();
        self.insert_next_fenced(entity, expected_latest, diff, attribution, &fence)
            .await
    }

    /// Records with `version >= min_version`, newest first.
    async fn records_descending(
        &self,
        entity: &EntityRef,
        min_version: u64,
    ) -> Result<Vec<HistoryRecord>>;

    /// All records for `entity`, ordered and paginated by `options`.
    async fn records_all(
        &self,
        entity: &EntityRef,
        options: &QueryOptions,
    ) -> Result<Vec<HistoryRecord>>;
}
