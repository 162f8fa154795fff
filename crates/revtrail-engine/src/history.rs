//! The diff history facade.
//!
//! [`DiffHistory`] binds a store, a compiled policy and an element identity,
//! and exposes every history operation a host needs: recording mutations,
//! reconstructing past versions and listing the log. Each operation is
//! bracketed by one start and one end (or end_error) log event, and runs
//! under the caller's [`CallContext`] deadline and cancellation.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use revtrail_core::errors::ExError;
use revtrail_core::{log_op_end, log_op_error, log_op_start};
use revtrail_core::{
    summarize_all, Attribution, ChangeSummary, ElementIdentity, EntityRef, HistoryOptions,
    HistoryPolicy, HistoryRecord, IdOrIndex, Mutation, QueryOptions,
};
use revtrail_core_types::Sensitive;
use revtrail_store::{CommitFence, HistoryStore};

use crate::context::{guarded, guarded_write, CallContext};
use crate::{reconstruct, recorder};

/// Source of live (current) snapshots, usually the host's primary table
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Current state of `entity`, or `None` when it no longer exists.
    async fn load(&self, entity: &EntityRef) -> Result<Option<Value>, ExError>;
}

/// One mutation in a [`DiffHistory::record_many`] batch
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub entity: EntityRef,
    pub mutation: Mutation,
    pub attribution: Attribution,
}

impl PendingMutation {
    pub fn new(entity: EntityRef, mutation: Mutation, attribution: Attribution) -> Self {
        Self {
            entity,
            mutation,
            attribution,
        }
    }
}

/// Append-only diff history over a [`HistoryStore`]
pub struct DiffHistory<S: HistoryStore> {
    store: Arc<S>,
    policy: HistoryPolicy,
    identity: Arc<dyn ElementIdentity>,
}

impl<S: HistoryStore> Clone for DiffHistory<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy.clone(),
            identity: Arc::clone(&self.identity),
        }
    }
}

impl<S: HistoryStore> std::fmt::Debug for DiffHistory<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffHistory")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<S: HistoryStore> DiffHistory<S> {
    /// History with the default policy: no filtering, nothing required,
    /// fail closed, no deadline
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            policy: HistoryPolicy::default(),
            identity: Arc::new(IdOrIndex),
        }
    }

    /// History configured from raw options
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the options hold a malformed path.
    pub fn from_options(store: Arc<S>, options: &HistoryOptions) -> Result<Self, ExError> {
        let policy = options.compile().map_err(|e| ExError::from(e).with_op("from_options"))?;
        Ok(Self::new(store).with_policy(policy))
    }

    pub fn with_policy(mut self, policy: HistoryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace how array elements are matched when diffing
    pub fn with_identity(mut self, identity: impl ElementIdentity + 'static) -> Self {
        self.identity = Arc::new(identity);
        self
    }

    pub fn policy(&self) -> &HistoryPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Record one host mutation
    ///
    /// Returns the appended record, or `None` when nothing was logged
    /// (create, no-op, filtered away, attribution incomplete, or a store
    /// failure swallowed under `FailOpen`).
    ///
    /// A `Timeout` or `Cancelled` outcome means no record exists: the write
    /// is vetoed before it commits, and a write caught mid-commit is waited
    /// for and reported as recorded.
    ///
    /// # Errors
    ///
    /// Store errors under `FailClosed`; `Cancelled` always.
    pub async fn record_mutation(
        &self,
        entity: &EntityRef,
        mutation: &Mutation,
        attribution: &Attribution,
        ctx: &CallContext,
    ) -> Result<Option<HistoryRecord>, ExError> {
        let user = Sensitive::new(attribution.user.clone());
        log_op_start!(
            "record_mutation",
            request_id = ctx.request.request_id.as_str(),
            collection_name = entity.collection_name(),
            collection_id = entity.collection_id(),
            mutation = mutation.kind(),
            user = %user
        );
        let start = Instant::now();

        let fence = CommitFence::new();
        let outcome = guarded_write(
            "record_mutation",
            ctx,
            self.policy.timeout,
            &fence,
            recorder::record(
                self.store.as_ref(),
                &self.policy,
                self.identity.as_ref(),
                entity,
                mutation,
                attribution,
                &fence,
            ),
        )
        .await;
        let result = recorder::settle(outcome, self.policy.failure_policy);

        let elapsed = start.elapsed().as_millis() as u64;
        match &result {
            Ok(record) => {
                log_op_end!(
                    "record_mutation",
                    duration_ms = elapsed,
                    recorded = record.is_some(),
                    version = ?record.as_ref().map(|r| r.version)
                );
            }
            Err(e) => {
                log_op_error!("record_mutation", e.clone(), duration_ms = elapsed);
            }
        }
        result
    }

    /// Record a batch of mutations
    ///
    /// Items are independent: each gets its own outcome and a failure does
    /// not stop the rest. Outcomes are returned in input order.
    pub async fn record_many(
        &self,
        batch: &[PendingMutation],
        ctx: &CallContext,
    ) -> Vec<Result<Option<HistoryRecord>, ExError>> {
        log_op_start!(
            "record_many",
            request_id = ctx.request.request_id.as_str(),
            record_count = batch.len()
        );
        let start = Instant::now();

        let mut outcomes = Vec::with_capacity(batch.len());
        for item in batch {
            outcomes.push(
                self.record_mutation(&item.entity, &item.mutation, &item.attribution, ctx)
                    .await,
            );
        }

        let failed = outcomes.iter().filter(|o| o.is_err()).count();
        log_op_end!(
            "record_many",
            duration_ms = start.elapsed().as_millis() as u64,
            record_count = batch.len(),
            failed = failed
        );
        outcomes
    }

    // -----------------------------------------------------------------------
    // Reconstruction
    // -----------------------------------------------------------------------

    /// State of `entity` before the mutation logged at `target_version`,
    /// given its current state
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a negative target or a diff that does not fit;
    /// store errors, `Timeout` and `Cancelled` pass through.
    pub async fn reconstruct(
        &self,
        entity: &EntityRef,
        current: Option<Value>,
        target_version: i64,
        ctx: &CallContext,
    ) -> Result<Value, ExError> {
        log_op_start!(
            "reconstruct",
            request_id = ctx.request.request_id.as_str(),
            collection_name = entity.collection_name(),
            collection_id = entity.collection_id(),
            target_version = target_version
        );
        let start = Instant::now();

        let result = guarded(
            "reconstruct",
            ctx,
            self.policy.timeout,
            reconstruct::reconstruct(self.store.as_ref(), entity, current, target_version),
        )
        .await;

        let elapsed = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                log_op_end!("reconstruct", duration_ms = elapsed);
            }
            Err(e) => {
                log_op_error!("reconstruct", e.clone(), duration_ms = elapsed);
            }
        }
        result
    }

    /// Like [`reconstruct`](Self::reconstruct), loading the current state
    /// from `source`
    ///
    /// # Errors
    ///
    /// As `reconstruct`, plus whatever `source` raises.
    pub async fn get_version<L>(
        &self,
        source: &L,
        entity: &EntityRef,
        target_version: i64,
        ctx: &CallContext,
    ) -> Result<Value, ExError>
    where
        L: SnapshotSource + ?Sized,
    {
        log_op_start!(
            "get_version",
            request_id = ctx.request.request_id.as_str(),
            collection_name = entity.collection_name(),
            collection_id = entity.collection_id(),
            target_version = target_version
        );
        let start = Instant::now();

        let result = guarded("get_version", ctx, self.policy.timeout, async {
            let current = source.load(entity).await?;
            reconstruct::reconstruct(self.store.as_ref(), entity, current, target_version).await
        })
        .await;

        let elapsed = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                log_op_end!("get_version", duration_ms = elapsed);
            }
            Err(e) => {
                log_op_error!("get_version", e.clone(), duration_ms = elapsed);
            }
        }
        result
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    /// Raw history records for `entity`
    ///
    /// # Errors
    ///
    /// Store errors, `Timeout` and `Cancelled`.
    pub async fn get_diffs(
        &self,
        entity: &EntityRef,
        options: &QueryOptions,
        ctx: &CallContext,
    ) -> Result<Vec<HistoryRecord>, ExError> {
        log_op_start!(
            "get_diffs",
            request_id = ctx.request.request_id.as_str(),
            collection_name = entity.collection_name(),
            collection_id = entity.collection_id()
        );
        let start = Instant::now();

        let result = guarded(
            "get_diffs",
            ctx,
            self.policy.timeout,
            self.store.records_all(entity, options),
        )
        .await;

        let elapsed = start.elapsed().as_millis() as u64;
        match &result {
            Ok(records) => {
                log_op_end!("get_diffs", duration_ms = elapsed, record_count = records.len());
            }
            Err(e) => {
                log_op_error!("get_diffs", e.clone(), duration_ms = elapsed);
            }
        }
        result
    }

    /// Change summaries for `entity`, oldest first
    ///
    /// Top-level fields named in `expandable` render with their old and new
    /// values.
    ///
    /// # Errors
    ///
    /// Store errors, `Timeout` and `Cancelled`.
    pub async fn get_histories<E>(
        &self,
        entity: &EntityRef,
        expandable: &[E],
        ctx: &CallContext,
    ) -> Result<Vec<ChangeSummary>, ExError>
    where
        E: AsRef<str> + Sync,
    {
        log_op_start!(
            "get_histories",
            request_id = ctx.request.request_id.as_str(),
            collection_name = entity.collection_name(),
            collection_id = entity.collection_id()
        );
        let start = Instant::now();

        let result = guarded(
            "get_histories",
            ctx,
            self.policy.timeout,
            self.store.records_all(entity, &QueryOptions::default()),
        )
        .await
        .map(|records| summarize_all(&records, expandable));

        let elapsed = start.elapsed().as_millis() as u64;
        match &result {
            Ok(summaries) => {
                log_op_end!("get_histories", duration_ms = elapsed, record_count = summaries.len());
            }
            Err(e) => {
                log_op_error!("get_histories", e.clone(), duration_ms = elapsed);
            }
        }
        result
    }
}
