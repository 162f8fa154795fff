//! Turning host mutations into history records.

use revtrail_core::errors::{ExError, ExErrorKind};
use revtrail_core::schema::EVENT_SKIPPED;
use revtrail_core::{
    compute_with, filter, Attribution, Delta, ElementIdentity, EntityRef, FailurePolicy,
    HistoryPolicy, HistoryRecord, Mutation,
};
use revtrail_store::{append_fenced, CommitFence, HistoryStore};

/// Diff to persist for `mutation`, after field filtering
///
/// `None` for creates, no-op updates, and diffs the policy filters away.
pub fn prepare(
    mutation: &Mutation,
    policy: &HistoryPolicy,
    identity: &dyn ElementIdentity,
) -> Option<Delta> {
    let (before, after) = mutation.snapshots()?;
    let diff = compute_with(before, &after, identity)?;
    filter(&diff, &policy.fields)
}

/// Record one mutation
///
/// Returns the appended record, or `None` when nothing was written: the
/// attribution lacks a required part, or the filtered diff is empty. The
/// append commits through `fence`.
///
/// # Errors
///
/// Whatever [`append_fenced`] returns, tagged with the entity.
pub async fn record<S>(
    store: &S,
    policy: &HistoryPolicy,
    identity: &dyn ElementIdentity,
    entity: &EntityRef,
    mutation: &Mutation,
    attribution: &Attribution,
    fence: &CommitFence,
) -> Result<Option<HistoryRecord>, ExError>
where
    S: HistoryStore + ?Sized,
{
    if let Some(missing) = policy.missing_required(attribution) {
        tracing::info!(
            component = module_path!(),
            op = "record_mutation",
            event = EVENT_SKIPPED,
            collection_name = entity.collection_name(),
            collection_id = entity.collection_id(),
            missing = missing.as_str(),
            "Attribution incomplete, mutation not logged"
        );
        return Ok(None);
    }

    let Some(diff) = prepare(mutation, policy, identity) else {
        tracing::debug!(
            collection_name = entity.collection_name(),
            collection_id = entity.collection_id(),
            mutation = mutation.kind(),
            "Nothing to log"
        );
        return Ok(None);
    };

    append_fenced(store, entity, diff, attribution, fence)
        .await
        .map(Some)
        .map_err(|e| e.with_entity(entity.collection_name(), entity.collection_id()))
}

/// Apply the failure policy to the outcome of a record call
///
/// Under `FailOpen`, store-side failures are logged and swallowed so the
/// host mutation can proceed. Cancellation, invalid arguments and internal
/// errors always surface.
///
/// # Errors
///
/// The original error when the policy does not swallow it.
pub fn settle(
    outcome: Result<Option<HistoryRecord>, ExError>,
    policy: FailurePolicy,
) -> Result<Option<HistoryRecord>, ExError> {
    match outcome {
        Err(err) if policy == FailurePolicy::FailOpen && swallowable(err.kind()) => {
            tracing::warn!(
                component = module_path!(),
                op = "record_mutation",
                err.kind = ?err.kind(),
                err.code = err.code(),
                err.message = err.message(),
                "History append failed, continuing without a record"
            );
            Ok(None)
        }
        other => other,
    }
}

fn swallowable(kind: ExErrorKind) -> bool {
    matches!(
        kind,
        ExErrorKind::Conflict
            | ExErrorKind::Persistence
            | ExErrorKind::Timeout
            | ExErrorKind::Serialization
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use revtrail_core::{HistoryOptions, IdOrIndex};
    use revtrail_store::MemoryHistoryStore;
    use serde_json::json;

    fn policy(options: serde_json::Value) -> HistoryPolicy {
        HistoryOptions::from_json(options).unwrap().compile().unwrap()
    }

    fn update(before: serde_json::Value, after: serde_json::Value) -> Mutation {
        Mutation::Update { before, after }
    }

    #[test]
    fn test_prepare_create_and_noop() {
        let p = HistoryPolicy::default();
        assert!(prepare(&Mutation::Create, &p, &IdOrIndex).is_none());
        assert!(prepare(&update(json!({"a": 1}), json!({"a": 1})), &p, &IdOrIndex).is_none());
    }

    #[test]
    fn test_prepare_delete_diffs_against_empty() {
        let diff = prepare(
            &Mutation::Delete {
                before: json!({"name": "Ann"}),
            },
            &HistoryPolicy::default(),
            &IdOrIndex,
        )
        .unwrap();
        assert_eq!(diff.to_value(), json!({"name": ["Ann", 0, 0]}));
    }

    #[test]
    fn test_prepare_applies_omit() {
        let p = policy(json!({"omit": "age"}));
        assert!(prepare(&update(json!({"age": 1}), json!({"age": 2})), &p, &IdOrIndex).is_none());
    }

    #[tokio::test]
    async fn test_required_user_skips_without_error() {
        let store = MemoryHistoryStore::new();
        let entity = EntityRef::new("users", "u1").unwrap();
        let p = policy(json!({"required": ["user"]}));

        let outcome = record(
            &store,
            &p,
            &IdOrIndex,
            &entity,
            &update(json!({"a": 1}), json!({"a": 2})),
            &Attribution::new().with_reason("r"),
            &CommitFence::new(),
        )
        .await
        .unwrap();
        assert!(outcome.is_none());
        assert_eq!(store.latest_version(&entity).await.unwrap(), None);
    }

    #[test]
    fn test_settle() {
        let conflict = || Err(ExError::new(ExErrorKind::Conflict));
        assert!(settle(conflict(), FailurePolicy::FailOpen).unwrap().is_none());
        assert_eq!(
            settle(conflict(), FailurePolicy::FailClosed).unwrap_err().kind(),
            ExErrorKind::Conflict
        );
        for kind in [
            ExErrorKind::Cancelled,
            ExErrorKind::InvalidArgument,
            ExErrorKind::Internal,
        ] {
            assert_eq!(
                settle(Err(ExError::new(kind)), FailurePolicy::FailOpen)
                    .unwrap_err()
                    .kind(),
                kind
            );
        }
    }
}
