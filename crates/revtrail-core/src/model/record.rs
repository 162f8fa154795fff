use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::delta::Delta;
use crate::model::EntityRef;

/// Who made a change and why
///
/// Passed explicitly with every recorded mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    /// Opaque user reference (id, object, whatever the host uses)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Attribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: impl Into<Value>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// True when a usable user value is attached
    ///
    /// `null` and the empty string count as absent.
    pub fn has_user(&self) -> bool {
        match &self.user {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// True when a non-empty reason is attached
    pub fn has_reason(&self) -> bool {
        self.reason.as_deref().is_some_and(|r| !r.is_empty())
    }
}

/// A mutation reported by the host
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// New record; history starts at its first update, so nothing is logged
    Create,
    /// Record changed from `before` to `after` (both fully materialized)
    Update { before: Value, after: Value },
    /// Record removed; `after` is the empty object
    Delete { before: Value },
}

impl Mutation {
    /// Before/after snapshots to diff, or `None` for creates
    pub fn snapshots(&self) -> Option<(&Value, Value)> {
        match self {
            Mutation::Create => None,
            Mutation::Update { before, after } => Some((before, after.clone())),
            Mutation::Delete { before } => Some((before, Value::Object(Default::default()))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Create => "create",
            Mutation::Update { .. } => "update",
            Mutation::Delete { .. } => "delete",
        }
    }
}

/// One row of the history log
///
/// Serialized field names are the persisted layout:
/// `{collectionName, collectionId, diff, user, reason, version, createdAt, updatedAt}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub collection_name: String,
    pub collection_id: String,
    pub diff: Delta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Build a record stamped with the current time
    ///
    /// Timestamps are truncated to milliseconds, the resolution stores keep.
    pub fn new(entity: &EntityRef, version: u64, diff: Delta, attribution: &Attribution) -> Self {
        let now = Utc::now();
        let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        Self {
            collection_name: entity.collection_name().to_string(),
            collection_id: entity.collection_id().to_string(),
            diff,
            user: attribution.user.clone(),
            reason: attribution.reason.clone(),
            version,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn belongs_to(&self, entity: &EntityRef) -> bool {
        self.collection_name == entity.collection_name()
            && self.collection_id == entity.collection_id()
    }
}

/// Sort direction for history listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Pagination and ordering for `records_all`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default)]
    pub sort: SortOrder,
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl QueryOptions {
    pub fn descending() -> Self {
        Self {
            sort: SortOrder::Descending,
            ..Self::default()
        }
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Apply ordering and pagination to records already sorted ascending
    pub fn apply(&self, mut records: Vec<HistoryRecord>) -> Vec<HistoryRecord> {
        if self.sort == SortOrder::Descending {
            records.reverse();
        }
        records
            .into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}
