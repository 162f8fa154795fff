//! Human-readable change summaries.
//!
//! Renders each [`HistoryRecord`] as a one-line comment such as
//! `modified tags, age from 30 to 31`. Read-only; nothing here touches the
//! store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::delta::Delta;
use crate::model::HistoryRecord;

/// Display form of one history record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSummary {
    pub changed_by: Option<Value>,
    pub changed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub comment: String,
}

/// Summarize a single record
///
/// Top-level fields named in `expandable` that were replaced render as
/// `"<field> from <old> to <new>"` and are listed after the plain fields.
/// Any other change shape renders as the bare field name.
pub fn summarize<S: AsRef<str>>(record: &HistoryRecord, expandable: &[S]) -> ChangeSummary {
    let mut plain = Vec::new();
    let mut expanded = Vec::new();

    if let Some(fields) = record.diff.as_object() {
        for (field, delta) in fields {
            let is_expandable = expandable.iter().any(|e| e.as_ref() == field.as_str());
            match delta {
                Delta::Modified { old, new } if is_expandable => {
                    expanded.push(format!("{} from {} to {}", field, render(old), render(new)));
                }
                _ if is_expandable => expanded.push(field.clone()),
                _ => plain.push(field.clone()),
            }
        }
    }

    plain.extend(expanded);
    ChangeSummary {
        changed_by: record.user.clone(),
        changed_at: record.created_at,
        updated_at: record.updated_at,
        reason: record.reason.clone(),
        comment: format!("modified {}", plain.join(", ")),
    }
}

/// Summarize records in the order given
pub fn summarize_all<S: AsRef<str>>(records: &[HistoryRecord], expandable: &[S]) -> Vec<ChangeSummary> {
    records.iter().map(|r| summarize(r, expandable)).collect()
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
