//! Delta types and their JSON wire encoding.
//!
//! The encoding is the persisted format of the `diff` column:
//!
//! | shape | meaning |
//! |---|---|
//! | `[new]` | field added |
//! | `[old, new]` | value replaced |
//! | `[old, 0, 0]` | field deleted |
//! | `{ "field": <delta>, … }` | nested object changes |
//! | `{ "_t": "a", "<new idx>": <delta>, "_<old idx>": [old, 0, 0] }` | array changes |
//! | `["", <new idx>, 3]` | array element moved (only under `_<old idx>` keys) |
//!
//! Maps are `BTreeMap`, so encoding is deterministic.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::errors::{HistoryError, Result};

const ARRAY_MARKER_KEY: &str = "_t";
const ARRAY_MARKER: &str = "a";
const DELETED_SENTINEL: u64 = 0;
const TEXT_DIFF_SENTINEL: u64 = 2;
const MOVED_SENTINEL: u64 = 3;

/// Structural change between two JSON values
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    /// Value absent before, present after
    Added(Value),
    /// Value replaced wholesale
    Modified { old: Value, new: Value },
    /// Value present before, absent after
    Deleted(Value),
    /// Per-field changes of an object
    Object(BTreeMap<String, Delta>),
    /// Per-element changes of an array
    Array(ArrayDelta),
}

/// Per-element changes of an array
///
/// `removed` is keyed by position in the old array; `items` by position in
/// the new array. Forward application removes (descending old index), then
/// inserts `Added` items and move destinations (ascending new index), then
/// applies the remaining item deltas in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayDelta {
    pub removed: BTreeMap<usize, Removal>,
    pub items: BTreeMap<usize, Delta>,
}

/// What happened to an element that left its old position
#[derive(Debug, Clone, PartialEq)]
pub enum Removal {
    Deleted(Value),
    Moved { to: usize },
}

impl Delta {
    /// True when the delta carries no change at any depth
    pub fn is_empty(&self) -> bool {
        match self {
            Delta::Object(fields) => fields.values().all(Delta::is_empty),
            Delta::Array(array) => array.is_empty(),
            _ => false,
        }
    }

    /// Top-level field deltas, when this is an object delta
    pub fn as_object(&self) -> Option<&BTreeMap<String, Delta>> {
        match self {
            Delta::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Encode into the wire representation
    pub fn to_value(&self) -> Value {
        match self {
            Delta::Added(new) => json!([new]),
            Delta::Modified { old, new } => json!([old, new]),
            Delta::Deleted(old) => json!([old, DELETED_SENTINEL, DELETED_SENTINEL]),
            Delta::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, delta)| (key.clone(), delta.to_value()))
                    .collect(),
            ),
            Delta::Array(array) => array.to_value(),
        }
    }

    /// Decode from the wire representation
    ///
    /// # Errors
    ///
    /// - `MalformedDelta` for shapes outside the encoding table
    /// - `UnsupportedDelta` for legacy text diffs (`[patch, 0, 2]`)
    pub fn from_value(value: &Value) -> Result<Self> {
        decode(value, "$")
    }
}

impl ArrayDelta {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.items.values().all(Delta::is_empty)
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(ARRAY_MARKER_KEY.to_string(), json!(ARRAY_MARKER));
        for (index, delta) in &self.items {
            map.insert(index.to_string(), delta.to_value());
        }
        for (index, removal) in &self.removed {
            let encoded = match removal {
                Removal::Deleted(old) => json!([old, DELETED_SENTINEL, DELETED_SENTINEL]),
                Removal::Moved { to } => json!(["", to, MOVED_SENTINEL]),
            };
            map.insert(format!("_{}", index), encoded);
        }
        Value::Object(map)
    }
}

fn malformed(path: &str, reason: impl Into<String>) -> HistoryError {
    HistoryError::MalformedDelta {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn sentinel(value: &Value) -> Option<u64> {
    value.as_u64()
}

fn decode(value: &Value, path: &str) -> Result<Delta> {
    match value {
        Value::Array(parts) => decode_leaf(parts, path),
        Value::Object(map) if map.get(ARRAY_MARKER_KEY) == Some(&json!(ARRAY_MARKER)) => {
            decode_array(map, path).map(Delta::Array)
        }
        Value::Object(map) => {
            let mut fields = BTreeMap::new();
            for (key, child) in map {
                fields.insert(key.clone(), decode(child, &format!("{}.{}", path, key))?);
            }
            Ok(Delta::Object(fields))
        }
        other => Err(malformed(
            path,
            format!("expected array or object, found {}", other),
        )),
    }
}

fn decode_leaf(parts: &[Value], path: &str) -> Result<Delta> {
    match parts {
        [new] => Ok(Delta::Added(new.clone())),
        [old, new] => Ok(Delta::Modified {
            old: old.clone(),
            new: new.clone(),
        }),
        [old, a, b] if sentinel(a) == Some(DELETED_SENTINEL) && sentinel(b) == Some(DELETED_SENTINEL) => {
            Ok(Delta::Deleted(old.clone()))
        }
        [_, _, b] if sentinel(b) == Some(TEXT_DIFF_SENTINEL) => Err(HistoryError::UnsupportedDelta {
            path: path.to_string(),
            reason: "text diffs are not supported".to_string(),
        }),
        [_, _, b] if sentinel(b) == Some(MOVED_SENTINEL) => Err(malformed(
            path,
            "move markers are only valid under `_<index>` array keys",
        )),
        _ => Err(malformed(
            path,
            format!("unexpected leaf delta of length {}", parts.len()),
        )),
    }
}

fn parse_index(raw: &str, path: &str) -> Result<usize> {
    raw.parse::<usize>()
        .map_err(|_| malformed(path, format!("invalid array index key '{}'", raw)))
}

fn decode_array(map: &Map<String, Value>, path: &str) -> Result<ArrayDelta> {
    let mut array = ArrayDelta::default();
    for (key, child) in map {
        if key == ARRAY_MARKER_KEY {
            continue;
        }
        let child_path = format!("{}[{}]", path, key);
        if let Some(raw) = key.strip_prefix('_') {
            let index = parse_index(raw, &child_path)?;
            let removal = match child.as_array().map(Vec::as_slice) {
                Some([old, a, b])
                    if sentinel(a) == Some(DELETED_SENTINEL)
                        && sentinel(b) == Some(DELETED_SENTINEL) =>
                {
                    Removal::Deleted(old.clone())
                }
                Some([_, to, b]) if sentinel(b) == Some(MOVED_SENTINEL) => {
                    let to = to
                        .as_u64()
                        .ok_or_else(|| malformed(&child_path, "move target must be an index"))?;
                    Removal::Moved { to: to as usize }
                }
                _ => {
                    return Err(malformed(
                        &child_path,
                        "old-index entries must be deletions or moves",
                    ))
                }
            };
            array.removed.insert(index, removal);
        } else {
            let index = parse_index(key, &child_path)?;
            let delta = decode(child, &child_path)?;
            if matches!(delta, Delta::Deleted(_)) {
                return Err(malformed(
                    &child_path,
                    "deletions must be keyed by old index",
                ));
            }
            array.items.insert(index, delta);
        }
    }
    Ok(array)
}

impl Serialize for Delta {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Delta {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Delta::from_value(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_shapes() {
        assert_eq!(
            Delta::from_value(&json!([1])).unwrap(),
            Delta::Added(json!(1))
        );
        assert_eq!(
            Delta::from_value(&json!([1, 2])).unwrap(),
            Delta::Modified {
                old: json!(1),
                new: json!(2)
            }
        );
        assert_eq!(
            Delta::from_value(&json!(["Bob", 0, 0])).unwrap(),
            Delta::Deleted(json!("Bob"))
        );
    }

    #[test]
    fn test_array_delta_encoding() {
        let wire = json!({
            "_t": "a",
            "0": [{"id": 9}],
            "2": {"name": ["a", "b"]},
            "_1": ["", 3, 3],
            "_4": ["gone", 0, 0]
        });
        let delta = Delta::from_value(&wire).unwrap();
        let Delta::Array(array) = &delta else {
            panic!("expected array delta");
        };
        assert_eq!(array.removed.get(&1), Some(&Removal::Moved { to: 3 }));
        assert_eq!(array.removed.get(&4), Some(&Removal::Deleted(json!("gone"))));
        assert_eq!(array.items.get(&0), Some(&Delta::Added(json!({"id": 9}))));
        assert_eq!(delta.to_value(), wire);
    }

    #[test]
    fn test_text_diff_is_unsupported() {
        let err = Delta::from_value(&json!({"bio": ["@@ -1 +1 @@", 0, 2]})).unwrap_err();
        assert!(matches!(err, HistoryError::UnsupportedDelta { ref path, .. } if path == "$.bio"));
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(Delta::from_value(&json!(42)).is_err());
        assert!(Delta::from_value(&json!({"a": []})).is_err());
        assert!(Delta::from_value(&json!({"_t": "a", "x": [1]})).is_err());
        assert!(Delta::from_value(&json!({"_t": "a", "_0": [1, 2]})).is_err());
        assert!(Delta::from_value(&json!({"_t": "a", "0": [1, 0, 0]})).is_err());
    }

    #[test]
    fn test_emptiness_is_deep() {
        let empty = Delta::Object(BTreeMap::from([(
            "address".to_string(),
            Delta::Object(BTreeMap::new()),
        )]));
        assert!(empty.is_empty());
        assert!(!Delta::Added(json!(null)).is_empty());
    }
}
