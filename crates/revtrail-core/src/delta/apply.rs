//! Delta application in both directions.
//!
//! [`patch`] moves a value forward across a delta, [`unpatch`] moves it
//! backward. Both are all-or-nothing: the delta is applied to a copy which
//! replaces the target only on success.
//!
//! Missing containers are created on demand (`{}` for object deltas, `[]`
//! for array deltas) so that old deltas stay applicable to documents whose
//! shape drifted. Index mismatches inside arrays are errors.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::delta::model::{ArrayDelta, Delta, Removal};
use crate::errors::{HistoryError, Result};

/// Apply `delta` forward to `target`
///
/// # Errors
///
/// Returns `DeltaMismatch` when the delta does not fit the document. The
/// target is left untouched in that case.
pub fn patch(target: &mut Value, delta: &Delta) -> Result<()> {
    let mut working = target.clone();
    forward(&mut working, delta, "$")?;
    *target = working;
    Ok(())
}

/// Apply `delta` in reverse to `target`
///
/// `unpatch(after, compute(before, after))` yields `before`.
///
/// # Errors
///
/// Returns `DeltaMismatch` when the delta does not fit the document. The
/// target is left untouched in that case.
pub fn unpatch(target: &mut Value, delta: &Delta) -> Result<()> {
    let mut working = target.clone();
    backward(&mut working, delta, "$")?;
    *target = working;
    Ok(())
}

impl Delta {
    /// The delta that undoes this one
    ///
    /// `patch(x, &d.reverse())` is equivalent to `unpatch(x, &d)`.
    pub fn reverse(&self) -> Delta {
        match self {
            Delta::Added(new) => Delta::Deleted(new.clone()),
            Delta::Deleted(old) => Delta::Added(old.clone()),
            Delta::Modified { old, new } => Delta::Modified {
                old: new.clone(),
                new: old.clone(),
            },
            Delta::Object(fields) => Delta::Object(
                fields
                    .iter()
                    .map(|(key, delta)| (key.clone(), delta.reverse()))
                    .collect(),
            ),
            Delta::Array(array) => Delta::Array(array.reverse()),
        }
    }
}

impl ArrayDelta {
    fn reverse(&self) -> ArrayDelta {
        let mut reversed = ArrayDelta::default();
        let mut move_sources = BTreeMap::new();

        for (&from, removal) in &self.removed {
            match removal {
                Removal::Deleted(old) => {
                    reversed.items.insert(from, Delta::Added(old.clone()));
                }
                Removal::Moved { to } => {
                    reversed.removed.insert(*to, Removal::Moved { to: from });
                    move_sources.insert(*to, from);
                }
            }
        }

        for (&index, delta) in &self.items {
            match delta {
                Delta::Added(new) => {
                    reversed.removed.insert(index, Removal::Deleted(new.clone()));
                }
                other => {
                    let old_index = match move_sources.get(&index) {
                        Some(&from) => from,
                        None => self.old_index_of(index),
                    };
                    reversed.items.insert(old_index, other.reverse());
                }
            }
        }

        reversed
    }

    /// Old position of the element found at new position `index`
    ///
    /// Only meaningful for elements that were neither inserted nor moved.
    fn old_index_of(&self, index: usize) -> usize {
        let inserted_before = self
            .inserted_positions()
            .range(..index)
            .count();
        let mut old = index - inserted_before;
        for &removed in self.removed.keys() {
            if removed <= old {
                old += 1;
            } else {
                break;
            }
        }
        old
    }

    /// New positions filled by added elements or move destinations
    fn inserted_positions(&self) -> BTreeSet<usize> {
        let added = self
            .items
            .iter()
            .filter(|(_, delta)| matches!(delta, Delta::Added(_)))
            .map(|(&index, _)| index);
        let moved = self.removed.values().filter_map(|removal| match removal {
            Removal::Moved { to } => Some(*to),
            Removal::Deleted(_) => None,
        });
        added.chain(moved).collect()
    }
}

fn mismatch(path: &str, reason: impl Into<String>) -> HistoryError {
    HistoryError::DeltaMismatch {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn empty_container(delta: &Delta) -> Value {
    match delta {
        Delta::Array(_) => Value::Array(Vec::new()),
        _ => Value::Object(Map::new()),
    }
}

fn object_mut<'a>(target: &'a mut Value, path: &str) -> Result<&'a mut Map<String, Value>> {
    match target {
        Value::Object(map) => Ok(map),
        other => Err(mismatch(path, format!("expected object, found {}", type_name(other)))),
    }
}

fn array_mut<'a>(target: &'a mut Value, path: &str) -> Result<&'a mut Vec<Value>> {
    match target {
        Value::Array(items) => Ok(items),
        other => Err(mismatch(path, format!("expected array, found {}", type_name(other)))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Child container for a nested field delta, created when absent or null
fn container<'a>(map: &'a mut Map<String, Value>, key: &str, delta: &Delta) -> &'a mut Value {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| empty_container(delta));
    if slot.is_null() {
        *slot = empty_container(delta);
    }
    slot
}

fn forward(target: &mut Value, delta: &Delta, path: &str) -> Result<()> {
    match delta {
        Delta::Added(new) | Delta::Modified { new, .. } => *target = new.clone(),
        Delta::Deleted(_) => *target = Value::Null,
        Delta::Object(fields) => {
            let map = object_mut(target, path)?;
            for (key, child) in fields {
                let child_path = format!("{}.{}", path, key);
                match child {
                    Delta::Added(new) | Delta::Modified { new, .. } => {
                        map.insert(key.clone(), new.clone());
                    }
                    Delta::Deleted(_) => {
                        map.remove(key);
                    }
                    nested => forward(container(map, key, nested), nested, &child_path)?,
                }
            }
        }
        Delta::Array(array) => forward_array(array_mut(target, path)?, array, path)?,
    }
    Ok(())
}

fn forward_array(items: &mut Vec<Value>, delta: &ArrayDelta, path: &str) -> Result<()> {
    let mut in_flight = BTreeMap::new();
    for (&index, removal) in delta.removed.iter().rev() {
        if index >= items.len() {
            return Err(mismatch(
                &format!("{}[{}]", path, index),
                format!("cannot remove past end of array of length {}", items.len()),
            ));
        }
        let value = items.remove(index);
        if let Removal::Moved { to } = removal {
            in_flight.insert(*to, value);
        }
    }

    for (&index, child) in &delta.items {
        if let Delta::Added(new) = child {
            in_flight.insert(index, new.clone());
        }
    }
    for (index, value) in in_flight {
        if index > items.len() {
            return Err(mismatch(
                &format!("{}[{}]", path, index),
                format!("cannot insert past end of array of length {}", items.len()),
            ));
        }
        items.insert(index, value);
    }

    for (&index, child) in &delta.items {
        if matches!(child, Delta::Added(_)) {
            continue;
        }
        let child_path = format!("{}[{}]", path, index);
        let element = items
            .get_mut(index)
            .ok_or_else(|| mismatch(&child_path, "no element at index"))?;
        forward(element, child, &child_path)?;
    }
    Ok(())
}

fn backward(target: &mut Value, delta: &Delta, path: &str) -> Result<()> {
    match delta {
        Delta::Added(_) => *target = Value::Null,
        Delta::Modified { old, .. } | Delta::Deleted(old) => *target = old.clone(),
        Delta::Object(fields) => {
            let map = object_mut(target, path)?;
            for (key, child) in fields {
                let child_path = format!("{}.{}", path, key);
                match child {
                    Delta::Added(_) => {
                        map.remove(key);
                    }
                    Delta::Modified { old, .. } | Delta::Deleted(old) => {
                        map.insert(key.clone(), old.clone());
                    }
                    nested => backward(container(map, key, nested), nested, &child_path)?,
                }
            }
        }
        Delta::Array(array) => backward_array(array_mut(target, path)?, array, path)?,
    }
    Ok(())
}

fn backward_array(items: &mut Vec<Value>, delta: &ArrayDelta, path: &str) -> Result<()> {
    for (&index, child) in &delta.items {
        if matches!(child, Delta::Added(_)) {
            continue;
        }
        let child_path = format!("{}[{}]", path, index);
        let element = items
            .get_mut(index)
            .ok_or_else(|| mismatch(&child_path, "no element at index"))?;
        backward(element, child, &child_path)?;
    }

    let mut lifted = BTreeMap::new();
    for index in delta.inserted_positions().into_iter().rev() {
        if index >= items.len() {
            return Err(mismatch(
                &format!("{}[{}]", path, index),
                format!("cannot lift past end of array of length {}", items.len()),
            ));
        }
        lifted.insert(index, items.remove(index));
    }

    for (&index, removal) in &delta.removed {
        let child_path = format!("{}[{}]", path, index);
        let value = match removal {
            Removal::Deleted(old) => old.clone(),
            Removal::Moved { to } => lifted
                .remove(to)
                .ok_or_else(|| mismatch(&child_path, format!("move target {} was not lifted", to)))?,
        };
        if index > items.len() {
            return Err(mismatch(
                &child_path,
                format!("cannot restore past end of array of length {}", items.len()),
            ));
        }
        items.insert(index, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::compute;
    use serde_json::json;

    fn check_both_ways(before: Value, after: Value) {
        let delta = compute(&before, &after).unwrap();

        let mut forward = before.clone();
        patch(&mut forward, &delta).unwrap();
        assert_eq!(forward, after, "patch of {}", delta.to_value());

        let mut backward = after.clone();
        unpatch(&mut backward, &delta).unwrap();
        assert_eq!(backward, before, "unpatch of {}", delta.to_value());

        let mut via_reverse = after.clone();
        patch(&mut via_reverse, &delta.reverse()).unwrap();
        assert_eq!(via_reverse, before, "reverse of {}", delta.to_value());
    }

    #[test]
    fn test_field_changes_both_ways() {
        check_both_ways(json!({"name": "Ann", "age": 30}), json!({"name": "Ann", "age": 31}));
        check_both_ways(json!({"name": "Bob"}), json!({}));
        check_both_ways(json!({}), json!({"tags": ["x"]}));
        check_both_ways(
            json!({"address": {"city": "Oslo"}}),
            json!({"address": {"city": "Bergen", "zip": "5003"}}),
        );
    }

    #[test]
    fn test_array_changes_both_ways() {
        check_both_ways(json!(["a", "b", "c"]), json!(["a", "x", "c", "d"]));
        check_both_ways(json!([1, 2, 3, 4, 5]), json!([5, 1, 3, 2]));
        check_both_ways(
            json!([{"id": 1, "v": "a"}, {"id": 2}, {"id": 3}]),
            json!([{"id": 3}, {"id": 2, "w": true}, {"id": 4}, {"id": 1, "v": "b"}]),
        );
        check_both_ways(json!({"m": [[1, 2], [3]]}), json!({"m": [[1], [3, 4], []]}));
    }

    #[test]
    fn test_unpatch_creates_missing_containers() {
        let delta = Delta::from_value(&json!({"address": {"zip": ["0150", "0151"]}})).unwrap();
        let mut doc = json!({});
        unpatch(&mut doc, &delta).unwrap();
        assert_eq!(doc, json!({"address": {"zip": "0150"}}));
    }

    #[test]
    fn test_mismatch_leaves_target_untouched() {
        let delta = Delta::from_value(&json!({"a": [1, 2], "t": {"_t": "a", "_5": ["x", 0, 0]}}))
            .unwrap();
        let mut doc = json!({"a": 1, "t": ["only"]});
        let err = patch(&mut doc, &delta).unwrap_err();
        assert!(matches!(err, HistoryError::DeltaMismatch { ref path, .. } if path == "$.t[5]"));
        assert_eq!(doc, json!({"a": 1, "t": ["only"]}));
    }

    #[test]
    fn test_object_delta_on_scalar_is_mismatch() {
        let delta = Delta::from_value(&json!({"a": {"b": [1, 2]}})).unwrap();
        let mut doc = json!({"a": 5});
        assert!(matches!(
            unpatch(&mut doc, &delta),
            Err(HistoryError::DeltaMismatch { .. })
        ));
    }

    #[test]
    fn test_old_index_accounts_for_insertions_and_removals() {
        let array = ArrayDelta {
            removed: BTreeMap::from([(0, Removal::Deleted(json!("a"))), (2, Removal::Deleted(json!("c")))]),
            items: BTreeMap::from([(0, Delta::Added(json!("z")))]),
        };
        // old [a, b, c, d] -> new [z, b, d]
        assert_eq!(array.old_index_of(1), 1);
        assert_eq!(array.old_index_of(2), 3);
    }
}
