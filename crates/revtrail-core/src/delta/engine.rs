//! Delta computation.
//!
//! The entry points are [`compute`] and [`compute_with`], which accept two
//! arbitrary JSON values and produce the minimal [`Delta`] turning the first
//! into the second, or `None` when they are deep-equal.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

use crate::delta::identity::{element_key, json_eq, ElementIdentity, IdOrIndex};
use crate::delta::model::{ArrayDelta, Delta, Removal};

/// Largest LCS table (`len_a * len_b` cells) built for one array window;
/// bigger windows are recorded as a whole-array replacement
const MAX_LCS_CELLS: usize = 1 << 22;

/// Compute the delta from `before` to `after` using `_id`/`id` element identity
pub fn compute(before: &Value, after: &Value) -> Option<Delta> {
    compute_with(before, after, &IdOrIndex)
}

/// Compute the delta from `before` to `after` with a custom element identity
pub fn compute_with(before: &Value, after: &Value, identity: &dyn ElementIdentity) -> Option<Delta> {
    Differ { identity }.diff(before, after)
}

struct Differ<'a> {
    identity: &'a dyn ElementIdentity,
}

impl Differ<'_> {
    fn diff(&self, before: &Value, after: &Value) -> Option<Delta> {
        if json_eq(before, after) {
            return None;
        }
        match (before, after) {
            (Value::Object(a), Value::Object(b)) => self.diff_objects(a, b).map(Delta::Object),
            (Value::Array(a), Value::Array(b)) => self.diff_arrays(a, b),
            _ => Some(Delta::Modified {
                old: before.clone(),
                new: after.clone(),
            }),
        }
    }

    fn diff_objects(
        &self,
        before: &Map<String, Value>,
        after: &Map<String, Value>,
    ) -> Option<BTreeMap<String, Delta>> {
        let mut fields = BTreeMap::new();

        for (key, old) in before {
            match after.get(key) {
                Some(new) => {
                    if let Some(delta) = self.diff(old, new) {
                        fields.insert(key.clone(), delta);
                    }
                }
                None => {
                    fields.insert(key.clone(), Delta::Deleted(old.clone()));
                }
            }
        }

        for (key, new) in after {
            if !before.contains_key(key) {
                fields.insert(key.clone(), Delta::Added(new.clone()));
            }
        }

        (!fields.is_empty()).then_some(fields)
    }

    fn diff_arrays(&self, before: &[Value], after: &[Value]) -> Option<Delta> {
        let keys_a: Vec<String> = before
            .iter()
            .enumerate()
            .map(|(i, v)| element_key(self.identity, v, i))
            .collect();
        let keys_b: Vec<String> = after
            .iter()
            .enumerate()
            .map(|(i, v)| element_key(self.identity, v, i))
            .collect();

        let mut delta = ArrayDelta::default();

        // Common head
        let mut start = 0;
        while start < before.len() && start < after.len() && keys_a[start] == keys_b[start] {
            self.record_match(&mut delta, before, after, start, start);
            start += 1;
        }

        // Common tail
        let (mut end_a, mut end_b) = (before.len(), after.len());
        while end_a > start && end_b > start && keys_a[end_a - 1] == keys_b[end_b - 1] {
            end_a -= 1;
            end_b -= 1;
            self.record_match(&mut delta, before, after, end_a, end_b);
        }

        if (end_a - start).saturating_mul(end_b - start) > MAX_LCS_CELLS {
            return Some(Delta::Modified {
                old: Value::Array(before.to_vec()),
                new: Value::Array(after.to_vec()),
            });
        }

        // Middle window: longest common subsequence of identities
        let pairs = lcs(&keys_a[start..end_a], &keys_b[start..end_b]);
        let mut matched_a = HashSet::new();
        let mut matched_b = HashSet::new();
        for (i, j) in pairs {
            let (i, j) = (i + start, j + start);
            matched_a.insert(i);
            matched_b.insert(j);
            self.record_match(&mut delta, before, after, i, j);
        }

        let mut added: Vec<usize> = (start..end_b).filter(|j| !matched_b.contains(j)).collect();
        for i in (start..end_a).filter(|i| !matched_a.contains(i)) {
            let moved_to = added.iter().position(|&j| keys_a[i] == keys_b[j]);
            match moved_to {
                Some(pos) => {
                    let j = added.remove(pos);
                    delta.removed.insert(i, Removal::Moved { to: j });
                    self.record_match(&mut delta, before, after, i, j);
                }
                None => {
                    delta.removed.insert(i, Removal::Deleted(before[i].clone()));
                }
            }
        }
        for j in added {
            delta.items.insert(j, Delta::Added(after[j].clone()));
        }

        (!delta.is_empty()).then_some(Delta::Array(delta))
    }

    /// Same element at old index `i` and new index `j`; keep any content change
    fn record_match(&self, delta: &mut ArrayDelta, before: &[Value], after: &[Value], i: usize, j: usize) {
        if let Some(inner) = self.diff(&before[i], &after[j]) {
            delta.items.insert(j, inner);
        }
    }
}

/// Index pairs of a longest common subsequence, ascending in both
fn lcs(a: &[String], b: &[String]) -> Vec<(usize, usize)> {
    let (n, m) = (a.len(), b.len());
    let mut table = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if a[i] == b[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut pairs = Vec::with_capacity(table[0][0]);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}
