//! Diff filtering by field policy.
//!
//! Omit strikes matched paths (and their subtrees) and prunes parents left
//! empty. Pick keeps matched paths and their ancestors. Both walk object
//! deltas by key; leaf deltas end the walk. In array deltas an element is
//! addressed by its new index, a deletion by its old index, and a move by
//! either. A move and the change recorded at its destination are kept or
//! struck together.

mod path;
mod policy;

pub use path::{PathPattern, Segment};
pub use policy::FieldPolicy;

use std::collections::BTreeMap;

use crate::delta::{ArrayDelta, Delta, Removal};

/// Apply `policy` to `delta`
///
/// Returns `None` when nothing is left to persist. Idempotent:
/// `filter(filter(d)) == filter(d)`.
pub fn filter(delta: &Delta, policy: &FieldPolicy) -> Option<Delta> {
    let mut working = delta.clone();
    for pattern in &policy.omit {
        strike(&mut working, pattern.segments());
    }
    let pruned = prune(working)?;

    if policy.pick.is_empty() {
        return Some(pruned);
    }
    let patterns: Vec<&[_]> = policy.pick.iter().map(PathPattern::segments).collect();
    keep(&pruned, &patterns)
}

fn strike(delta: &mut Delta, segments: &[Segment]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    match delta {
        Delta::Object(fields) => {
            if rest.is_empty() {
                fields.retain(|key, _| !head.matches(key));
            } else {
                for (_, child) in fields.iter_mut().filter(|(key, _)| head.matches(key)) {
                    strike(child, rest);
                }
            }
        }
        Delta::Array(array) => {
            let origins = move_origins(array);
            let hit = |index: usize| {
                head.matches(&index.to_string())
                    || origins
                        .get(&index)
                        .is_some_and(|from| head.matches(&from.to_string()))
            };
            if rest.is_empty() {
                array.items.retain(|index, _| !hit(*index));
                array.removed.retain(|index, removal| {
                    let moved_here =
                        matches!(removal, Removal::Moved { to } if head.matches(&to.to_string()));
                    !(head.matches(&index.to_string()) || moved_here)
                });
            } else {
                for (_, child) in array.items.iter_mut().filter(|(index, _)| hit(**index)) {
                    strike(child, rest);
                }
            }
        }
        Delta::Added(_) | Delta::Modified { .. } | Delta::Deleted(_) => {}
    }
}

/// Drop empty containers bottom-up; `None` when nothing remains
fn prune(delta: Delta) -> Option<Delta> {
    match delta {
        Delta::Object(fields) => {
            let fields: BTreeMap<_, _> = fields
                .into_iter()
                .filter_map(|(key, child)| prune(child).map(|child| (key, child)))
                .collect();
            (!fields.is_empty()).then_some(Delta::Object(fields))
        }
        Delta::Array(array) => {
            let items: BTreeMap<_, _> = array
                .items
                .into_iter()
                .filter_map(|(index, child)| prune(child).map(|child| (index, child)))
                .collect();
            let array = ArrayDelta {
                removed: array.removed,
                items,
            };
            (!array.is_empty()).then_some(Delta::Array(array))
        }
        leaf => Some(leaf),
    }
}

fn keep(delta: &Delta, patterns: &[&[Segment]]) -> Option<Delta> {
    if patterns.iter().any(|segments| segments.is_empty()) {
        return Some(delta.clone());
    }

    match delta {
        Delta::Object(fields) => {
            let kept: BTreeMap<_, _> = fields
                .iter()
                .filter_map(|(key, child)| {
                    let sub = narrow(patterns, key);
                    if sub.is_empty() {
                        return None;
                    }
                    keep(child, &sub).map(|child| (key.clone(), child))
                })
                .collect();
            (!kept.is_empty()).then_some(Delta::Object(kept))
        }
        Delta::Array(array) => {
            let origins = move_origins(array);
            let mut kept = ArrayDelta::default();

            for (index, child) in array.items.iter().filter(|(i, _)| !origins.contains_key(*i)) {
                let sub = narrow(patterns, &index.to_string());
                if sub.is_empty() {
                    continue;
                }
                if let Some(child) = keep(child, &sub) {
                    kept.items.insert(*index, child);
                }
            }

            for (index, removal) in &array.removed {
                let mut sub = narrow(patterns, &index.to_string());
                match removal {
                    // The deleted value is a leaf: only a path ending here keeps it
                    Removal::Deleted(_) => {
                        if sub.iter().any(|segments| segments.is_empty()) {
                            kept.removed.insert(*index, removal.clone());
                        }
                    }
                    Removal::Moved { to } => {
                        sub.extend(narrow(patterns, &to.to_string()));
                        if sub.is_empty() {
                            continue;
                        }
                        let whole = sub.iter().any(|segments| segments.is_empty());
                        let item = array.items.get(to).and_then(|child| keep(child, &sub));
                        if whole || item.is_some() {
                            kept.removed.insert(*index, removal.clone());
                        }
                        if let Some(item) = item {
                            kept.items.insert(*to, item);
                        }
                    }
                }
            }

            (!kept.is_empty()).then_some(Delta::Array(kept))
        }
        Delta::Added(_) | Delta::Modified { .. } | Delta::Deleted(_) => None,
    }
}

/// Old index of every moved element, keyed by its new index
fn move_origins(array: &ArrayDelta) -> BTreeMap<usize, usize> {
    array
        .removed
        .iter()
        .filter_map(|(from, removal)| match removal {
            Removal::Moved { to } => Some((*to, *from)),
            Removal::Deleted(_) => None,
        })
        .collect()
}

/// Remaining segments of every pattern whose first segment selects `key`
fn narrow<'a>(patterns: &[&'a [Segment]], key: &str) -> Vec<&'a [Segment]> {
    patterns
        .iter()
        .copied()
        .filter(|segments| segments[0].matches(key))
        .map(|segments| &segments[1..])
        .collect()
}
