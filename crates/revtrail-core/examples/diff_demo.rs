//! Diff API Demonstration
//!
//! Walks one record through the store-independent pipeline:
//! 1. Computing a delta between two snapshots
//! 2. Filtering it with an omit policy
//! 3. Undoing it to recover the earlier snapshot
//! 4. Rendering a change summary
#![allow(clippy::unwrap_used, clippy::expect_used)]

use revtrail_core::{
    compute, filter, summarize, unpatch, Attribution, EntityRef, FieldPolicy, HistoryRecord,
};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== revtrail Diff Demo ===\n");

    // ===== Part 1: Compute =====
    let before = json!({
        "name": "Ann",
        "age": 30,
        "password": "hunter2",
        "items": [{"_id": "a", "qty": 1}, {"_id": "b", "qty": 2}]
    });
    let after = json!({
        "name": "Anna",
        "age": 31,
        "password": "correct horse",
        "items": [{"_id": "b", "qty": 2}, {"_id": "a", "qty": 4}]
    });

    let delta = compute(&before, &after).ok_or("snapshots are equal")?;
    println!("## Raw delta\n{}\n", serde_json::to_string_pretty(&delta)?);

    // ===== Part 2: Filter =====
    let policy = FieldPolicy::from_paths(["password"], Vec::<&str>::new())?;
    let filtered = filter(&delta, &policy).ok_or("nothing left after filtering")?;
    println!("## Filtered delta\n{}\n", serde_json::to_string_pretty(&filtered)?);

    // ===== Part 3: Undo =====
    let mut state = after.clone();
    unpatch(&mut state, &delta)?;
    assert_eq!(state, before);
    println!("✓ Unpatched back to the original snapshot\n");

    // ===== Part 4: Summarize =====
    let record = HistoryRecord::new(
        &EntityRef::new("users", "u1")?,
        0,
        filtered,
        &Attribution::new().with_user("admin").with_reason("profile edit"),
    );
    let summary = summarize(&record, &["name"]);
    println!("## Summary\n{}", summary.comment);

    Ok(())
}
