#![allow(clippy::unwrap_used, clippy::expect_used)]

use revtrail_core::errors::{ExError, ExErrorKind, HistoryError};
use revtrail_core::logging_facility::test_capture::init_test_capture;
use revtrail_core::{log_op_end, log_op_error, log_op_start};
use revtrail_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START};
use revtrail_core_types::Sensitive;

#[test]
fn test_log_op_start_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_start_unique_1";

    log_op_start!(op_name);

    let start_events = capture.count_events(|e| {
        e.op.as_deref() == Some(op_name) && e.event.as_deref() == Some(EVENT_START)
    });
    assert_eq!(start_events, 1, "Should have captured one start event");
}

#[test]
fn test_log_op_end_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_end_unique_2";

    log_op_end!(op_name, duration_ms = 42);

    let events = capture.events_for_op(op_name);
    assert_eq!(events.len(), 1, "Should have exactly one end event");
    assert_eq!(events[0].event.as_deref(), Some(EVENT_END));
    assert_eq!(events[0].field("duration_ms"), Some("42"));
}

#[test]
fn test_log_op_error_maps_history_error() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_unique_3";

    let err = HistoryError::InvalidVersion {
        input: "-1".to_string(),
    };
    log_op_error!(op_name, err, duration_ms = 10);

    let events = capture.events_for_op(op_name);
    let error_event = events
        .iter()
        .find(|e| e.event.as_deref() == Some(EVENT_END_ERROR))
        .expect("Should have error event");

    assert_eq!(error_event.field("err.code"), Some("ERR_INVALID_ARGUMENT"));
    assert!(error_event
        .field("err.message")
        .is_some_and(|m| m.contains("-1")));
}

#[test]
fn test_log_op_error_accepts_ex_error() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_ex_unique_4";

    let err = ExError::new(ExErrorKind::Conflict)
        .with_entity("users", "u1")
        .with_message("version taken");
    log_op_error!(op_name, err, duration_ms = 1, collection_name = "users");

    // Caller still owns the error after logging
    assert_eq!(err.kind(), ExErrorKind::Conflict);

    let events = capture.events_for_op(op_name);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].field("err.code"), Some("ERR_CONFLICT"));
    assert_eq!(events[0].field("collection_name"), Some("users"));
}

#[test]
fn test_boundary_ownership_single_start_end() {
    let capture = init_test_capture();
    let op_name = "test_boundary_ownership_unique_5";

    log_op_start!(op_name, collection_name = "users", collection_id = "u1");
    log_op_end!(op_name, duration_ms = 42, version = 3u64);

    let events = capture.events_for_op(op_name);
    let starts = events
        .iter()
        .filter(|e| e.event.as_deref() == Some(EVENT_START))
        .count();
    let ends = events
        .iter()
        .filter(|e| e.event.as_deref() == Some(EVENT_END))
        .count();

    assert_eq!(starts, 1, "Should have exactly one start event");
    assert_eq!(ends, 1, "Should have exactly one end event");
    assert_eq!(events[0].field("collection_id"), Some("u1"));
}

#[test]
fn test_sensitive_user_is_redacted_in_events() {
    let capture = init_test_capture();
    let op_name = "test_sensitive_user_unique_6";

    let user = Sensitive::new("alice@example.com".to_string());
    log_op_start!(op_name, user = %user);

    let events = capture.events_for_op(op_name);
    assert_eq!(events[0].field("user"), Some("***REDACTED***"));
}

#[test]
#[should_panic(expected = "Expected event")]
fn test_test_capture_assert_event_exists_fails() {
    let capture = init_test_capture();

    capture.assert_event_exists("nonexistent_op_truly_unique_999", EVENT_START);
}

#[test]
fn test_multiple_operations_logged_independently() {
    let capture = init_test_capture();
    let op1_name = "test_multi_ops_record_unique_7";
    let op2_name = "test_multi_ops_reconstruct_unique_7";

    log_op_start!(op1_name);
    log_op_end!(op1_name, duration_ms = 10);
    log_op_start!(op2_name);
    log_op_end!(op2_name, duration_ms = 5);

    assert_eq!(capture.events_for_op(op1_name).len(), 2);
    assert_eq!(capture.events_for_op(op2_name).len(), 2);
}
