use revtrail_core::errors::{ExError, ExErrorKind, HistoryError};
use revtrail_core::{Delta, EntityRef, PathPattern};
use serde_json::json;

#[test]
fn test_argument_errors_map_to_invalid_argument() {
    let cases = vec![
        EntityRef::new("", "1").unwrap_err(),
        PathPattern::parse("a..b").unwrap_err(),
        HistoryError::InvalidVersion {
            input: "abc".to_string(),
        },
        Delta::from_value(&json!(7)).unwrap_err(),
    ];

    for err in cases {
        let ex_err: ExError = err.into();
        assert_eq!(ex_err.kind(), ExErrorKind::InvalidArgument);
        assert_eq!(ex_err.code(), "ERR_INVALID_ARGUMENT");
    }
}

#[test]
fn test_text_diff_maps_to_serialization() {
    let err = Delta::from_value(&json!({"bio": ["@@ -1 +1 @@", 0, 2]})).unwrap_err();
    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::Serialization);
    assert!(ex_err.message().contains("$.bio"));
}

#[test]
fn test_version_conflict_structured_fields() {
    let err = HistoryError::VersionConflict {
        collection_name: "users".to_string(),
        collection_id: "u1".to_string(),
        expected: Some(2),
        actual: Some(3),
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::Conflict);
    assert_eq!(ex_err.collection_name(), Some("users"));
    assert_eq!(ex_err.collection_id(), Some("u1"));
    assert_eq!(ex_err.version(), Some(3));
    assert!(ex_err.is_retryable());
}

#[test]
fn test_error_kind_code_mapping() {
    let kinds = vec![
        (ExErrorKind::InvalidArgument, "ERR_INVALID_ARGUMENT"),
        (ExErrorKind::Conflict, "ERR_CONFLICT"),
        (ExErrorKind::Persistence, "ERR_PERSISTENCE"),
        (ExErrorKind::Cancelled, "ERR_CANCELLED"),
        (ExErrorKind::Timeout, "ERR_TIMEOUT"),
        (ExErrorKind::Serialization, "ERR_SERIALIZATION"),
        (ExErrorKind::Internal, "ERR_INTERNAL"),
    ];

    for (kind, expected_code) in kinds {
        assert_eq!(kind.code(), expected_code);
    }
}

#[test]
fn test_builder_context_round_trips() {
    let ctx = revtrail_core_types::RequestContext::new();
    let err = ExError::new(ExErrorKind::Timeout)
        .with_op("get_version")
        .with_request_id(ctx.request_id.clone())
        .with_message("deadline exceeded");

    assert_eq!(err.op(), Some("get_version"));
    assert_eq!(err.request_id(), Some(&ctx.request_id));
    assert_eq!(
        err.to_string(),
        "[ERR_TIMEOUT] in operation 'get_version': deadline exceeded"
    );
}
