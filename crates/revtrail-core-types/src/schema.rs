//! Canonical schema constants for structured logging and events
//!
//! These constants keep log field names consistent between the recorder,
//! the reconstructor and the stores.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";
pub const FIELD_TRACE_ID: &str = "trace_id";

// Entity identifiers
pub const FIELD_COLLECTION_NAME: &str = "collection_name";
pub const FIELD_COLLECTION_ID: &str = "collection_id";
pub const FIELD_VERSION: &str = "version";

// Collection sizes
pub const FIELD_RECORD_COUNT: &str = "record_count";
pub const FIELD_CHANGED_FIELDS: &str = "changed_fields";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
pub const EVENT_SKIPPED: &str = "skipped";
