use revtrail_core_types::{RequestId, TraceId};
use thiserror::Error;

/// Result type alias for the pure (store-independent) parts of the core
pub type Result<T> = std::result::Result<T, HistoryError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code so hosts can branch on the failure
/// class without matching message text. Kinds are deliberately coarse: one
/// per recovery strategy a caller might take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExErrorKind {
    /// Malformed policy, version, entity reference or delta
    InvalidArgument,
    /// Version collision on append under concurrent mutation
    Conflict,
    /// Underlying persistence failure
    Persistence,
    /// Caller cancelled the operation
    Cancelled,
    /// Operation exceeded its deadline
    Timeout,
    /// JSON encoding/decoding of stored data failed
    Serialization,
    /// Invariant breach inside the engine itself
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidArgument => "ERR_INVALID_ARGUMENT",
            ExErrorKind::Conflict => "ERR_CONFLICT",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Cancelled => "ERR_CANCELLED",
            ExErrorKind::Timeout => "ERR_TIMEOUT",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries the classification (`kind`) plus the context needed to find the
/// offending history row: operation, entity reference and version.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    collection_name: Option<String>,
    collection_id: Option<String>,
    version: Option<u64>,
    request_id: Option<RequestId>,
    trace_id: Option<TraceId>,
    message: String,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            collection_name: None,
            collection_id: None,
            version: None,
            request_id: None,
            trace_id: None,
            message: String::new(),
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity reference context
    pub fn with_entity(
        mut self,
        collection_name: impl Into<String>,
        collection_id: impl Into<String>,
    ) -> Self {
        self.collection_name = Some(collection_name.into());
        self.collection_id = Some(collection_id.into());
        self
    }

    /// Add version context
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add trace ID context
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the collection name context, if any
    pub fn collection_name(&self) -> Option<&str> {
        self.collection_name.as_deref()
    }

    /// Get the collection id context, if any
    pub fn collection_id(&self) -> Option<&str> {
        self.collection_id.as_deref()
    }

    /// Get the version context, if any
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Get the request ID context, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Get the trace ID context, if any
    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True for failures a caller may reasonably retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ExErrorKind::Conflict | ExErrorKind::Timeout | ExErrorKind::Persistence
        )
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let (Some(name), Some(id)) = (&self.collection_name, &self.collection_id) {
            write!(f, " (entity: {}/{})", name, id)?;
        }
        if let Some(version) = self.version {
            write!(f, " (version: {})", version)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {}

// ========== End Error Facility ==========

/// Domain errors raised by the diff, filter and configuration layers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {
    // ===== Argument Errors =====
    /// Entity reference with an empty collection name or id
    #[error("Invalid entity reference: {reason}")]
    InvalidEntityRef { reason: String },

    /// Dotted field path that cannot be parsed
    #[error("Invalid field path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Target version that is negative or not a number
    #[error("Invalid target version: {input}")]
    InvalidVersion { input: String },

    /// Option value of the wrong type or shape
    #[error("Invalid history policy: {reason}")]
    InvalidPolicy { reason: String },

    // ===== Delta Errors =====
    /// Delta whose shape does not match any known encoding
    #[error("Malformed delta at '{path}': {reason}")]
    MalformedDelta { path: String, reason: String },

    /// Delta that does not fit the snapshot it is being applied to
    #[error("Delta does not apply at '{path}': {reason}")]
    DeltaMismatch { path: String, reason: String },

    /// Legacy delta encoding this engine refuses to interpret
    #[error("Unsupported delta encoding at '{path}': {reason}")]
    UnsupportedDelta { path: String, reason: String },

    // ===== Store Errors =====
    /// Another append claimed the version first
    #[error("Version conflict on {collection_name}/{collection_id}: expected latest {expected:?}, found {actual:?}")]
    VersionConflict {
        collection_name: String,
        collection_id: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    // ===== Generic Errors =====
    /// Serialization error (JSON encoding/decoding)
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<HistoryError> for ExError {
    fn from(err: HistoryError) -> Self {
        let message = err.to_string();
        match err {
            HistoryError::InvalidEntityRef { .. }
            | HistoryError::InvalidPath { .. }
            | HistoryError::InvalidVersion { .. }
            | HistoryError::InvalidPolicy { .. }
            | HistoryError::MalformedDelta { .. }
            | HistoryError::DeltaMismatch { .. } => {
                ExError::new(ExErrorKind::InvalidArgument).with_message(message)
            }

            HistoryError::UnsupportedDelta { .. } | HistoryError::Serialization { .. } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }

            HistoryError::VersionConflict {
                collection_name,
                collection_id,
                actual,
                ..
            } => {
                let err = ExError::new(ExErrorKind::Conflict)
                    .with_entity(collection_name, collection_id)
                    .with_message(message);
                match actual {
                    Some(version) => err.with_version(version),
                    None => err,
                }
            }

            HistoryError::Internal { .. } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(err: serde_json::Error) -> Self {
        HistoryError::Serialization {
            message: err.to_string(),
        }
    }
}
