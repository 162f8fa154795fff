//! Sensitive data marker for automatic redaction
//!
//! Attribution values (the `user` attached to a history record) frequently
//! carry personal data. Wrapping them in `Sensitive<T>` keeps them out of
//! log output and serialized diagnostics while leaving the value reachable
//! for persistence.

use serde::{Serialize, Serializer};
use std::fmt;

const REDACTED: &str = "***REDACTED***";

/// Wrapper that redacts itself in Debug, Display and Serialize
///
/// # Example
///
/// ```
/// use revtrail_core_types::Sensitive;
///
/// let user = Sensitive::new("alice@example.com");
/// assert_eq!(format!("{:?}", user), "***REDACTED***");
/// assert_eq!(user.expose(), &"alice@example.com");
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    /// Wrap a sensitive value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the underlying value
    pub fn expose(&self) -> &T {
        &self.0
    }

    /// Consume the wrapper and return the inner value
    pub fn into_inner(self) -> T {
        self.0
    }

    /// Transform the wrapped value without exposing it
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sensitive<U> {
        Sensitive(f(self.0))
    }
}

impl<T> From<T> for Sensitive<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> Serialize for Sensitive<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_and_display_redact() {
        let user = Sensitive::new("bob@example.com");
        assert_eq!(format!("{:?}", user), REDACTED);
        assert_eq!(format!("{}", user), REDACTED);
    }

    #[test]
    fn test_serialize_redacts() {
        let user = Sensitive::new(serde_json::json!({"name": "bob"}));
        let json = serde_json::to_string(&user).unwrap();
        assert_eq!(json, format!("\"{}\"", REDACTED));
    }

    #[test]
    fn test_expose_and_map() {
        let user = Sensitive::new(String::from("carol"));
        assert_eq!(user.expose(), "carol");

        let len = user.map(|s| s.len());
        assert_eq!(len.into_inner(), 5);
    }

    #[test]
    fn test_redaction_inside_derived_debug() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct Attribution {
            reason: String,
            user: Sensitive<String>,
        }

        let attribution = Attribution {
            reason: "typo fix".to_string(),
            user: Sensitive::new("dave".to_string()),
        };

        let debug_str = format!("{:?}", attribution);
        assert!(debug_str.contains("typo fix"));
        assert!(!debug_str.contains("dave"));
    }
}
