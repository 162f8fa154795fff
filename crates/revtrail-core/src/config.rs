//! History options
//!
//! Loaded from TOML (or any serde source) and compiled into a
//! [`HistoryPolicy`] before use:
//!
//! ```toml
//! omit = ["age", "address.zip"]
//! pick = "name"
//! required = ["user"]
//! failure_policy = "fail_open"
//! timeout_ms = 2000
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{HistoryError, Result};
use crate::filter::FieldPolicy;
use crate::model::Attribution;

/// Attribution part that must be present for a mutation to be logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequiredField {
    User,
    Reason,
}

impl RequiredField {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredField::User => "user",
            RequiredField::Reason => "reason",
        }
    }

    fn is_present(&self, attribution: &Attribution) -> bool {
        match self {
            RequiredField::User => attribution.has_user(),
            RequiredField::Reason => attribution.has_reason(),
        }
    }
}

/// What happens when appending a history record fails
///
/// `FailClosed` surfaces the error to the caller. `FailOpen` logs it and lets
/// the host mutation proceed without a history row. Cancellation and invalid
/// arguments always surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    FailClosed,
    FailOpen,
}

/// Raw, serializable history options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryOptions {
    /// Paths struck from every diff (string or list)
    #[serde(default, deserialize_with = "one_or_many")]
    pub omit: Vec<String>,
    /// Paths kept from every diff (string or list); empty keeps all
    #[serde(default, deserialize_with = "one_or_many")]
    pub pick: Vec<String>,
    #[serde(default)]
    pub required: Vec<RequiredField>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl HistoryOptions {
    /// Parse options from a TOML document
    ///
    /// # Errors
    ///
    /// Returns `InvalidPolicy` when a key has the wrong type or is unknown.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| HistoryError::InvalidPolicy {
            reason: e.message().to_string(),
        })
    }

    /// Parse options from a JSON value
    ///
    /// # Errors
    ///
    /// Returns `InvalidPolicy` when a key has the wrong type or is unknown.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| HistoryError::InvalidPolicy {
            reason: e.to_string(),
        })
    }

    /// Validate and parse into a [`HistoryPolicy`]
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` for malformed omit/pick paths.
    pub fn compile(&self) -> Result<HistoryPolicy> {
        let mut required = self.required.clone();
        required.dedup();
        Ok(HistoryPolicy {
            fields: FieldPolicy::from_paths(&self.omit, &self.pick)?,
            required,
            failure_policy: self.failure_policy,
            timeout: self.timeout_ms.map(Duration::from_millis),
        })
    }
}

/// Compiled history options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPolicy {
    pub fields: FieldPolicy,
    pub required: Vec<RequiredField>,
    pub failure_policy: FailurePolicy,
    /// Default deadline for store calls when the caller sets none
    pub timeout: Option<Duration>,
}

impl HistoryPolicy {
    /// First required attribution part missing from `attribution`
    pub fn missing_required(&self, attribution: &Attribution) -> Option<RequiredField> {
        self.required
            .iter()
            .copied()
            .find(|field| !field.is_present(attribution))
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, SeqAccess, Visitor};
    use std::fmt;

    struct OneOrMany;

    impl<'de> Visitor<'de> for OneOrMany {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a field path or a list of field paths")
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<Vec<String>, E>
        where
            E: de::Error,
        {
            Ok(vec![value.to_string()])
        }

        fn visit_seq<S>(self, mut seq: S) -> std::result::Result<Vec<String>, S::Error>
        where
            S: SeqAccess<'de>,
        {
            let mut paths = Vec::new();
            while let Some(path) = seq.next_element::<String>()? {
                paths.push(path);
            }
            Ok(paths)
        }
    }

    deserializer.deserialize_any(OneOrMany)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_or_list() {
        let options = HistoryOptions::from_toml_str(
            r#"
omit = "age"
pick = ["name", "address.*"]
"#,
        )
        .unwrap();
        assert_eq!(options.omit, vec!["age"]);
        assert_eq!(options.pick, vec!["name", "address.*"]);
        assert_eq!(options.failure_policy, FailurePolicy::FailClosed);
    }

    #[test]
    fn test_full_toml() {
        let options = HistoryOptions::from_toml_str(
            r#"
required = ["user", "reason"]
failure_policy = "fail_open"
timeout_ms = 1500
"#,
        )
        .unwrap();
        let policy = options.compile().unwrap();
        assert_eq!(policy.required, vec![RequiredField::User, RequiredField::Reason]);
        assert_eq!(policy.failure_policy, FailurePolicy::FailOpen);
        assert_eq!(policy.timeout, Some(Duration::from_millis(1500)));
        assert!(policy.fields.is_empty());
    }

    #[test]
    fn test_wrong_types_are_invalid_policy() {
        for source in ["omit = 5", "required = [\"admin\"]", "failure_policy = true", "unknown = 1"] {
            assert!(
                matches!(
                    HistoryOptions::from_toml_str(source),
                    Err(HistoryError::InvalidPolicy { .. })
                ),
                "{} should be rejected",
                source
            );
        }
        assert!(matches!(
            HistoryOptions::from_json(json!({"pick": {"a": 1}})),
            Err(HistoryError::InvalidPolicy { .. })
        ));
    }

    #[test]
    fn test_compile_rejects_bad_paths() {
        let options = HistoryOptions {
            omit: vec!["a..b".to_string()],
            ..HistoryOptions::default()
        };
        assert!(matches!(
            options.compile(),
            Err(HistoryError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_missing_required() {
        let policy = HistoryOptions::from_json(json!({"required": ["user", "reason"]}))
            .unwrap()
            .compile()
            .unwrap();
        assert_eq!(
            policy.missing_required(&Attribution::new().with_user("u")),
            Some(RequiredField::Reason)
        );
        assert_eq!(
            policy.missing_required(&Attribution::new().with_user("u").with_reason("r")),
            None
        );
    }
}
