use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::{HistoryError, Result};

/// One step of a field path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Object key, or array index in decimal
    Field(String),
    /// `*`: any key or index at this depth
    Wildcard,
}

impl Segment {
    /// True when this segment selects `key`
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Segment::Field(name) => name == key,
            Segment::Wildcard => true,
        }
    }
}

/// Dotted field path such as `address.zip` or `items.*.price`
///
/// Array elements are addressed by their index in the new array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parse a dotted path
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` for an empty path or an empty segment
    /// (`"a..b"`, `".a"`, `"a."`).
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(HistoryError::InvalidPath {
                path: raw.to_string(),
                reason: "path cannot be empty".to_string(),
            });
        }

        let segments = raw
            .split('.')
            .map(|part| match part {
                "" => Err(HistoryError::InvalidPath {
                    path: raw.to_string(),
                    reason: "empty path segment".to_string(),
                }),
                "*" => Ok(Segment::Wildcard),
                name => Ok(Segment::Field(name.to_string())),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl FromStr for PathPattern {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PathPattern {
    type Error = HistoryError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<PathPattern> for String {
    fn from(pattern: PathPattern) -> Self {
        pattern.to_string()
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match segment {
                Segment::Field(name) => f.write_str(name)?,
                Segment::Wildcard => f.write_str("*")?,
            }
        }
        Ok(())
    }
}
