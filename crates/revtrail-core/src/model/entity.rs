use serde::{Deserialize, Serialize};

use crate::errors::{HistoryError, Result};

/// Identity of a tracked record, independent of its schema
///
/// A `(collection_name, collection_id)` pair. Both parts are required and
/// never change once history exists for the record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawEntityRef")]
pub struct EntityRef {
    collection_name: String,
    collection_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntityRef {
    collection_name: String,
    collection_id: String,
}

impl TryFrom<RawEntityRef> for EntityRef {
    type Error = HistoryError;

    fn try_from(raw: RawEntityRef) -> Result<Self> {
        EntityRef::new(raw.collection_name, raw.collection_id)
    }
}

impl EntityRef {
    /// Create a validated entity reference
    ///
    /// # Errors
    ///
    /// Returns `InvalidEntityRef` if either part is empty or whitespace-only.
    pub fn new(collection_name: impl Into<String>, collection_id: impl Into<String>) -> Result<Self> {
        let collection_name = collection_name.into();
        let collection_id = collection_id.into();

        if collection_name.trim().is_empty() {
            return Err(HistoryError::InvalidEntityRef {
                reason: "collection name cannot be empty".to_string(),
            });
        }
        if collection_id.trim().is_empty() {
            return Err(HistoryError::InvalidEntityRef {
                reason: format!("collection id for '{}' cannot be empty", collection_name),
            });
        }

        Ok(Self {
            collection_name,
            collection_id,
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection_name, self.collection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_parts() {
        assert!(matches!(
            EntityRef::new("", "1"),
            Err(HistoryError::InvalidEntityRef { .. })
        ));
        assert!(matches!(
            EntityRef::new("users", "  "),
            Err(HistoryError::InvalidEntityRef { .. })
        ));
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: EntityRef =
            serde_json::from_str(r#"{"collectionName":"users","collectionId":"u1"}"#).unwrap();
        assert_eq!(ok.to_string(), "users/u1");

        let bad = serde_json::from_str::<EntityRef>(r#"{"collectionName":"","collectionId":"u1"}"#);
        assert!(bad.is_err());
    }
}
