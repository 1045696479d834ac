//! Document identifiers of the form `collection/key`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocIdError {
    #[error("invalid document ID format: {0:?}")]
    InvalidFormat(String),
}

/// Split a document identifier on its first `/`.
///
/// Both halves must be non-empty. Everything after the first separator
/// belongs to the key, so `"a/b/c"` yields `("a", "b/c")`.
pub fn parse_doc_id(id: &str) -> Result<(&str, &str), DocIdError> {
    match id.split_once('/') {
        Some((collection, key)) if !collection.is_empty() && !key.is_empty() => {
            Ok((collection, key))
        }
        _ => Err(DocIdError::InvalidFormat(id.to_string())),
    }
}

/// An owned, validated document identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId {
    collection: String,
    key: String,
}

impl DocumentId {
    pub fn new(collection: impl Into<String>, key: impl Into<String>) -> Result<Self, DocIdError> {
        let collection = collection.into();
        let key = key.into();
        if collection.is_empty() || key.is_empty() || collection.contains('/') {
            return Err(DocIdError::InvalidFormat(format!("{collection}/{key}")));
        }
        Ok(Self { collection, key })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl FromStr for DocumentId {
    type Err = DocIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (collection, key) = parse_doc_id(s)?;
        Ok(Self {
            collection: collection.to_string(),
            key: key.to_string(),
        })
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.key)
    }
}

impl Serialize for DocumentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_collection_and_key() {
        assert_eq!(parse_doc_id("persons/123").unwrap(), ("persons", "123"));
        assert_eq!(parse_doc_id("a/b").unwrap(), ("a", "b"));
    }

    #[test]
    fn key_keeps_later_separators() {
        assert_eq!(parse_doc_id("a/b/c").unwrap(), ("a", "b/c"));
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in ["a/", "/b", "ab", "", "/"] {
            assert_eq!(
                parse_doc_id(bad).unwrap_err(),
                DocIdError::InvalidFormat(bad.to_string()),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn owned_id_roundtrips_through_string() {
        let id: DocumentId = "organizations/456".parse().unwrap();
        assert_eq!(id.collection(), "organizations");
        assert_eq!(id.key(), "456");
        assert_eq!(id.to_string(), "organizations/456");

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"organizations/456\"");
        assert!(serde_json::from_str::<DocumentId>("\"nope\"").is_err());
    }

    #[test]
    fn new_validates_parts() {
        assert!(DocumentId::new("persons", "1").is_ok());
        assert!(DocumentId::new("", "1").is_err());
        assert!(DocumentId::new("persons", "").is_err());
        assert!(DocumentId::new("a/b", "1").is_err());
    }
}
