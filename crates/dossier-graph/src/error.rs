//! Errors from driver, provisioning, and cursor operations.

use std::fmt;

use dossier_core::DocIdError;

/// Which kind of schema object an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    Database,
    Graph,
    VertexCollection,
    EdgeCollection,
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Database => "database",
            Self::Graph => "graph",
            Self::VertexCollection => "vertex collection",
            Self::EdgeCollection => "edge collection",
        })
    }
}

/// Errors from graph store operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("{kind} {name:?} already exists")]
    Conflict { kind: SchemaKind, name: String },

    #[error("{kind} {name:?} not found")]
    NotFound { kind: SchemaKind, name: String },

    #[error("{what}: unauthorized (HTTP {status}): {message}")]
    Unauthorized {
        what: String,
        status: u16,
        message: String,
    },

    #[error("{what}: ArangoDB error {error_num} (HTTP {status}): {message}")]
    Api {
        what: String,
        status: u16,
        error_num: i64,
        message: String,
    },

    #[error("{what}: transport error: {source}")]
    Transport {
        what: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no more documents")]
    NoMoreDocuments,

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error("could not provision {kind} {name:?} after {attempts} attempts")]
    ProvisionFailed {
        kind: SchemaKind,
        name: String,
        attempts: u32,
    },

    #[error(transparent)]
    InvalidDocumentId(#[from] DocIdError),
}

impl GraphError {
    /// True when a create failed because the object already exists.
    ///
    /// This is the only failure the provisioning retry loops absorb.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    pub fn is_no_more_documents(&self) -> bool {
        matches!(self, Self::NoMoreDocuments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_variant() {
        let conflict = GraphError::Conflict {
            kind: SchemaKind::Graph,
            name: "osint".into(),
        };
        assert!(conflict.is_conflict());
        assert!(!conflict.is_cancellation());
        assert_eq!(conflict.to_string(), "graph \"osint\" already exists");

        // An API error that merely mentions a conflict is not one.
        let api = GraphError::Api {
            what: "create graph \"osint\"".into(),
            status: 400,
            error_num: 1,
            message: "conflict".into(),
        };
        assert!(!api.is_conflict());

        assert!(GraphError::DeadlineExceeded.is_cancellation());
        assert!(GraphError::Cancelled.is_cancellation());
        assert!(GraphError::NoMoreDocuments.is_no_more_documents());
    }

    #[test]
    fn provision_failure_names_the_object() {
        let err = GraphError::ProvisionFailed {
            kind: SchemaKind::Database,
            name: "osint".into(),
            attempts: 5,
        };
        assert_eq!(
            err.to_string(),
            "could not provision database \"osint\" after 5 attempts"
        );
    }
}
