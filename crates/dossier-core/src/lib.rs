//! dossier-core: Shared types, identifiers, and configuration for Dossier.
//!
//! This crate provides the foundational types used by every Dossier component:
//! - Entity documents (Person, Organization, etc.) and the `Entity` tagged union
//! - `Relation` edges and the `RelatedEntity` traversal result
//! - `collection/key` document identifier parsing
//! - Configuration management
//! - Caller identity and request context
//! - Common error types

pub mod auth;
pub mod config;
pub mod context;
pub mod doc_id;
pub mod error;
pub mod types;

pub use auth::AuthContext;
pub use context::RequestContext;
pub use doc_id::{parse_doc_id, DocIdError, DocumentId};
pub use error::DossierError;
pub use types::{
    Entity, EntityType, Event, Organization, Person, RelatedEntity, Relation, Source,
    UnknownEntityType, Website,
};
