//! dossier-identity: user lookups against Keycloak's admin API.
//!
//! Dossier only stores Keycloak user ids. When a caller needs to show who
//! owns or edited a record, this crate logs in as the configured service
//! account and fetches the user, keeping only the fields safe to expose.

pub mod error;
pub mod keycloak;

pub use error::IdentityError;
pub use keycloak::{KeycloakClient, PublicUserData, UserProfile};
