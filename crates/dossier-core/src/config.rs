//! Configuration management for Dossier services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Plain `ARANGO_*` and `KEYCLOAK_*` variables (see `LEGACY_ENV`)
//! 2. Environment variables (`DOSSIER__` prefix, `__` separator)
//! 3. Config file (`dossier.toml`)
//! 4. Defaults

use std::fmt;
use std::time::Duration;

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::error::DossierError;
use crate::types::EntityType;

/// Legacy environment variables and the settings they override.
const LEGACY_ENV: [(&str, &str); 8] = [
    ("ARANGO_URL", "arango.url"),
    ("ARANGO_DB", "arango.database"),
    ("ARANGO_USERNAME", "arango.username"),
    ("ARANGO_PASSWORD", "arango.password"),
    ("KEYCLOAK_URL", "keycloak.url"),
    ("KEYCLOAK_REALM", "keycloak.realm"),
    ("KEYCLOAK_CLIENT_ID", "keycloak.client_id"),
    ("KEYCLOAK_CLIENT_SECRET", "keycloak.client_secret"),
];

/// Top-level Dossier configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DossierConfig {
    pub arango: ArangoConfig,
    pub graph: GraphSettings,
    pub provision: ProvisionSettings,
    pub keycloak: KeycloakConfig,
}

/// Connection settings for the ArangoDB HTTP API.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ArangoConfig {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub request_timeout_secs: u64,
    /// Rows fetched per cursor round trip.
    pub cursor_batch_size: u32,
}

impl ArangoConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ArangoConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8529".to_string(),
            database: "osint".to_string(),
            username: "root".to_string(),
            password: String::new(),
            request_timeout_secs: 30,
            cursor_batch_size: 1000,
        }
    }
}

impl fmt::Debug for ArangoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArangoConfig")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("cursor_batch_size", &self.cursor_batch_size)
            .finish()
    }
}

/// Service account used to look up user profiles in Keycloak.
///
/// Left empty unless a command needs user data; the identity client
/// rejects an incomplete section when it is built.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct KeycloakConfig {
    pub url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
    pub request_timeout_secs: u64,
}

impl KeycloakConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for KeycloakConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            realm: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            request_timeout_secs: 10,
        }
    }
}

impl fmt::Debug for KeycloakConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeycloakConfig")
            .field("url", &self.url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// The named graph and the collections it should contain.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    pub name: String,
    pub vertex_collections: Vec<String>,
    pub edge_collections: Vec<EdgeSettings>,
}

impl Default for GraphSettings {
    fn default() -> Self {
        let entities: Vec<String> = EntityType::ALL
            .iter()
            .map(|t| t.collection_name().to_string())
            .collect();
        Self {
            name: "osint".to_string(),
            vertex_collections: entities.clone(),
            edge_collections: vec![EdgeSettings {
                name: "relations".to_string(),
                from: entities.clone(),
                to: entities,
            }],
        }
    }
}

/// An edge collection and the vertex collections it may connect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EdgeSettings {
    pub name: String,
    #[serde(default)]
    pub from: Vec<String>,
    #[serde(default)]
    pub to: Vec<String>,
}

/// Retry behaviour for database and graph creation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvisionSettings {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl ProvisionSettings {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 2000,
        }
    }
}

impl DossierConfig {
    /// Load from `{file_prefix}.toml` (optional) and the environment.
    pub fn load(file_prefix: &str) -> Result<Self, DossierError> {
        let builder = config::Config::builder()
            .add_source(File::with_name(file_prefix).required(false))
            .add_source(
                Environment::with_prefix("DOSSIER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        let builder = apply_legacy_env(builder, |var| std::env::var(var).ok())?;
        Self::from_builder(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, DossierError> {
        let cfg: DossierConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), DossierError> {
        if self.arango.url.is_empty() {
            return Err(DossierError::MissingSetting("arango.url"));
        }
        if self.arango.database.is_empty() {
            return Err(DossierError::MissingSetting("arango.database"));
        }
        if self.graph.name.is_empty() {
            return Err(DossierError::MissingSetting("graph.name"));
        }
        if self.provision.max_attempts == 0 {
            return Err(DossierError::MissingSetting("provision.max_attempts"));
        }
        Ok(())
    }
}

/// Apply the plain `ARANGO_*` and `KEYCLOAK_*` variables on top of everything else.
pub fn apply_legacy_env<F>(
    mut builder: ConfigBuilder<DefaultState>,
    lookup: F,
) -> Result<ConfigBuilder<DefaultState>, DossierError>
where
    F: Fn(&str) -> Option<String>,
{
    for (var, key) in LEGACY_ENV {
        builder = builder.set_override_option(key, lookup(var).filter(|v| !v.is_empty()))?;
    }
    Ok(builder)
}
