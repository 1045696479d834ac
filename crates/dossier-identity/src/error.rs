//! Errors from Keycloak requests.

/// Errors from the identity client.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("invalid Keycloak URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("service account login failed (HTTP {status}): {message}")]
    Login { status: u16, message: String },

    #[error("user {0:?} not found")]
    UserNotFound(String),

    #[error("{what}: Keycloak returned HTTP {status}: {message}")]
    Api {
        what: String,
        status: u16,
        message: String,
    },

    #[error("{what}: transport error: {source}")]
    Transport {
        what: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{what}: malformed response: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

impl IdentityError {
    /// True when the server rejected the bearer token itself.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401, .. })
    }
}
