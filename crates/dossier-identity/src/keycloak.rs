//! Keycloak client using the client-credentials grant.
//!
//! The service-account token is cached and reused until shortly before it
//! expires. A user fetch that is rejected with 401 drops the cached token
//! and retries once with a fresh login.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use dossier_core::config::KeycloakConfig;

use crate::error::IdentityError;

/// Refresh this long before the server-side expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// A Keycloak user as returned by the admin API. Only the fields Dossier
/// reads are kept; everything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub enabled: Option<bool>,
    /// Milliseconds since the Unix epoch.
    pub created_timestamp: Option<i64>,
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
}

/// The subset of a user that may be shown to other users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUserData {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl From<UserProfile> for PublicUserData {
    fn from(user: UserProfile) -> Self {
        Self {
            id: user.id.unwrap_or_default(),
            username: user.username.unwrap_or_default(),
            first_name: user.first_name.unwrap_or_default(),
            last_name: user.last_name.unwrap_or_default(),
            email: user.email.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Keycloak reports errors in one of two shapes depending on the endpoint.
#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
    #[serde(default, rename = "errorMessage")]
    error_message: String,
}

impl ErrorBody {
    fn message(self, status: StatusCode) -> String {
        [self.error_description, self.error_message, self.error]
            .into_iter()
            .find(|m| !m.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string())
    }
}

struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

struct Inner {
    http: reqwest::Client,
    base: Url,
    realm: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

/// Service-account client for one Keycloak realm. Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct KeycloakClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for KeycloakClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeycloakClient")
            .field("base", &self.inner.base.as_str())
            .field("realm", &self.inner.realm)
            .field("client_id", &self.inner.client_id)
            .finish_non_exhaustive()
    }
}

impl KeycloakClient {
    /// Build a client. No request is made until the first lookup.
    pub fn new(config: &KeycloakConfig) -> Result<Self, IdentityError> {
        if config.url.is_empty() {
            return Err(IdentityError::MissingSetting("keycloak.url"));
        }
        if config.realm.is_empty() {
            return Err(IdentityError::MissingSetting("keycloak.realm"));
        }
        if config.client_id.is_empty() {
            return Err(IdentityError::MissingSetting("keycloak.client_id"));
        }
        if config.client_secret.is_empty() {
            return Err(IdentityError::MissingSetting("keycloak.client_secret"));
        }

        let invalid = |reason: String| IdentityError::InvalidUrl {
            url: config.url.clone(),
            reason,
        };
        let base = Url::parse(&config.url).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|source| IdentityError::Transport {
                what: "client setup".to_string(),
                source,
            })?;

        tracing::info!(
            url = %base,
            realm = %config.realm,
            client_id = %config.client_id,
            "Keycloak client configured"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base,
                realm: config.realm.clone(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                token: Mutex::new(None),
            }),
        })
    }

    /// Fetch a user and keep only the public fields. Missing fields are empty.
    pub async fn public_user_data(&self, user_id: &str) -> Result<PublicUserData, IdentityError> {
        Ok(self.user_profile(user_id).await?.into())
    }

    /// Fetch a user by id with the service-account token.
    pub async fn user_profile(&self, user_id: &str) -> Result<UserProfile, IdentityError> {
        let token = self.access_token().await?;
        match self.fetch_user(&token, user_id).await {
            Err(e) if e.is_unauthorized() => {
                tracing::debug!(user_id, "Token rejected, logging in again");
                self.invalidate(&token).await;
                let token = self.access_token().await?;
                self.fetch_user(&token, user_id).await
            }
            other => other,
        }
    }

    async fn fetch_user(&self, token: &str, user_id: &str) -> Result<UserProfile, IdentityError> {
        let url = self.endpoint(&["admin", "realms", &self.inner.realm, "users", user_id])?;
        let what = format!("user {user_id:?}");
        let resp = self
            .inner
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| IdentityError::Transport {
                what: what.clone(),
                source,
            })?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(IdentityError::UserNotFound(user_id.to_string()));
        }
        let user: UserProfile = read_json(&what, resp).await.map_err(|e| match e {
            ResponseError::Status(status, body) => IdentityError::Api {
                what: what.clone(),
                status: status.as_u16(),
                message: body.message(status),
            },
            ResponseError::Other(e) => e,
        })?;
        tracing::debug!(user_id, "Keycloak user fetched");
        Ok(user)
    }

    /// Return the cached token, logging in when it is absent or about to expire.
    async fn access_token(&self) -> Result<String, IdentityError> {
        let mut cached = self.inner.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = self.login().await?;
        let access_token = fresh.access_token.clone();
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            access_token: fresh.access_token,
            refresh_at: Instant::now() + lifetime,
        });
        Ok(access_token)
    }

    /// Drop the cached token unless another task already replaced it.
    async fn invalidate(&self, rejected: &str) {
        let mut cached = self.inner.token.lock().await;
        if cached.as_ref().is_some_and(|t| t.access_token == rejected) {
            *cached = None;
        }
    }

    async fn login(&self) -> Result<TokenResponse, IdentityError> {
        let url = self.endpoint(&[
            "realms",
            &self.inner.realm,
            "protocol",
            "openid-connect",
            "token",
        ])?;
        let what = "service account login";
        let resp = self
            .inner
            .http
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.inner.client_id.as_str()),
                ("client_secret", self.inner.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|source| IdentityError::Transport {
                what: what.to_string(),
                source,
            })?;

        let token: TokenResponse = read_json(what, resp).await.map_err(|e| match e {
            ResponseError::Status(status, body) => IdentityError::Login {
                status: status.as_u16(),
                message: body.message(status),
            },
            ResponseError::Other(e) => e,
        })?;
        tracing::debug!(
            realm = %self.inner.realm,
            expires_in = token.expires_in,
            "Service account logged in"
        );
        Ok(token)
    }

    fn endpoint(&self, path: &[&str]) -> Result<Url, IdentityError> {
        let mut url = self.inner.base.clone();
        url.path_segments_mut()
            .map_err(|()| IdentityError::InvalidUrl {
                url: self.inner.base.to_string(),
                reason: "not a base URL".to_string(),
            })?
            .pop_if_empty()
            .extend(path);
        Ok(url)
    }
}

enum ResponseError {
    Status(StatusCode, ErrorBody),
    Other(IdentityError),
}

async fn read_json<T: serde::de::DeserializeOwned>(
    what: &str,
    resp: Response,
) -> Result<T, ResponseError> {
    let status = resp.status();
    let bytes = resp.bytes().await.map_err(|source| {
        ResponseError::Other(IdentityError::Transport {
            what: what.to_string(),
            source,
        })
    })?;
    if !status.is_success() {
        // Error bodies are best effort; a proxy may answer with HTML.
        let body = serde_json::from_slice(&bytes).unwrap_or_default();
        return Err(ResponseError::Status(status, body));
    }
    serde_json::from_slice(&bytes).map_err(|source| {
        ResponseError::Other(IdentityError::Decode {
            what: what.to_string(),
            source,
        })
    })
}
