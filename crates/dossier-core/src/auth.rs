//! Caller identity copied out of an already-verified bearer token.
//!
//! The token's signature is checked by the gateway in front of the service.
//! Nothing here verifies it; only the payload claims are read.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingBearer,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token has no subject")]
    MissingSubject,
}

/// Who is calling: the token subject and the client it was issued to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub client_id: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: String,
    #[serde(default)]
    azp: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<serde_json::Value>),
}

impl AuthContext {
    /// Extract the context from an `Authorization` header value.
    pub fn from_authorization_header(header: &str) -> Result<Self, AuthError> {
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::MissingBearer)?;
        extract_claims(token)
    }
}

/// Read `sub` and the client id from an unverified JWT payload.
///
/// The client id is `azp` when present, else `aud` (or its first entry).
pub fn extract_claims(token: &str) -> Result<AuthContext, AuthError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(AuthError::Malformed("expected three segments".into())),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::Malformed(e.to_string()))?;
    let claims: Claims =
        serde_json::from_slice(&bytes).map_err(|e| AuthError::Malformed(e.to_string()))?;

    if claims.sub.is_empty() {
        return Err(AuthError::MissingSubject);
    }

    let client_id = match (claims.azp, claims.aud) {
        (Some(azp), _) if !azp.is_empty() => azp,
        (_, Some(Audience::One(aud))) => aud,
        (_, Some(Audience::Many(auds))) => auds
            .first()
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    };

    Ok(AuthContext {
        user_id: claims.sub,
        client_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn prefers_authorized_party() {
        let ctx = extract_claims(&token(r#"{"sub":"u-1","azp":"web","aud":"api"}"#)).unwrap();
        assert_eq!(ctx.user_id, "u-1");
        assert_eq!(ctx.client_id, "web");
    }

    #[test]
    fn falls_back_to_audience() {
        let ctx = extract_claims(&token(r#"{"sub":"u-1","aud":"api"}"#)).unwrap();
        assert_eq!(ctx.client_id, "api");

        let ctx = extract_claims(&token(r#"{"sub":"u-1","azp":"","aud":["first","second"]}"#))
            .unwrap();
        assert_eq!(ctx.client_id, "first");

        let ctx = extract_claims(&token(r#"{"sub":"u-1"}"#)).unwrap();
        assert_eq!(ctx.client_id, "");
    }

    #[test]
    fn requires_subject() {
        assert_eq!(
            extract_claims(&token(r#"{"aud":"api"}"#)).unwrap_err(),
            AuthError::MissingSubject
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            extract_claims("not-a-jwt"),
            Err(AuthError::Malformed(_))
        ));
        assert!(matches!(
            extract_claims("a.%%%.c"),
            Err(AuthError::Malformed(_))
        ));
    }

    #[test]
    fn header_needs_bearer_prefix() {
        let t = token(r#"{"sub":"u-1"}"#);
        assert!(AuthContext::from_authorization_header(&format!("Bearer {t}")).is_ok());
        assert_eq!(
            AuthContext::from_authorization_header(&t).unwrap_err(),
            AuthError::MissingBearer
        );
    }
}
