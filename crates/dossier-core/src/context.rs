//! Per-request context carried into graph operations for log correlation.

use uuid::Uuid;

use crate::auth::AuthContext;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub auth: Option<AuthContext>,
}

impl RequestContext {
    /// Use the caller-supplied request id, or generate one.
    pub fn new(request_id: Option<&str>) -> Self {
        let request_id = match request_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        Self {
            request_id,
            auth: None,
        }
    }

    pub fn with_auth(mut self, auth: AuthContext) -> Self {
        self.auth = Some(auth);
        self
    }

    /// A span tagging every event inside it with the request identity.
    pub fn span(&self) -> tracing::Span {
        let (user_id, client_id) = match &self.auth {
            Some(a) => (a.user_id.as_str(), a.client_id.as_str()),
            None => ("", ""),
        };
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            user_id = %user_id,
            client_id = %client_id,
        )
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(None)
    }
}
