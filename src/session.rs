use crate::types::{ObservedError, PalaverError, Result};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Header the authentication layer in front of this service sets to the
/// signed-in user's id. No value means no session.
pub const SESSION_USER_HEADER: &str = "x-auth-user";

/// Header carrying the user's upstream session token. A signed-in user can
/// lack one, which is a distinct failure from having no session at all.
pub const UPSTREAM_TOKEN_HEADER: &str = "x-upstream-session";

/// The caller's identity for one request.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    upstream_token: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, upstream_token: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            upstream_token,
        }
    }

    /// The token every upstream call authenticates with.
    pub fn upstream_token(&self) -> Result<&str> {
        self.upstream_token
            .as_deref()
            .ok_or_else(|| PalaverError::UpstreamTokenMissing.into())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ObservedError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(SESSION_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or(PalaverError::SessionMissing)?
            .to_string();

        let upstream_token = parts
            .headers
            .get(UPSTREAM_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Ok(Session::new(user_id, upstream_token))
    }
}
