use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing_error::SpanTrace;

/// A conversation id as the browser presents it.
///
/// A new chat session starts under a client-generated placeholder (a UUID or
/// similar opaque string) until the upstream service assigns a real numeric
/// id. Placeholders are purely a local routing key and are never sent
/// upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatId {
    Placeholder(String),
    Real(i64),
}

impl ChatId {
    /// Total parse: a plain positive decimal integer is a real id,
    /// anything else (UUIDs and other opaque strings) is a placeholder.
    /// The upstream starts assigning ids at 1, so zero is not a real id.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(n) if n > 0 => ChatId::Real(n),
            _ => ChatId::Placeholder(raw.to_string()),
        }
    }

    pub fn as_real(&self) -> Option<i64> {
        match self {
            ChatId::Real(n) => Some(*n),
            ChatId::Placeholder(_) => None,
        }
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Placeholder(s) => write!(f, "{}", s),
            ChatId::Real(n) => write!(f, "{}", n),
        }
    }
}

/// The resolved identity of one message within one conversation, as assigned
/// by the upstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub conversation_id: i64,
    pub message_id: i64,
}

/// A message id string as it travels through the transport layer.
///
/// When the transport has no separate metadata channel, the upstream ids are
/// smuggled inside the id string using the grammar
/// `<label>:-<conversation_id>-<message_id>`, both ids non-negative decimal
/// integers. Any string not matching that grammar means "ids not yet known"
/// and decodes to `Pending`, never to an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageTag {
    Pending(String),
    Resolved(MessageRef),
}

impl MessageTag {
    pub fn parse(raw: &str) -> Self {
        let Some((_, tail)) = raw.split_once(":-") else {
            return MessageTag::Pending(raw.to_string());
        };
        let Some((conv, msg)) = tail.split_once('-') else {
            return MessageTag::Pending(raw.to_string());
        };
        match (conv.parse::<i64>(), msg.parse::<i64>()) {
            (Ok(conversation_id), Ok(message_id)) if conversation_id >= 0 && message_id >= 0 => {
                MessageTag::Resolved(MessageRef {
                    conversation_id,
                    message_id,
                })
            }
            _ => MessageTag::Pending(raw.to_string()),
        }
    }

    pub fn encode(label: &str, target: MessageRef) -> String {
        format!("{}:-{}-{}", label, target.conversation_id, target.message_id)
    }
}

/// --- CORE ROLES ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Per-message vote state as the upstream reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoteState {
    #[default]
    None,
    Praise,
    Criticism,
}

impl VoteState {
    /// Upstream sends `vote_status` as `"praise"`, `"criticism"`, or null.
    /// Unknown strings read as no vote.
    pub fn from_upstream(raw: Option<&str>) -> Self {
        match raw {
            Some("praise") => VoteState::Praise,
            Some("criticism") => VoteState::Criticism,
            _ => VoteState::None,
        }
    }

    pub fn to_upstream(self) -> Option<&'static str> {
        match self {
            VoteState::None => None,
            VoteState::Praise => Some("praise"),
            VoteState::Criticism => Some("criticism"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

/// The upstream's four-way vote mutation vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interaction {
    AddPraise,
    CancelPraise,
    AddCriticism,
    CancelCriticism,
}

impl Interaction {
    pub fn as_str(self) -> &'static str {
        match self {
            Interaction::AddPraise => "add_praise",
            Interaction::CancelPraise => "cancel_praise",
            Interaction::AddCriticism => "add_criticism",
            Interaction::CancelCriticism => "cancel_criticism",
        }
    }

    pub fn from_str_opt(raw: &str) -> Option<Self> {
        match raw {
            "add_praise" => Some(Interaction::AddPraise),
            "cancel_praise" => Some(Interaction::CancelPraise),
            "add_criticism" => Some(Interaction::AddCriticism),
            "cancel_criticism" => Some(Interaction::CancelCriticism),
            _ => None,
        }
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PalaverError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unauthorized")]
    SessionMissing,

    #[error("Missing upstream session token")]
    UpstreamTokenMissing,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unresolved identity: {0}")]
    UnresolvedIdentity(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream error (status {0}): {1}")]
    Upstream(StatusCode, String),

    #[error("Internal error: {0}")]
    Internal(String, SpanTrace),
}

impl axum::response::IntoResponse for ObservedError {
    fn into_response(self) -> axum::response::Response {
        // Upstream status codes and bodies stay in the server log; the
        // browser only ever sees a generic gateway failure for those.
        let (status, msg, code) = match &self.inner {
            PalaverError::SessionMissing => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized".to_string(),
                "NO_SESSION",
            ),
            PalaverError::UpstreamTokenMissing => (
                StatusCode::UNAUTHORIZED,
                "Missing upstream session token".to_string(),
                "MISSING_UPSTREAM_TOKEN",
            ),
            PalaverError::InvalidRequest(m) => {
                (StatusCode::BAD_REQUEST, m.clone(), "INVALID_REQUEST")
            }
            PalaverError::UnresolvedIdentity(m) => (
                StatusCode::BAD_REQUEST,
                format!("{}. Please retry once the page has updated.", m),
                "UNRESOLVED_IDENTITY",
            ),
            PalaverError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone(), "NOT_FOUND"),
            PalaverError::Upstream(status, body) => {
                tracing::error!("upstream request failed (status {}): {}", status, body);
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream request failed".to_string(),
                    "UPSTREAM_ERROR",
                )
            }
            PalaverError::Network(e) => {
                tracing::error!("upstream network failure: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream request failed".to_string(),
                    "NETWORK_ERROR",
                )
            }
            PalaverError::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
                "SERIALIZATION_ERROR",
            ),
            PalaverError::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
                "IO_ERROR",
            ),
            PalaverError::Internal(m, _) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                m.clone(),
                "INTERNAL_ERROR",
            ),
        };
        (
            status,
            axum::Json(serde_json::json!({
                "error": msg,
                "code": code,
            })),
        )
            .into_response()
    }
}

#[derive(Debug)]
pub struct ObservedError {
    pub inner: PalaverError,
    pub span_trace: SpanTrace,
}

impl fmt::Display for ObservedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n\nSpan Trace:\n{}", self.inner, self.span_trace)
    }
}

impl std::error::Error for ObservedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner)
    }
}

impl<E> From<E> for ObservedError
where
    E: Into<PalaverError>,
{
    fn from(error: E) -> Self {
        Self {
            inner: error.into(),
            span_trace: SpanTrace::capture(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ObservedError>;
