use crate::constants::*;
use crate::types::{Interaction, PalaverError, Result, Role};
use serde::{Deserialize, Serialize};

/// Outbound chat-completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<OutboundMessage>,
    pub stream: bool,
    pub conversation_id: Option<i64>,
    pub temperature: f64,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
    pub top_p: f64,
}

impl CompletionRequest {
    /// `conversation_id` is None for a new conversation, Some(real id) for a
    /// continuation.
    pub fn streaming(
        model: String,
        messages: Vec<OutboundMessage>,
        conversation_id: Option<i64>,
    ) -> Self {
        Self {
            model,
            messages,
            stream: true,
            conversation_id,
            temperature: DEFAULT_TEMPERATURE,
            presence_penalty: DEFAULT_PRESENCE_PENALTY,
            frequency_penalty: DEFAULT_FREQUENCY_PENALTY,
            top_p: DEFAULT_TOP_P,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

/// One conversation record from the upstream listing endpoints. Timestamps
/// are seconds since the epoch.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationRecord {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub start_time: i64,
    pub last_interaction_time: i64,
}

#[derive(Debug, Deserialize)]
pub struct ConversationPage {
    pub items: Vec<ConversationRecord>,
    pub pagination: Pagination,
}

/// One message record from the upstream chat-history endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryItem {
    pub msg_id: i64,
    pub conversation_id: i64,
    pub message: String,
    pub msg_type: String,
    pub timestamp: i64,
    #[serde(default)]
    pub vote_status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryPage {
    pub items: Vec<HistoryItem>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct InteractionRequest {
    pub conversation_id: i64,
    pub msg_id: i64,
    pub interaction_type: Interaction,
}

#[derive(Debug, Deserialize)]
pub struct InteractionResponse {
    #[serde(default)]
    pub vote_status: Option<String>,
}

/// Client for the external chat service.
///
/// The completion endpoint authenticates with a bearer token; the REST
/// endpoints take the same token in a custom session header. Neither path
/// retries: a non-2xx response surfaces as `Upstream` with the raw status
/// and body, a connection failure as `Network`.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    // Applied per REST call; the streaming endpoint stays open indefinitely.
    rest_timeout: std::time::Duration,
}

impl UpstreamClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        rest_timeout: std::time::Duration,
    ) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http,
            base_url,
            rest_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Opens the streaming completion request. On HTTP success the returned
    /// response owns the live connection; the caller must drain or drop it.
    pub async fn open_chat_stream(
        &self,
        token: &str,
        request: &CompletionRequest,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, UPSTREAM_COMPLETIONS_PATH);
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .json(request)
            .send()
            .await
            .map_err(PalaverError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(text) => text,
                Err(_) => "Unknown error (failed to read response text)".to_string(),
            };
            return Err(PalaverError::Upstream(status, body).into());
        }
        Ok(response)
    }

    /// Presentation settings the UI renders (introduction text, suggestion
    /// chips, contact details). Loosely typed: the gateway forwards whatever
    /// the upstream defines.
    pub async fn get_app_config(&self, token: &str) -> Result<serde_json::Value> {
        self.get_json(UPSTREAM_APP_CONFIG_PATH, &[], token).await
    }

    pub async fn list_conversations(
        &self,
        token: &str,
        page: u32,
        page_size: u32,
    ) -> Result<ConversationPage> {
        self.get_json(
            UPSTREAM_CONVERSATIONS_PATH,
            &[
                ("page", page.to_string()),
                ("page_size", page_size.to_string()),
            ],
            token,
        )
        .await
    }

    pub async fn conversation_detail(
        &self,
        token: &str,
        conversation_id: i64,
    ) -> Result<ConversationRecord> {
        self.get_json(
            UPSTREAM_CONVERSATION_DETAIL_PATH,
            &[("conversation_id", conversation_id.to_string())],
            token,
        )
        .await
    }

    pub async fn get_chat_history(
        &self,
        token: &str,
        conversation_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<HistoryPage> {
        self.get_json(
            UPSTREAM_HISTORY_PATH,
            &[
                ("page", page.to_string()),
                ("page_size", page_size.to_string()),
                ("conversation_id", conversation_id.to_string()),
            ],
            token,
        )
        .await
    }

    pub async fn delete_conversation(&self, token: &str, conversation_id: i64) -> Result<()> {
        let url = format!("{}{}", self.base_url, UPSTREAM_CONVERSATION_PATH);
        let response = self
            .http
            .delete(&url)
            .timeout(self.rest_timeout)
            .query(&[("conversation_id", conversation_id.to_string())])
            .header(UPSTREAM_SESSION_HEADER, token)
            .send()
            .await
            .map_err(PalaverError::Network)?;
        Self::expect_success(response).await.map(|_| ())
    }

    pub async fn delete_message(
        &self,
        token: &str,
        conversation_id: i64,
        msg_id: i64,
    ) -> Result<()> {
        let url = format!("{}{}", self.base_url, UPSTREAM_HISTORY_PATH);
        let response = self
            .http
            .delete(&url)
            .timeout(self.rest_timeout)
            .query(&[
                ("conversation_id", conversation_id.to_string()),
                ("msg_id", msg_id.to_string()),
            ])
            .header(UPSTREAM_SESSION_HEADER, token)
            .send()
            .await
            .map_err(PalaverError::Network)?;
        Self::expect_success(response).await.map(|_| ())
    }

    /// Issues exactly one interaction mutation; duplicate toggles become
    /// duplicate calls, resolved last-write-wins by the upstream.
    pub async fn interact(
        &self,
        token: &str,
        request: &InteractionRequest,
    ) -> Result<InteractionResponse> {
        let url = format!("{}{}", self.base_url, UPSTREAM_INTERACTION_PATH);
        let response = self
            .http
            .post(&url)
            .timeout(self.rest_timeout)
            .header(UPSTREAM_SESSION_HEADER, token)
            .json(request)
            .send()
            .await
            .map_err(PalaverError::Network)?;
        let response = Self::expect_success(response).await?;
        response
            .json::<InteractionResponse>()
            .await
            .map_err(|e| PalaverError::Network(e).into())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: &str,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .timeout(self.rest_timeout)
            .query(query)
            .header(UPSTREAM_SESSION_HEADER, token)
            .send()
            .await
            .map_err(PalaverError::Network)?;
        let response = Self::expect_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| PalaverError::Network(e).into())
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = match response.text().await {
            Ok(text) => text,
            Err(_) => "Unknown error (failed to read response text)".to_string(),
        };
        Err(PalaverError::Upstream(status, body).into())
    }
}
