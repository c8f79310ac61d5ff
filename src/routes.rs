use crate::constants::UPSTREAM_FETCH_PAGE_SIZE;
use crate::history::{self, ChatSummary, UiMessage};
use crate::logging;
use crate::main_helper::AppState;
use crate::relay::RelayHandler;
use crate::session::Session;
use crate::types::{ChatId, Interaction, PalaverError, Result, Role, VoteDirection};
use crate::upstream::{CompletionRequest, InteractionRequest, OutboundMessage};
use crate::vote::{self, VoteView};
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat).delete(delete_chat))
        .route("/api/chat/message", delete(delete_message))
        .route("/api/chat/interaction", post(interaction))
        .route("/api/chat/detail", get(chat_detail))
        .route("/api/chat/messages", get(chat_messages))
        .route("/api/chat/message-metadata", get(message_metadata))
        .route("/api/vote", get(get_votes).patch(patch_vote))
        .route("/api/history", get(list_history))
        .route("/api/conversation-id", get(conversation_id))
        .route("/api/app-config", get(app_config))
        .route("/health", get(health))
        .layer(axum::middleware::from_fn(logging::request_id_middleware))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub id: String,
    pub messages: Vec<OutboundMessage>,
    #[serde(default)]
    pub selected_chat_model: Option<String>,
}

/// Opens one upstream completion stream and relays it as SSE.
///
/// A placeholder chat id that is already bound continues the real
/// conversation; an unbound one starts a new conversation upstream, whose
/// real id the relay records as soon as the stream reveals it.
async fn chat(
    State(state): State<AppState>,
    session: Session,
    headers: axum::http::HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<axum::response::Response> {
    let token = session.upstream_token()?.to_string();
    match request.messages.last() {
        Some(last) if last.role == Role::User => {}
        Some(_) => {
            return Err(PalaverError::InvalidRequest(
                "last message must be a user message".to_string(),
            )
            .into())
        }
        None => {
            return Err(
                PalaverError::InvalidRequest("messages must not be empty".to_string()).into(),
            )
        }
    }

    let (conversation_id, placeholder) = match ChatId::parse(&request.id) {
        ChatId::Real(id) => (Some(id), None),
        ChatId::Placeholder(p) => (state.registry.resolve(&p), Some(p)),
    };

    let model = request
        .selected_chat_model
        .unwrap_or_else(|| state.args.model.clone());
    let body = CompletionRequest::streaming(model, request.messages, conversation_id);

    // The stream opens before the SSE response starts, so connection and
    // auth failures still surface as plain HTTP errors.
    let response = state.upstream.open_chat_stream(&token, &body).await?;

    let request_id = headers
        .get(logging::REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let (tx, rx) = mpsc::channel::<std::result::Result<String, PalaverError>>(100);
    let registry = state.registry.clone();
    let span = tracing::info_span!("stream", request_id = %request_id);
    tokio::spawn(
        async move {
            use futures_util::TryStreamExt;
            let bytes = Box::pin(
                response
                    .bytes_stream()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
            );
            RelayHandler::run(request_id, bytes, placeholder, registry, tx).await;
        }
        .instrument(span),
    );

    let stream = ReceiverStream::new(rx).map(|item| item.map(|data| Event::default().data(data)));

    Ok(Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text(": keepalive"),
        )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ChatSelector {
    pub id: String,
}

async fn delete_chat(
    State(state): State<AppState>,
    session: Session,
    Query(selector): Query<ChatSelector>,
) -> Result<Json<serde_json::Value>> {
    let token = session.upstream_token()?;
    let conversation_id = resolve_chat_id(&state, &selector.id)?;
    state
        .upstream
        .delete_conversation(token, conversation_id)
        .await?;
    Ok(Json(serde_json::json!({ "id": conversation_id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSelector {
    pub chat_id: String,
    pub message_id: String,
}

async fn delete_message(
    State(state): State<AppState>,
    session: Session,
    Query(selector): Query<MessageSelector>,
) -> Result<Json<serde_json::Value>> {
    let token = session.upstream_token()?;
    let target = vote::resolve_vote_target(&selector.chat_id, &selector.message_id, &state.registry)?;
    state
        .upstream
        .delete_message(token, target.conversation_id, target.message_id)
        .await?;
    Ok(Json(serde_json::json!({
        "conversationId": target.conversation_id,
        "messageId": target.message_id,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionBody {
    pub conversation_id: i64,
    pub msg_id: i64,
    pub interaction_type: String,
}

/// Thin passthrough for explicit interaction mutations; the vote endpoint
/// is the toggling front door, this one takes the upstream vocabulary as is.
async fn interaction(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<InteractionBody>,
) -> Result<Json<serde_json::Value>> {
    let token = session.upstream_token()?;
    let interaction = Interaction::from_str_opt(&body.interaction_type).ok_or_else(|| {
        PalaverError::InvalidRequest(format!(
            "unknown interaction type {:?}",
            body.interaction_type
        ))
    })?;
    let response = state
        .upstream
        .interact(
            token,
            &InteractionRequest {
                conversation_id: body.conversation_id,
                msg_id: body.msg_id,
                interaction_type: interaction,
            },
        )
        .await?;
    Ok(Json(serde_json::json!({ "voteStatus": response.vote_status })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatIdQuery {
    pub chat_id: String,
}

async fn chat_detail(
    State(state): State<AppState>,
    session: Session,
    Query(selector): Query<ChatSelector>,
) -> Result<Json<ChatSummary>> {
    let token = session.upstream_token()?;
    let conversation_id = resolve_chat_id(&state, &selector.id)?;
    let record = state
        .upstream
        .conversation_detail(token, conversation_id)
        .await?;
    Ok(Json(history::summarize_conversation(&record)))
}

async fn chat_messages(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ChatIdQuery>,
) -> Result<Json<Vec<UiMessage>>> {
    let token = session.upstream_token()?;
    let conversation_id = match try_resolve_chat_id(&state, &query.chat_id) {
        Some(id) => id,
        // Nothing streamed yet, so there is nothing to fetch.
        None => return Ok(Json(Vec::new())),
    };
    let page = state
        .upstream
        .get_chat_history(token, conversation_id, 1, UPSTREAM_FETCH_PAGE_SIZE)
        .await?;
    Ok(Json(history::messages_from_history(page.items)))
}

/// Finds the real upstream identity of one message by scanning history.
/// Only real conversation ids qualify; a placeholder that never resolved
/// has no history to scan.
async fn message_metadata(
    State(state): State<AppState>,
    session: Session,
    Query(selector): Query<MessageSelector>,
) -> Result<Json<serde_json::Value>> {
    let token = session.upstream_token()?;
    let conversation_id = match ChatId::parse(&selector.chat_id) {
        ChatId::Real(id) => id,
        ChatId::Placeholder(p) => {
            return Err(PalaverError::InvalidRequest(format!(
                "cannot get metadata for conversation {:?}",
                p
            ))
            .into())
        }
    };
    let message_id = selector.message_id.parse::<i64>().map_err(|_| {
        PalaverError::InvalidRequest(format!("invalid message id {:?}", selector.message_id))
    })?;

    let page = state
        .upstream
        .get_chat_history(token, conversation_id, 1, UPSTREAM_FETCH_PAGE_SIZE)
        .await?;
    let found = page.items.iter().find(|item| item.msg_id == message_id);
    match found {
        Some(item) => Ok(Json(serde_json::json!({
            "conversation_id": conversation_id,
            "msg_id": item.msg_id,
        }))),
        None => Err(PalaverError::NotFound("Message not found".to_string()).into()),
    }
}

async fn get_votes(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ChatIdQuery>,
) -> Result<Json<Vec<VoteView>>> {
    let token = session.upstream_token()?;
    let conversation_id = match try_resolve_chat_id(&state, &query.chat_id) {
        Some(id) => id,
        None => return Ok(Json(Vec::new())),
    };
    let page = state
        .upstream
        .get_chat_history(token, conversation_id, 1, UPSTREAM_FETCH_PAGE_SIZE)
        .await?;
    Ok(Json(vote::votes_from_history(&page.items)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteBody {
    pub chat_id: String,
    pub message_id: String,
    #[serde(rename = "type")]
    pub direction: VoteDirection,
}

async fn patch_vote(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<VoteBody>,
) -> Result<Json<serde_json::Value>> {
    let token = session.upstream_token()?;
    let target = vote::resolve_vote_target(&body.chat_id, &body.message_id, &state.registry)?;
    let settled = vote::apply_vote(&state.upstream, token, target, body.direction).await?;
    Ok(Json(serde_json::json!({ "vote_status": settled.to_upstream() })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    10
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub chats: Vec<ChatSummary>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u32,
}

async fn list_history(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    let token = session.upstream_token()?;
    let page = state
        .upstream
        .list_conversations(token, query.page, query.page_size)
        .await?;
    Ok(Json(HistoryResponse {
        chats: page
            .items
            .iter()
            .map(history::summarize_conversation)
            .collect(),
        page: page.pagination.page,
        page_size: page.pagination.page_size,
        total: page.pagination.total,
        total_pages: page.pagination.total_pages,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderQuery {
    pub temp_id: String,
}

/// Lets the browser poll whether a placeholder has settled into a real id.
async fn conversation_id(
    State(state): State<AppState>,
    _session: Session,
    Query(query): Query<PlaceholderQuery>,
) -> Json<serde_json::Value> {
    let resolved = state.registry.resolve(&query.temp_id);
    Json(serde_json::json!({ "conversationId": resolved }))
}

fn default_app_config() -> serde_json::Value {
    serde_json::json!({
        "support_email": "support@example.com",
        "chat_introduction": "Hi! Ask me anything to get started.",
        "chat_suggestions": [
            "What can you help me with?",
            "Summarize my last conversation",
        ],
    })
}

/// Presentation settings for the UI. Falls back to a static default when
/// the upstream config endpoint is unavailable, so the page still renders.
async fn app_config(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<serde_json::Value>> {
    let token = session.upstream_token()?;
    match state.upstream.get_app_config(token).await {
        Ok(config) => Ok(Json(config)),
        Err(e) => {
            tracing::warn!("falling back to default app config: {}", e);
            Ok(Json(default_app_config()))
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Chat id for endpoints that require a real conversation.
fn resolve_chat_id(state: &AppState, raw: &str) -> Result<i64> {
    try_resolve_chat_id(state, raw).ok_or_else(|| {
        PalaverError::UnresolvedIdentity(format!(
            "Conversation {:?} has no upstream identity yet",
            raw
        ))
        .into()
    })
}

/// Chat id for endpoints where "not yet known" means an empty result.
fn try_resolve_chat_id(state: &AppState, raw: &str) -> Option<i64> {
    match ChatId::parse(raw) {
        ChatId::Real(id) => Some(id),
        ChatId::Placeholder(p) => state.registry.resolve(&p),
    }
}
