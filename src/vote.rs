use crate::constants::UPSTREAM_FETCH_PAGE_SIZE;
use crate::reconcile::ConversationRegistry;
use crate::types::{
    ChatId, Interaction, MessageRef, MessageTag, PalaverError, Result, VoteDirection, VoteState,
};
use crate::upstream::{HistoryItem, InteractionRequest, UpstreamClient};
use serde::Serialize;

/// One vote as presented to the browser, derived from upstream history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteView {
    pub chat_id: i64,
    pub message_id: i64,
    pub is_upvoted: bool,
}

/// Maps a vote press onto the upstream's four-way interaction vocabulary.
///
/// Pressing the direction that matches the current state cancels it;
/// pressing the other direction replaces it with a single add call, which
/// the upstream treats as superseding the previous vote.
pub fn toggle(current: VoteState, direction: VoteDirection) -> (Interaction, VoteState) {
    match (direction, current) {
        (VoteDirection::Up, VoteState::Praise) => (Interaction::CancelPraise, VoteState::None),
        (VoteDirection::Up, _) => (Interaction::AddPraise, VoteState::Praise),
        (VoteDirection::Down, VoteState::Criticism) => {
            (Interaction::CancelCriticism, VoteState::None)
        }
        (VoteDirection::Down, _) => (Interaction::AddCriticism, VoteState::Criticism),
    }
}

/// Works out which upstream message a vote press is aimed at.
///
/// The encoded message id carries both real ids once the stream has revealed
/// them; before that, the chat id may still resolve through the registry. A
/// target that cannot be pinned down yet is a retryable client error, never
/// a guess.
pub fn resolve_vote_target(
    chat_id: &str,
    message_id: &str,
    registry: &ConversationRegistry,
) -> Result<MessageRef> {
    if let MessageTag::Resolved(target) = MessageTag::parse(message_id) {
        return Ok(target);
    }

    let real_message_id = match message_id.parse::<i64>() {
        Ok(n) if n >= 0 => n,
        _ => {
            return Err(PalaverError::UnresolvedIdentity(format!(
                "Message id {:?} has no upstream identity yet",
                message_id
            ))
            .into())
        }
    };

    let real_conversation_id = match ChatId::parse(chat_id) {
        ChatId::Real(id) => id,
        ChatId::Placeholder(placeholder) => {
            registry.resolve(&placeholder).ok_or_else(|| {
                PalaverError::UnresolvedIdentity(format!(
                    "Conversation {:?} has no upstream identity yet",
                    placeholder
                ))
            })?
        }
    };

    Ok(MessageRef {
        conversation_id: real_conversation_id,
        message_id: real_message_id,
    })
}

/// Applies one vote press end to end: reads the current state from history,
/// toggles it, and issues exactly one interaction call. Returns the settled
/// vote state.
pub async fn apply_vote(
    upstream: &UpstreamClient,
    token: &str,
    target: MessageRef,
    direction: VoteDirection,
) -> Result<VoteState> {
    let history = upstream
        .get_chat_history(token, target.conversation_id, 1, UPSTREAM_FETCH_PAGE_SIZE)
        .await?;

    let current = history
        .items
        .iter()
        .find(|item| item.msg_id == target.message_id)
        .map(|item| VoteState::from_upstream(item.vote_status.as_deref()))
        .unwrap_or_default();

    let (interaction, next) = toggle(current, direction);
    tracing::info!(
        "vote on {}/{}: {:?} -> {} -> {:?}",
        target.conversation_id,
        target.message_id,
        current,
        interaction,
        next
    );

    let response = upstream
        .interact(
            token,
            &InteractionRequest {
                conversation_id: target.conversation_id,
                msg_id: target.message_id,
                interaction_type: interaction,
            },
        )
        .await?;

    // The upstream echoes the stored state back; trust it over our local
    // prediction when it answers.
    let settled = match response.vote_status.as_deref() {
        Some(raw) => VoteState::from_upstream(Some(raw)),
        None => next,
    };

    Ok(settled)
}

/// Projects voted messages out of a history page.
pub fn votes_from_history(items: &[HistoryItem]) -> Vec<VoteView> {
    items
        .iter()
        .filter_map(|item| {
            match VoteState::from_upstream(item.vote_status.as_deref()) {
                VoteState::None => None,
                state => Some(VoteView {
                    chat_id: item.conversation_id,
                    message_id: item.msg_id,
                    is_upvoted: state == VoteState::Praise,
                }),
            }
        })
        .collect()
}
