use crate::types::{MessageRef, MessageTag, Role};
use crate::upstream::{ConversationRecord, HistoryItem};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Label prefixed onto encoded message ids handed to the browser.
const MESSAGE_TAG_LABEL: &str = "msg";

/// One conversation row for the sidebar listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// One rendered message in a conversation view. The id carries the real
/// upstream identity in encoded form so later vote presses can decode it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

fn epoch_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

pub fn summarize_conversation(record: &ConversationRecord) -> ChatSummary {
    ChatSummary {
        id: record.id.to_string(),
        title: record
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("Conversation {}", record.id)),
        created_at: epoch_secs(record.start_time),
        last_activity_at: epoch_secs(record.last_interaction_time),
    }
}

/// Orders a history page and reshapes it for rendering.
///
/// The upstream labels assistant turns `system`; both render as assistant.
/// Items are ordered by timestamp with the message id breaking ties, since
/// bursts within one second share a timestamp.
pub fn messages_from_history(mut items: Vec<HistoryItem>) -> Vec<UiMessage> {
    items.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.msg_id.cmp(&b.msg_id))
    });

    items
        .into_iter()
        .map(|item| {
            let role = match item.msg_type.as_str() {
                "user" => Role::User,
                _ => Role::Assistant,
            };
            UiMessage {
                id: MessageTag::encode(
                    MESSAGE_TAG_LABEL,
                    MessageRef {
                        conversation_id: item.conversation_id,
                        message_id: item.msg_id,
                    },
                ),
                role,
                content: item.message,
                created_at: epoch_secs(item.timestamp),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(msg_id: i64, msg_type: &str, timestamp: i64) -> HistoryItem {
        HistoryItem {
            msg_id,
            conversation_id: 555,
            message: format!("m{}", msg_id),
            msg_type: msg_type.to_string(),
            timestamp,
            vote_status: None,
        }
    }

    #[test]
    fn messages_sort_by_timestamp_then_id() {
        let out = messages_from_history(vec![
            item(3, "system", 200),
            item(2, "system", 100),
            item(1, "user", 100),
        ]);
        let ids: Vec<&str> = out.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["msg:-555-1", "msg:-555-2", "msg:-555-3"]);
    }

    #[test]
    fn system_messages_render_as_assistant() {
        let out = messages_from_history(vec![item(1, "user", 1), item(2, "system", 2)]);
        assert_eq!(out[0].role, Role::User);
        assert_eq!(out[1].role, Role::Assistant);
    }

    #[test]
    fn summary_falls_back_to_generated_title() {
        let record = ConversationRecord {
            id: 42,
            title: Some("  ".to_string()),
            start_time: 1_700_000_000,
            last_interaction_time: 1_700_000_100,
        };
        let summary = summarize_conversation(&record);
        assert_eq!(summary.title, "Conversation 42");
        assert_eq!(summary.id, "42");
    }
}
