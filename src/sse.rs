use crate::constants::{SSE_DATA_PREFIX, STREAM_DONE_MARKER};
use crate::types::{MessageRef, MessageTag};
use serde::Deserialize;

/// One logical event extracted from the upstream SSE stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An incremental fragment of assistant text.
    Delta(String),
    /// The upstream revealed which conversation/message this stream belongs
    /// to. Emitted at most once per stream.
    IdentityObserved(MessageRef),
}

/// Strict schema for one upstream frame; every field is optional and an
/// absent field is a normal skip branch, not a parse failure.
#[derive(Debug, Deserialize)]
pub struct UpstreamFrame {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<i64>,
    #[serde(default)]
    pub msg_id: Option<i64>,
    #[serde(default)]
    pub choices: Vec<FrameChoice>,
}

#[derive(Debug, Deserialize)]
pub struct FrameChoice {
    #[serde(default)]
    pub delta: FrameDelta,
}

#[derive(Debug, Default, Deserialize)]
pub struct FrameDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl UpstreamFrame {
    /// Pulls the conversation/message identity out of a frame, either from
    /// explicit numeric fields or from the encoded id string.
    fn identity(&self) -> Option<MessageRef> {
        if let (Some(conversation_id), Some(message_id)) = (self.conversation_id, self.msg_id) {
            return Some(MessageRef {
                conversation_id,
                message_id,
            });
        }
        match self.id.as_deref().map(MessageTag::parse) {
            Some(MessageTag::Resolved(target)) => Some(target),
            _ => None,
        }
    }

    fn delta_content(&self) -> Option<&str> {
        let content = self.choices.first()?.delta.content.as_deref()?;
        if content.is_empty() {
            None
        } else {
            Some(content)
        }
    }
}

/// Incremental parser for the upstream `data: <json>` line protocol.
///
/// Byte chunks do not align with logical lines, so a partial trailing line
/// is carried between `push` calls. Lines that are not `data:` frames, the
/// `[DONE]` sentinel, empty payloads, and payloads without the expected
/// fields all produce no events; a line that fails JSON parsing is logged
/// and skipped rather than aborting the stream.
#[derive(Debug, Default)]
pub struct FrameParser {
    // Raw bytes: a chunk boundary can fall inside a multi-byte character,
    // so UTF-8 decoding happens per complete line, not per chunk.
    carry: Vec<u8>,
    identity_seen: bool,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one raw chunk and returns the events for every line it
    /// completed, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.carry.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.carry.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim_end_matches(['\r', '\n']), &mut events);
        }
        events
    }

    /// Flushes a final unterminated line at end of stream.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if !self.carry.is_empty() {
            let line = std::mem::take(&mut self.carry);
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim_end_matches('\r'), &mut events);
        }
        events
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<StreamEvent>) {
        let Some(payload) = line.strip_prefix(SSE_DATA_PREFIX) else {
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == STREAM_DONE_MARKER {
            return;
        }

        let frame = match serde_json::from_str::<UpstreamFrame>(payload) {
            Ok(frame) => frame,
            Err(e) => {
                let snippet: String = payload.chars().take(200).collect();
                tracing::warn!("skipping malformed stream line ({}): {}", e, snippet);
                return;
            }
        };

        if let Some(content) = frame.delta_content() {
            out.push(StreamEvent::Delta(content.to_string()));
        }

        if !self.identity_seen {
            if let Some(target) = frame.identity() {
                self.identity_seen = true;
                out.push(StreamEvent::IdentityObserved(target));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{}\"}}}}]}}\n",
            content
        )
    }

    #[test]
    fn extracts_deltas_in_order() {
        let mut parser = FrameParser::new();
        let input = format!("{}{}{}", frame("He"), frame("llo"), frame("!"));
        let events = parser.push(input.as_bytes());
        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("He".to_string()),
                StreamEvent::Delta("llo".to_string()),
                StreamEvent::Delta("!".to_string()),
            ]
        );
    }

    #[test]
    fn carries_partial_lines_across_chunks() {
        let mut parser = FrameParser::new();
        let whole = frame("Hello");
        let (a, b) = whole.split_at(17);
        assert!(parser.push(a.as_bytes()).is_empty());
        assert_eq!(
            parser.push(b.as_bytes()),
            vec![StreamEvent::Delta("Hello".to_string())]
        );
    }

    #[test]
    fn done_sentinel_and_blank_lines_yield_nothing() {
        let mut parser = FrameParser::new();
        let events = parser.push(b"\ndata:\ndata: [DONE]\n: keepalive\n");
        assert!(events.is_empty());
    }

    #[test]
    fn json_without_expected_fields_is_skipped_silently() {
        let mut parser = FrameParser::new();
        assert!(parser.push(b"data: {\"usage\":{\"total_tokens\":5}}\n").is_empty());
        assert!(parser.push(b"data: {\"choices\":[{\"delta\":{}}]}\n").is_empty());
    }

    #[test]
    fn identity_from_encoded_id_is_one_shot() {
        let mut parser = FrameParser::new();
        let events = parser.push(b"data: {\"id\":\"abc:-555-9001\",\"choices\":[]}\ndata: {\"id\":\"abc:-777-1\",\"choices\":[]}\n");
        assert_eq!(
            events,
            vec![StreamEvent::IdentityObserved(MessageRef {
                conversation_id: 555,
                message_id: 9001,
            })]
        );
    }

    #[test]
    fn identity_from_numeric_fields() {
        let mut parser = FrameParser::new();
        let events = parser.push(b"data: {\"conversation_id\":42,\"msg_id\":7,\"choices\":[]}\n");
        assert_eq!(
            events,
            vec![StreamEvent::IdentityObserved(MessageRef {
                conversation_id: 42,
                message_id: 7,
            })]
        );
    }

    #[test]
    fn opaque_id_does_not_count_as_identity() {
        let mut parser = FrameParser::new();
        let events =
            parser.push(b"data: {\"id\":\"chatcmpl-xyz\",\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n");
        assert_eq!(events, vec![StreamEvent::Delta("x".to_string())]);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut parser = FrameParser::new();
        let whole = frame("tail");
        assert!(parser.push(whole.trim_end().as_bytes()).is_empty());
        assert_eq!(
            parser.finish(),
            vec![StreamEvent::Delta("tail".to_string())]
        );
    }
}
