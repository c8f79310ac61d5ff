use crate::constants::{MAX_STREAM_FRAMES, STREAM_DONE_MARKER};
use crate::logging::StreamMetric;
use crate::reconcile::ConversationRegistry;
use crate::sse::{FrameParser, StreamEvent};
use crate::types::PalaverError;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One frame on the wire towards the browser, serialized as the payload of
/// one SSE `data:` event. The stream is terminated by a literal `[DONE]`
/// data frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum RelayFrame {
    /// Incremental assistant text, forwarded in arrival order.
    Delta(String),
    /// The real conversation id, sent once so the browser can rewrite its
    /// route without reloading in-flight state.
    ConversationId(i64),
}

pub struct RelayHandler;

impl RelayHandler {
    /// Drives one upstream byte stream to completion, forwarding frames to
    /// the downstream SSE channel.
    ///
    /// Deltas are forwarded the moment the parser yields them. When the
    /// stream reveals its identity and the inbound request used a
    /// placeholder id, the binding is recorded in the registry before the
    /// id frame goes out. Each Ok item is the payload of one SSE data
    /// event. The `[DONE]` terminator is sent exactly once on every exit
    /// path; a failed channel send means the consumer went away, at which
    /// point the read loop stops and dropping the byte stream releases the
    /// upstream connection. The request id is passed in because this runs
    /// on a spawned task outside the request span.
    pub async fn run<R>(
        request_id: String,
        mut bytes_stream: R,
        placeholder: Option<String>,
        registry: Arc<ConversationRegistry>,
        tx: mpsc::Sender<std::result::Result<String, PalaverError>>,
    ) where
        R: Stream<Item = std::result::Result<Bytes, std::io::Error>> + Unpin + Send,
    {
        let start = std::time::Instant::now();
        let mut parser = FrameParser::new();
        let mut metrics = StreamMetric::new(request_id);
        let mut frame_count = 0usize;
        let mut consumer_gone = false;

        'read: while let Some(chunk) = bytes_stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::error!("upstream read error: {}", e);
                    let _ = tx.send(Err(PalaverError::Io(e))).await;
                    break 'read;
                }
            };

            for event in parser.push(&chunk) {
                frame_count += 1;
                if frame_count > MAX_STREAM_FRAMES {
                    tracing::error!("stream exceeded max frame limit ({})", MAX_STREAM_FRAMES);
                    let _ = tx
                        .send(Err(PalaverError::Internal(
                            "Stream exceeded max frame limit".to_string(),
                            tracing_error::SpanTrace::capture(),
                        )))
                        .await;
                    break 'read;
                }
                if Self::forward(event, &placeholder, &registry, &tx, &mut metrics)
                    .await
                    .is_err()
                {
                    consumer_gone = true;
                    break 'read;
                }
            }
        }

        if !consumer_gone {
            for event in parser.finish() {
                if Self::forward(event, &placeholder, &registry, &tx, &mut metrics)
                    .await
                    .is_err()
                {
                    consumer_gone = true;
                    break;
                }
            }
        }

        metrics.log_summary(start.elapsed());

        if tx.send(Ok(STREAM_DONE_MARKER.to_string())).await.is_err() {
            tracing::trace!("client disconnected before stream end");
        }
    }

    /// Err means the consumer dropped the receiving end.
    async fn forward(
        event: StreamEvent,
        placeholder: &Option<String>,
        registry: &ConversationRegistry,
        tx: &mpsc::Sender<std::result::Result<String, PalaverError>>,
        metrics: &mut StreamMetric,
    ) -> std::result::Result<(), ()> {
        metrics.record(&event);
        let frame = match event {
            StreamEvent::Delta(content) => RelayFrame::Delta(content),
            StreamEvent::IdentityObserved(target) => {
                if let Some(placeholder) = placeholder {
                    registry.observe(placeholder, target.conversation_id);
                }
                RelayFrame::ConversationId(target.conversation_id)
            }
        };
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("failed to serialize relay frame: {}", e);
                return Ok(());
            }
        };
        tx.send(Ok(json)).await.map_err(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_frame_wire_shapes() {
        let delta = serde_json::to_value(RelayFrame::Delta("He".to_string())).unwrap();
        assert_eq!(
            delta,
            serde_json::json!({"type": "delta", "content": "He"})
        );

        let cid = serde_json::to_value(RelayFrame::ConversationId(555)).unwrap();
        assert_eq!(
            cid,
            serde_json::json!({"type": "conversation_id", "content": 555})
        );
    }
}
