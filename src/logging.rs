use crate::sse::StreamEvent;
use axum::{
    body::Body,
    http::{Request, Response},
    middleware::Next,
};
use std::panic;
use std::time::Duration;
use tracing::{error, info};
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-palaver-request-id";

/// Sets up a global panic hook that logs panics through tracing before the
/// original hook runs.
pub fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();

        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            target: "panic",
            message = %message,
            location = %location,
            backtrace = %backtrace,
            "FATAL: Application panicked"
        );

        original_hook(panic_info);
    }));
}

/// Tags every request with a fresh id and wraps the rest of the stack in a
/// span carrying it, so stream-task logs correlate back to the request.
pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response<Body> {
    let request_id = Uuid::new_v4().to_string();
    if let Ok(val) = request_id.parse() {
        req.headers_mut().insert(REQUEST_ID_HEADER, val);
    }

    let span = info_span!("request", request_id = %request_id);
    next.run(req).instrument(span).await
}

/// Per-stream counters, logged once when the relay loop finishes. Spawned
/// stream tasks do not inherit the request span, so the request id is
/// carried explicitly.
pub struct StreamMetric {
    request_id: String,
    pub deltas: usize,
    pub text_chars: usize,
    pub conversation_id: Option<i64>,
}

impl StreamMetric {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            deltas: 0,
            text_chars: 0,
            conversation_id: None,
        }
    }

    pub fn record(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Delta(content) => {
                self.deltas += 1;
                self.text_chars += content.len();
            }
            StreamEvent::IdentityObserved(target) => {
                self.conversation_id = Some(target.conversation_id);
            }
        }
    }

    fn summary(&self, elapsed: Duration) -> String {
        let conversation = match self.conversation_id {
            Some(id) => id.to_string(),
            None => "unknown".to_string(),
        };
        format!(
            "[STREAM END] RequestID: {} | Conversation: {} | Deltas: {} | Text: {} chars | Elapsed: {:?}",
            self.request_id, conversation, self.deltas, self.text_chars, elapsed
        )
    }

    pub fn log_summary(&self, elapsed: Duration) {
        info!(target: "flight_recorder", "{}", self.summary(elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageRef;

    #[test]
    fn metric_counts_deltas_and_identity() {
        let mut metric = StreamMetric::new("req-1");
        metric.record(&StreamEvent::Delta("He".to_string()));
        metric.record(&StreamEvent::Delta("llo".to_string()));
        metric.record(&StreamEvent::IdentityObserved(MessageRef {
            conversation_id: 555,
            message_id: 9001,
        }));
        assert_eq!(metric.deltas, 2);
        assert_eq!(metric.text_chars, 5);
        assert_eq!(metric.conversation_id, Some(555));
    }

    #[test]
    fn summary_carries_the_request_id() {
        let mut metric = StreamMetric::new("req-abc-123");
        metric.record(&StreamEvent::Delta("hi".to_string()));
        metric.record(&StreamEvent::IdentityObserved(MessageRef {
            conversation_id: 42,
            message_id: 7,
        }));
        let line = metric.summary(Duration::from_millis(10));
        assert!(line.contains("RequestID: req-abc-123"));
        assert!(line.contains("Conversation: 42"));
        assert!(line.contains("Deltas: 1"));
    }
}
