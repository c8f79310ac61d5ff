use palaver::sse::{FrameParser, StreamEvent};
use palaver::types::MessageRef;

fn transcript() -> String {
    [
        r#"data: {"id":"chatcmpl-1","choices":[{"delta":{"content":"Hé"}}]}"#,
        r#"data: {"id":"chatcmpl-1","choices":[{"delta":{"content":"llo ⚡"}}]}"#,
        r#"data: {"id":"abc:-555-9001","choices":[{"delta":{"content":"!"}}]}"#,
        r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        "data: [DONE]",
        "",
    ]
    .join("\n")
}

fn parse_in_chunks(input: &str, chunk_size: usize) -> Vec<StreamEvent> {
    let mut parser = FrameParser::new();
    let mut events = Vec::new();
    for chunk in input.as_bytes().chunks(chunk_size) {
        events.extend(parser.push(chunk));
    }
    events.extend(parser.finish());
    events
}

#[test]
fn events_are_invariant_under_chunk_boundaries() {
    let input = transcript();
    let reference = parse_in_chunks(&input, input.len());
    assert_eq!(
        reference,
        vec![
            StreamEvent::Delta("Hé".to_string()),
            StreamEvent::Delta("llo ⚡".to_string()),
            StreamEvent::Delta("!".to_string()),
            StreamEvent::IdentityObserved(MessageRef {
                conversation_id: 555,
                message_id: 9001,
            }),
        ]
    );

    for chunk_size in [1, 2, 3, 7, 16, 64] {
        assert_eq!(
            parse_in_chunks(&input, chunk_size),
            reference,
            "chunk size {} diverged",
            chunk_size
        );
    }
}

#[test]
fn malformed_frames_do_not_disturb_the_rest_of_the_stream() {
    let input = [
        r#"data: {"choices":[{"delta":{"content":"good"}}]}"#,
        "data: {not json at all",
        r#"data: ["unexpected","shape"]"#,
        "data: 42",
        r#"data: {"choices":[{"delta":{"content":"still good"}}]}"#,
        "",
    ]
    .join("\n");

    let mut parser = FrameParser::new();
    let mut events = parser.push(input.as_bytes());
    events.extend(parser.finish());
    assert_eq!(
        events,
        vec![
            StreamEvent::Delta("good".to_string()),
            StreamEvent::Delta("still good".to_string()),
        ]
    );
}

#[test]
fn delta_and_identity_in_one_frame_keep_text_first() {
    let mut parser = FrameParser::new();
    let events =
        parser.push(b"data: {\"id\":\"x:-1-2\",\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n");
    assert_eq!(
        events,
        vec![
            StreamEvent::Delta("hi".to_string()),
            StreamEvent::IdentityObserved(MessageRef {
                conversation_id: 1,
                message_id: 2,
            }),
        ]
    );
}
