//! Unit tests for identifier extraction from tool output.

use serde_json::{json, Value};

use deck_forge::workflow::session::{
    extract_session_id, extract_slide_count, extract_slide_index, PresentationSession, SessionId,
    PLACEHOLDER_SESSION_ID,
};

fn text(t: &str) -> Value {
    json!({ "content": [{ "type": "text", "text": t }] })
}

#[test]
fn session_id_is_parsed_from_text() {
    let id = extract_session_id(&text("Created new presentation with presentation_id: 3f2a-9bc0"));
    assert_eq!(id, SessionId::Extracted("3f2a-9bc0".into()));

    let id = extract_session_id(&text("PRESENTATION_ID 00ff"));
    assert_eq!(id, SessionId::Extracted("00ff".into()));
}

#[test]
fn structured_session_id_wins_over_text() {
    let result = json!({
        "structuredContent": { "presentation_id": "struct-id" },
        "content": [{ "type": "text", "text": "presentation_id: abc" }]
    });
    assert_eq!(extract_session_id(&result), SessionId::Extracted("struct-id".into()));
}

#[test]
fn missing_session_id_yields_placeholder() {
    let id = extract_session_id(&text("Presentation created"));
    assert!(id.is_placeholder());
    assert_eq!(id.as_str(), PLACEHOLDER_SESSION_ID);
    assert_eq!(id.to_string(), "default_presentation");
}

#[test]
fn session_arguments_carry_only_real_ids() {
    let real = PresentationSession::new(SessionId::Extracted("abc".into()));
    assert_eq!(
        real.arguments(json!({ "slide_index": 0 })),
        json!({ "slide_index": 0, "presentation_id": "abc" })
    );

    let placeholder = PresentationSession::new(SessionId::Placeholder);
    assert_eq!(
        placeholder.arguments(json!({ "slide_index": 0 })),
        json!({ "slide_index": 0 })
    );
}

#[test]
fn slide_index_prefers_structured_content() {
    let result = json!({ "structuredContent": { "slide_index": 4 } });
    assert_eq!(extract_slide_index(&result), Some(4));
}

#[test]
fn slide_count_comes_from_total_slides_line() {
    assert_eq!(
        extract_slide_count(&text("Presentation info\nTotal slides: 12\nLayouts: 9")),
        Some(12)
    );
    assert_eq!(extract_slide_count(&text("no count here")), None);
    assert_eq!(extract_slide_count(&json!(null)), None);
}
