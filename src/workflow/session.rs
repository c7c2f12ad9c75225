//! Best-effort extraction of identifiers from free-form tool output.
//!
//! The tool server reports session ids, slide indices, and slide counts as
//! human-readable text. Everything parsed here is advisory: every consumer has
//! a fallback when extraction fails.

use std::fmt::{Display, Formatter};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::toolserver::invoker::tool_text;

/// Identifier used when the server's output names no session.
pub const PLACEHOLDER_SESSION_ID: &str = "default_presentation";

/// Advisory identifier of a server-side presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionId {
    /// Parsed from the server's response.
    Extracted(String),
    /// Nothing parseable; calls target the server's current presentation.
    Placeholder,
}

impl SessionId {
    /// The id string ([`PLACEHOLDER_SESSION_ID`] for the placeholder).
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Extracted(id) => id,
            Self::Placeholder => PLACEHOLDER_SESSION_ID,
        }
    }

    /// Whether the id is the synthesized placeholder.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }

    /// Add `presentation_id` to `arguments` when the id is real.
    ///
    /// The placeholder is never sent, so the server falls back to its
    /// implicit current presentation.
    pub fn attach(&self, arguments: &mut Map<String, Value>) {
        if let Self::Extracted(id) = self {
            arguments.insert("presentation_id".into(), Value::String(id.clone()));
        }
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One workflow run's view of the server-side presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationSession {
    /// Advisory session id.
    pub session_id: SessionId,
    /// Slides added so far in this run.
    pub slide_count: usize,
}

impl PresentationSession {
    /// Fresh session with no slides.
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            slide_count: 0,
        }
    }

    /// Tool arguments with `presentation_id` attached when known.
    #[must_use]
    pub fn arguments(&self, value: Value) -> Value {
        match value {
            Value::Object(mut map) => {
                self.session_id.attach(&mut map);
                Value::Object(map)
            }
            other => other,
        }
    }
}

/// Extract the session id from a `create_presentation` result.
///
/// Structured fields win over text matching.
#[must_use]
pub fn extract_session_id(result: &Value) -> SessionId {
    let structured = result
        .pointer("/structuredContent/presentation_id")
        .or_else(|| result.get("presentation_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty());
    if let Some(id) = structured {
        return SessionId::Extracted(id.to_owned());
    }

    let text = tool_text(result);
    capture(session_pattern(), &text)
        .map_or(SessionId::Placeholder, |id| SessionId::Extracted(id.to_owned()))
}

/// Extract the index assigned by an `add_slide` call.
#[must_use]
pub fn extract_slide_index(result: &Value) -> Option<usize> {
    if let Some(index) = result
        .pointer("/structuredContent/slide_index")
        .and_then(Value::as_u64)
    {
        return usize::try_from(index).ok();
    }
    let text = tool_text(result);
    capture(slide_index_pattern(), &text).and_then(|n| n.parse().ok())
}

/// Extract `Total slides: N` from a `get_presentation_info` result.
#[must_use]
pub fn extract_slide_count(result: &Value) -> Option<usize> {
    let text = tool_text(result);
    capture(slide_count_pattern(), &text).and_then(|n| n.parse().ok())
}

fn capture<'t>(pattern: Option<&Regex>, text: &'t str) -> Option<&'t str> {
    pattern?
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn session_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)presentation_id[:\s]*([a-f0-9-]+)").ok())
        .as_ref()
}

fn slide_index_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)slide(?:[_ ]index[:\s]*|\s+)(\d+)").ok())
        .as_ref()
}

fn slide_count_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"Total slides:\s*(\d+)").ok())
        .as_ref()
}
