//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use deck_forge::toolserver::invoker::ToolCaller;
use deck_forge::workflow::content::{BuiltinContent, ContentSource};
use deck_forge::workflow::{Orchestrator, WorkflowSettings};
use deck_forge::{AppError, Result};

/// Presentation id reported by [`ScriptedTools`] unless told otherwise.
pub const SCRIPTED_SESSION: &str = "0a1b2c3d";

/// In-memory stand-in for the PowerPoint tool server.
///
/// Answers every tool with plausible text, records every call, and fails the
/// calls it was told to fail.
#[derive(Default)]
pub struct ScriptedTools {
    calls: Mutex<Vec<(String, Value)>>,
    seen: Mutex<HashMap<String, usize>>,
    failures: Mutex<Vec<Failure>>,
    anonymous_sessions: bool,
    reported_slides: Option<usize>,
    slides_in_session: Mutex<usize>,
}

struct Failure {
    tool: String,
    occurrence: Option<usize>,
}

impl ScriptedTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// `create_presentation` output names no presentation id.
    pub fn without_session_ids(mut self) -> Self {
        self.anonymous_sessions = true;
        self
    }

    /// `get_presentation_info` reports `count` slides regardless of reality.
    pub fn reporting_slides(mut self, count: usize) -> Self {
        self.reported_slides = Some(count);
        self
    }

    /// Fail the `occurrence`-th call (1-based, counted across the whole test)
    /// of `tool`.
    pub fn fail_nth(self, tool: &str, occurrence: usize) -> Self {
        self.push_failure(tool, Some(occurrence));
        self
    }

    /// Fail every call of `tool`.
    pub fn fail_always(self, tool: &str) -> Self {
        self.push_failure(tool, None);
        self
    }

    fn push_failure(&self, tool: &str, occurrence: Option<usize>) {
        self.failures.lock().unwrap().push(Failure {
            tool: tool.to_owned(),
            occurrence,
        });
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    /// Names of every call made so far, in order.
    pub fn names(&self) -> Vec<String> {
        self.calls().into_iter().map(|(name, _)| name).collect()
    }

    /// Number of calls to `tool`.
    pub fn count(&self, tool: &str) -> usize {
        self.calls().iter().filter(|(name, _)| name == tool).count()
    }

    fn respond(&self, tool: &str, arguments: &Value) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((tool.to_owned(), arguments.clone()));
        let nth = {
            let mut seen = self.seen.lock().unwrap();
            let n = seen.entry(tool.to_owned()).or_default();
            *n += 1;
            *n
        };

        let fails = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|f| f.tool == tool && f.occurrence.map_or(true, |o| o == nth));
        if fails {
            return Err(AppError::ToolInvocation {
                tool: tool.to_owned(),
                code: Some(-32000),
                message: format!("scripted failure of call {nth}"),
            });
        }

        let text = match tool {
            "create_presentation" => {
                *self.slides_in_session.lock().unwrap() = 0;
                if self.anonymous_sessions {
                    "Created a new presentation".to_owned()
                } else {
                    format!("Created presentation with presentation_id: {SCRIPTED_SESSION}")
                }
            }
            "add_slide" => {
                let mut slides = self.slides_in_session.lock().unwrap();
                let index = *slides;
                *slides += 1;
                format!("Added slide {index} with layout {}", arguments["layout_index"])
            }
            "get_presentation_info" => {
                let total = self
                    .reported_slides
                    .unwrap_or(*self.slides_in_session.lock().unwrap());
                format!("Presentation info\nTotal slides: {total}")
            }
            other => format!("{other} ok"),
        };
        Ok(json!({ "content": [{ "type": "text", "text": text }] }))
    }
}

impl ToolCaller for ScriptedTools {
    fn call_tool<'a>(
        &'a self,
        tool: &'a str,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>> {
        Box::pin(async move { self.respond(tool, &arguments) })
    }
}

/// Settings writing into `output_dir`.
pub fn settings(output_dir: &Path) -> WorkflowSettings {
    WorkflowSettings {
        output_dir: output_dir.to_path_buf(),
        download_prefix: "/api/presentations/download".into(),
        color_scheme: "modern_blue".into(),
    }
}

/// Orchestrator over `tools` with the built-in content source.
pub fn orchestrator(tools: &Arc<ScriptedTools>, output_dir: &Path) -> Orchestrator {
    orchestrator_with(tools, Arc::new(BuiltinContent), output_dir)
}

/// Orchestrator over `tools` with a custom content source.
pub fn orchestrator_with(
    tools: &Arc<ScriptedTools>,
    content: Arc<dyn ContentSource>,
    output_dir: &Path,
) -> Orchestrator {
    let caller: Arc<dyn ToolCaller> = Arc::clone(tools) as Arc<dyn ToolCaller>;
    Orchestrator::new(caller, content, settings(output_dir))
}
