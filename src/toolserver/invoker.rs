//! Named tool invocation on top of the correlator.
//!
//! [`ToolCaller`] is the seam the workflow depends on; [`ToolInvoker`] is the
//! production implementation that issues `tools/call` requests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use crate::toolserver::correlator::Correlator;
use crate::{AppError, Result};

/// JSON-RPC method used for every tool call.
pub const TOOLS_CALL_METHOD: &str = "tools/call";

/// Anything that can execute a named tool.
pub trait ToolCaller: Send + Sync {
    /// Invoke `tool` with `arguments` and return its raw result.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ToolInvocation`] for tool-level failures; transport
    /// failures (timeout, process exit, not ready) pass through unchanged.
    fn call_tool<'a>(
        &'a self,
        tool: &'a str,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;
}

/// Issues `tools/call` requests through a shared [`Correlator`].
#[derive(Debug, Clone)]
pub struct ToolInvoker {
    correlator: Arc<Correlator>,
}

impl ToolInvoker {
    /// Wrap a correlator.
    #[must_use]
    pub fn new(correlator: Arc<Correlator>) -> Self {
        Self { correlator }
    }

    /// Invoke a tool; no retry happens at this layer.
    ///
    /// # Errors
    ///
    /// - [`AppError::ToolInvocation`] with `code = Some(_)` when the server
    ///   answers with a JSON-RPC error.
    /// - [`AppError::ToolInvocation`] with `code = None` when the result is
    ///   flagged `isError`.
    /// - Any other correlator error unchanged.
    pub async fn invoke(&self, tool: &str, arguments: Value) -> Result<Value> {
        let params = json!({ "name": tool, "arguments": arguments });

        match self.correlator.call(TOOLS_CALL_METHOD, params).await {
            Ok(result) if is_error_result(&result) => {
                let message = match tool_text(&result) {
                    text if text.is_empty() => "tool reported an error".to_owned(),
                    text => text,
                };
                warn!(tool, %message, "tool reported failure");
                Err(AppError::ToolInvocation {
                    tool: tool.to_owned(),
                    code: None,
                    message,
                })
            }
            Ok(result) => Ok(result),
            Err(AppError::Rpc { code, message }) => {
                warn!(tool, code, %message, "tool call rejected");
                Err(AppError::ToolInvocation {
                    tool: tool.to_owned(),
                    code: Some(code),
                    message,
                })
            }
            Err(err) => Err(err),
        }
    }
}

impl ToolCaller for ToolInvoker {
    fn call_tool<'a>(
        &'a self,
        tool: &'a str,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>> {
        Box::pin(self.invoke(tool, arguments))
    }
}

/// Concatenated `text` items of an MCP tool result's `content` array.
#[must_use]
pub fn tool_text(result: &Value) -> String {
    result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

fn is_error_result(result: &Value) -> bool {
    result.get("isError").and_then(Value::as_bool) == Some(true)
}
