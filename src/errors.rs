//! Error types shared across the application.

use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// The tool server executable is missing or could not be launched.
    ProcessSpawn(String),
    /// A write was attempted while the tool server was not `Ready`.
    ProcessNotReady(String),
    /// An inbound line could not be decoded as a protocol message.
    ProtocolDecode(String),
    /// The tool server answered a request with a JSON-RPC error payload.
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message reported by the server.
        message: String,
    },
    /// No response arrived within the per-request budget.
    RequestTimeout {
        /// Method of the abandoned request.
        method: String,
        /// Budget that elapsed.
        timeout: Duration,
    },
    /// The tool server process exited while the request was pending.
    ProcessTerminated(String),
    /// A named tool call failed at the server.
    ToolInvocation {
        /// Tool that was invoked.
        tool: String,
        /// JSON-RPC error code; `None` when the tool flagged `isError` in its result.
        code: Option<i64>,
        /// Failure description.
        message: String,
    },
    /// Slide content supplied by the content collaborator was unusable.
    InvalidContent(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Both the primary and the fallback workflow failed.
    WorkflowFailed {
        /// Error that aborted the primary workflow.
        primary: Box<AppError>,
        /// Error that aborted the fallback workflow.
        fallback: Box<AppError>,
    },
}

impl AppError {
    /// Whether this error means the tool server could not be reached at all.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::ProcessSpawn(_)
                | Self::ProcessNotReady(_)
                | Self::ProcessTerminated(_)
                | Self::RequestTimeout { .. }
        )
    }

    /// Whether this error means the tool server rejected an operation.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rpc { .. } | Self::ToolInvocation { .. })
    }

    /// Human-readable message for the end user of a generation run.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::WorkflowFailed { fallback, .. } => {
                format!(
                    "both generation attempts failed ({})",
                    fallback.user_message()
                )
            }
            err if err.is_unreachable() => format!("could not reach tool server: {err}"),
            err if err.is_rejection() => format!("tool server rejected the operation: {err}"),
            err => err.to_string(),
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::ProcessSpawn(msg) => write!(f, "process spawn: {msg}"),
            Self::ProcessNotReady(msg) => write!(f, "process not ready: {msg}"),
            Self::ProtocolDecode(msg) => write!(f, "protocol decode: {msg}"),
            Self::Rpc { code, message } => write!(f, "rpc error {code}: {message}"),
            Self::RequestTimeout { method, timeout } => {
                write!(f, "request timeout: {method} received no response within {timeout:?}")
            }
            Self::ProcessTerminated(msg) => write!(f, "process terminated: {msg}"),
            Self::ToolInvocation {
                tool,
                code: Some(code),
                message,
            } => write!(f, "tool {tool} failed with code {code}: {message}"),
            Self::ToolInvocation {
                tool,
                code: None,
                message,
            } => write!(f, "tool {tool} failed: {message}"),
            Self::InvalidContent(msg) => write!(f, "invalid content: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::WorkflowFailed { primary, fallback } => {
                write!(f, "workflow failed: primary: {primary}; fallback: {fallback}")
            }
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
