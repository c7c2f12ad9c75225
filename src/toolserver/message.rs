//! JSON-RPC 2.0 envelopes exchanged with the tool server.
//!
//! Outbound traffic is either an [`RpcRequest`] (carries an `id` and expects
//! exactly one response) or an [`RpcNotification`] (no `id`, no response).
//! Inbound lines are classified by [`parse_line`] into a [`ServerMessage`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{AppError, Result};

/// Protocol version carried in every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Outbound request envelope.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RpcRequest {
    /// Envelope version, always [`JSONRPC_VERSION`].
    #[serde(rename = "jsonrpc")]
    pub protocol_version: String,
    /// Correlation id, unique among outstanding requests.
    pub id: String,
    /// Method name (e.g. `tools/call`).
    pub method: String,
    /// Method parameters.
    pub params: Value,
}

impl RpcRequest {
    /// Build a request envelope.
    #[must_use]
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            protocol_version: JSONRPC_VERSION.to_owned(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Outbound notification envelope (no response expected).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RpcNotification {
    /// Envelope version, always [`JSONRPC_VERSION`].
    #[serde(rename = "jsonrpc")]
    pub protocol_version: String,
    /// Notification method name.
    pub method: String,
    /// Optional parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcNotification {
    /// Build a notification envelope.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            protocol_version: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcErrorPayload {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
}

/// Exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// Successful result value.
    Result(Value),
    /// Server-reported failure.
    Error(RpcErrorPayload),
}

/// Inbound response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    /// Correlation id copied from the originating request.
    pub id: String,
    /// Result or error.
    pub outcome: ResponseOutcome,
}

impl RpcResponse {
    /// Convert the outcome into the crate result type.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Rpc`] when the response carries an error payload.
    pub fn into_result(self) -> Result<Value> {
        match self.outcome {
            ResponseOutcome::Result(value) => Ok(value),
            ResponseOutcome::Error(err) => Err(AppError::Rpc {
                code: err.code,
                message: err.message,
            }),
        }
    }
}

/// A decoded inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Response to one of our requests.
    Response(RpcResponse),
    /// Server-originated notification or request; not correlated.
    Notification {
        /// Method name.
        method: String,
    },
}

/// Classify one inbound line.
///
/// # Errors
///
/// Returns [`AppError::ProtocolDecode`] when the line is not a JSON object,
/// has no usable `id`, or does not carry exactly one of `result` / `error`.
pub fn parse_line(line: &str) -> Result<ServerMessage> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| AppError::ProtocolDecode(format!("malformed json: {e}")))?;

    let Value::Object(mut object) = value else {
        return Err(AppError::ProtocolDecode("message is not a json object".into()));
    };

    check_version(&object)?;

    if let Some(method) = object.get("method").and_then(Value::as_str) {
        return Ok(ServerMessage::Notification {
            method: method.to_owned(),
        });
    }

    let id = match object.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(AppError::ProtocolDecode(
                "response is missing a string or numeric id".into(),
            ))
        }
    };

    let outcome = match (object.remove("result"), object.remove("error")) {
        (Some(result), None) => ResponseOutcome::Result(result),
        (None, Some(error)) => {
            let payload: RpcErrorPayload = serde_json::from_value(error)
                .map_err(|e| AppError::ProtocolDecode(format!("malformed error object: {e}")))?;
            ResponseOutcome::Error(payload)
        }
        (Some(_), Some(_)) => {
            return Err(AppError::ProtocolDecode(format!(
                "response {id} carries both result and error"
            )))
        }
        (None, None) => {
            return Err(AppError::ProtocolDecode(format!(
                "response {id} carries neither result nor error"
            )))
        }
    };

    Ok(ServerMessage::Response(RpcResponse { id, outcome }))
}

/// Accept `jsonrpc` or `protocolVersion` as the version field; reject others.
fn check_version(object: &Map<String, Value>) -> Result<()> {
    let version = object
        .get("jsonrpc")
        .or_else(|| object.get("protocolVersion"))
        .and_then(Value::as_str);

    match version {
        Some(JSONRPC_VERSION) | None => Ok(()),
        Some(other) => Err(AppError::ProtocolDecode(format!(
            "unsupported protocol version {other}"
        ))),
    }
}
