//! MCP initialization handshake.
//!
//! After the server process is spawned the client performs the
//! initialize/initialized exchange before any tool call is allowed:
//!
//! 1. an `initialize` request advertising the client's capabilities and
//!    identity, answered like any other request through the correlator;
//! 2. a `notifications/initialized` notification.
//!
//! Both writes pass the `Starting` gate; the caller promotes the supervisor to
//! `Ready` only after [`initialize`] returns `Ok`.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::toolserver::correlator::{Correlator, WritePhase};
use crate::Result;

/// Method of the handshake request.
pub const INITIALIZE_METHOD: &str = "initialize";

/// Notification sent once `initialize` succeeded.
pub const INITIALIZED_NOTIFICATION: &str = "notifications/initialized";

/// Parameters of the `initialize` request.
#[must_use]
pub fn initialize_params(client: &ClientConfig) -> Value {
    json!({
        "protocolVersion": client.protocol_version,
        "capabilities": { "tools": {} },
        "clientInfo": {
            "name": client.name,
            "version": client.version
        }
    })
}

/// Run the handshake; returns the server's `initialize` result.
///
/// # Errors
///
/// Propagates the correlator error of the `initialize` call (timeout, RPC
/// error, process exit) or the write failure of the notification.
pub async fn initialize(correlator: &Correlator, client: &ClientConfig) -> Result<Value> {
    let result = correlator
        .call_handshake(INITIALIZE_METHOD, initialize_params(client))
        .await?;

    let server_name = result
        .pointer("/serverInfo/name")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let server_protocol = result
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or("unspecified");
    info!(
        server = server_name,
        protocol = server_protocol,
        "handshake: initialize acknowledged"
    );

    correlator
        .notify(INITIALIZED_NOTIFICATION, None, WritePhase::Handshake)
        .await?;
    debug!("handshake: initialized notification sent");

    Ok(result)
}
