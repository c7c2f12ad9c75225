//! Unit tests for the `initialize` exchange payloads.

use deck_forge::config::ClientConfig;
use deck_forge::toolserver::handshake::{initialize_params, INITIALIZED_NOTIFICATION, INITIALIZE_METHOD};

#[test]
fn initialize_params_advertise_client_identity() {
    let params = initialize_params(&ClientConfig::default());

    assert_eq!(params["protocolVersion"], "2024-11-05");
    assert!(params["capabilities"]["tools"].is_object());
    assert_eq!(params["clientInfo"]["name"], "presentation-generator");
    assert_eq!(params["clientInfo"]["version"], "1.0.0");
}

#[test]
fn handshake_method_names() {
    assert_eq!(INITIALIZE_METHOD, "initialize");
    assert_eq!(INITIALIZED_NOTIFICATION, "notifications/initialized");
}
