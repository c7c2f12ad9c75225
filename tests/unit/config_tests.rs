//! Unit tests for TOML configuration parsing and validation.

use std::time::Duration;

use deck_forge::config::GlobalConfig;
use deck_forge::AppError;

fn toml_with_output(dir: &std::path::Path, rest: &str) -> String {
    format!(
        "output_dir = '{}'\n{rest}",
        dir.display()
    )
}

#[test]
fn minimal_config_fills_defaults() {
    let temp = tempfile::tempdir().expect("tempdir");
    let raw = toml_with_output(temp.path(), "[server]\nexecutable = 'ppt_mcp_server'\n");

    let config = GlobalConfig::from_toml_str(&raw).expect("valid config");

    assert_eq!(config.server.request_timeout(), Duration::from_secs(30));
    assert!(config.server.inherit_env);
    assert!(config.server.args.is_empty());
    assert_eq!(config.client.name, "presentation-generator");
    assert_eq!(config.client.protocol_version, "2024-11-05");
    assert_eq!(config.design.color_scheme, "modern_blue");
    assert_eq!(config.download_prefix, "/api/presentations/download");
    assert!(config.output_dir.is_absolute());
}

#[test]
fn full_config_round_trips_every_section() {
    let temp = tempfile::tempdir().expect("tempdir");
    let raw = toml_with_output(
        temp.path(),
        r#"
download_prefix = "/downloads"

[server]
executable = "python3"
args = ["-m", "ppt_mcp_server"]
inherit_env = false
request_timeout_seconds = 10
working_dir = "/tmp"

[server.env]
PPT_TEMPLATE_DIR = "/opt/templates"

[client]
name = "deck-forge"
version = "0.1.0"

[design]
color_scheme = "corporate_gray"
"#,
    );

    let config = GlobalConfig::from_toml_str(&raw).expect("valid config");

    assert_eq!(config.download_prefix, "/downloads");
    assert_eq!(config.server.args, vec!["-m", "ppt_mcp_server"]);
    assert!(!config.server.inherit_env);
    assert_eq!(config.server.request_timeout(), Duration::from_secs(10));
    assert_eq!(
        config.server.env.get("PPT_TEMPLATE_DIR").map(String::as_str),
        Some("/opt/templates")
    );
    assert_eq!(config.client.name, "deck-forge");
    assert_eq!(config.design.color_scheme, "corporate_gray");
}

#[test]
fn missing_output_dir_is_created() {
    let temp = tempfile::tempdir().expect("tempdir");
    let nested = temp.path().join("a").join("b");
    let raw = toml_with_output(&nested, "[server]\nexecutable = 'srv'\n");

    let config = GlobalConfig::from_toml_str(&raw).expect("valid config");

    assert!(nested.is_dir());
    assert_eq!(config.output_dir, nested.canonicalize().expect("canonical"));
}

#[test]
fn invalid_values_are_config_errors() {
    let temp = tempfile::tempdir().expect("tempdir");
    for rest in [
        "[server]\nexecutable = ''\n",
        "[server]\nexecutable = 'srv'\nrequest_timeout_seconds = 0\n",
        "[server]\nexecutable = 'srv'\n[client]\nname = '  '\n",
        "[client]\nname = 'no server table'\n",
        "[server\nexecutable = 'broken'\n",
    ] {
        let err = GlobalConfig::from_toml_str(&toml_with_output(temp.path(), rest))
            .expect_err(rest);
        assert!(matches!(err, AppError::Config(_)), "{rest}: {err}");
    }
}

#[test]
fn load_from_path_reads_the_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    std::fs::write(
        &path,
        toml_with_output(temp.path(), "[server]\nexecutable = 'srv'\n"),
    )
    .expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("load");
    assert_eq!(config.server.executable.to_string_lossy(), "srv");

    let err = GlobalConfig::load_from_path(temp.path().join("missing.toml")).expect_err("missing");
    assert!(matches!(err, AppError::Config(_)));
}
