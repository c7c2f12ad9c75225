//! Global configuration parsing and validation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_true() -> bool {
    true
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_client_name() -> String {
    "presentation-generator".into()
}

fn default_client_version() -> String {
    "1.0.0".into()
}

fn default_protocol_version() -> String {
    "2024-11-05".into()
}

fn default_color_scheme() -> String {
    "modern_blue".into()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_download_prefix() -> String {
    "/api/presentations/download".into()
}

/// How to launch the MCP tool server child process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Executable path (or bare command name resolved through `PATH`).
    pub executable: PathBuf,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Inherit the parent environment; when `false` only an allowlist is kept.
    #[serde(default = "default_true")]
    pub inherit_env: bool,
    /// Extra environment variables injected into the child.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the child process.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Per-request response budget in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl ServerConfig {
    /// Server configuration for `executable` with every other field defaulted.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            inherit_env: true,
            env: HashMap::new(),
            working_dir: None,
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }

    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Identity advertised to the tool server during the handshake.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    /// `clientInfo.name`.
    #[serde(default = "default_client_name")]
    pub name: String,
    /// `clientInfo.version`.
    #[serde(default = "default_client_version")]
    pub version: String,
    /// MCP protocol revision requested in `initialize`.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            version: default_client_version(),
            protocol_version: default_protocol_version(),
        }
    }
}

/// Styling applied during the best-effort design stage.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DesignConfig {
    /// Color scheme passed to `apply_professional_design`.
    #[serde(default = "default_color_scheme")]
    pub color_scheme: String,
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            color_scheme: default_color_scheme(),
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory generated presentations are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// URL prefix joined with a filename to form its download location.
    #[serde(default = "default_download_prefix")]
    pub download_prefix: String,
    /// Tool server launch settings.
    pub server: ServerConfig,
    /// Handshake identity.
    #[serde(default)]
    pub client: ClientConfig,
    /// Styling settings.
    #[serde(default)]
    pub design: DesignConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// The output directory is created when missing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<()> {
        if self.server.executable.as_os_str().is_empty() {
            return Err(AppError::Config("server.executable must not be empty".into()));
        }

        if self.server.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "server.request_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.client.name.trim().is_empty() {
            return Err(AppError::Config("client.name must not be empty".into()));
        }

        fs::create_dir_all(&self.output_dir)
            .map_err(|err| AppError::Config(format!("output_dir not creatable: {err}")))?;
        self.output_dir = self
            .output_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("output_dir invalid: {err}")))?;

        Ok(())
    }
}
