#![forbid(unsafe_code)]

//! `deck-forge`: one-shot presentation generator binary.
//!
//! Loads configuration, launches the MCP PowerPoint tool server, builds one
//! deck for the given prompt, prints the result as JSON, and tears the
//! server down again.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use deck_forge::config::GlobalConfig;
use deck_forge::toolserver::invoker::ToolCaller;
use deck_forge::toolserver::ToolClient;
use deck_forge::workflow::content::{BuiltinContent, ContentSource, FileContent};
use deck_forge::workflow::{Orchestrator, WorkflowResult, WorkflowSettings};
use deck_forge::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "deck-forge", about = "Generate a presentation through an MCP tool server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Topic of the presentation.
    #[arg(long)]
    prompt: String,

    /// Title of the first slide.
    #[arg(long)]
    title: Option<String>,

    /// Override the tool server executable from the config file.
    #[arg(long)]
    executable: Option<PathBuf>,

    /// JSON file with pre-generated slide content.
    #[arg(long)]
    content: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("deck-forge bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(executable) = args.executable {
        config.server.executable = executable;
    }
    info!(output_dir = %config.output_dir.display(), "configuration loaded");

    // ── Start tool server ───────────────────────────────
    let client = ToolClient::connect(&config.server, &config.client).await?;
    if !client.is_ready() {
        warn!(state = %client.state(), "tool server not ready; calls will fail");
    }

    let content: Arc<dyn ContentSource> = match args.content {
        Some(path) => Arc::new(FileContent::new(path)),
        None => Arc::new(BuiltinContent),
    };
    let tools: Arc<dyn ToolCaller> = Arc::new(client.invoker());
    let orchestrator = Orchestrator::new(tools, content, WorkflowSettings::from(&config));

    // ── Generate, unless interrupted ────────────────────
    let outcome = tokio::select! {
        outcome = orchestrator.generate(&args.prompt, args.title.as_deref()) => Some(outcome),
        () = shutdown_signal() => None,
    };

    client.shutdown().await;

    match outcome {
        Some(Ok(result)) => {
            print_result(&result)?;
            info!(filename = %result.filename, "presentation generated");
            Ok(())
        }
        Some(Err(err)) => {
            error!(%err, "presentation generation failed");
            eprintln!("{}", err.user_message());
            Err(err)
        }
        None => {
            info!("shutdown signal received; generation abandoned");
            Ok(())
        }
    }
}

fn print_result(result: &WorkflowResult) -> Result<()> {
    let rendered = serde_json::to_string_pretty(result)
        .map_err(|err| AppError::Io(format!("failed to render result: {err}")))?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr; stdout carries only the JSON result.
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
