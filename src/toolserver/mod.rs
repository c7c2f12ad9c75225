//! MCP tool server client.
//!
//! Drives an external tool-execution server over its stdio pipes using
//! newline-delimited JSON-RPC. Data flows
//! `invoker → correlator → codec → supervisor → child` on the way out and
//! `child → supervisor → reader → codec → correlator` on the way back.
//!
//! - `spawner`: command construction with environment isolation.
//! - `supervisor`: process lifecycle, gated writes, chunk streams.
//! - `codec`: line framing and chunk reassembly.
//! - `message`: JSON-RPC envelopes.
//! - `correlator`: id assignment, pending table, timeouts.
//! - `reader`: inbound pump and crash sweep.
//! - `handshake`: `initialize` exchange.
//! - `invoker`: `tools/call` façade.
//!
//! [`ToolClient`] wires these together with an explicit init / teardown
//! order.

pub mod codec;
pub mod correlator;
pub mod handshake;
pub mod invoker;
pub mod message;
pub mod reader;
pub mod spawner;
pub mod supervisor;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ClientConfig, ServerConfig};
use crate::Result;

use self::correlator::{Correlator, Transport};
use self::invoker::ToolInvoker;
use self::supervisor::{ProcessState, ProcessSupervisor};

/// A connected tool server: one child process and its correlator.
///
/// Init order in [`connect`](Self::connect):
/// 1. construct the supervisor and correlator;
/// 2. subscribe and spawn the reader tasks (so no early output is missed);
/// 3. spawn the child (`Starting`);
/// 4. handshake, then promote to `Ready`.
///
/// Teardown in [`shutdown`](Self::shutdown) runs in reverse: kill the child
/// (`Terminated`), fail anything still pending, stop the reader tasks.
#[derive(Debug)]
pub struct ToolClient {
    supervisor: Arc<ProcessSupervisor>,
    correlator: Arc<Correlator>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ToolClient {
    /// Spawn the server and perform the handshake.
    ///
    /// A failed handshake is not an error here: the supervisor is left
    /// `Degraded` and every later call fails fast with
    /// [`AppError::ProcessNotReady`](crate::AppError::ProcessNotReady).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ProcessSpawn`](crate::AppError::ProcessSpawn) if
    /// the executable is missing or cannot be launched.
    pub async fn connect(server: &ServerConfig, client: &ClientConfig) -> Result<Self> {
        let supervisor = Arc::new(ProcessSupervisor::new(server.clone()));
        let transport: Arc<dyn Transport> = Arc::clone(&supervisor) as Arc<dyn Transport>;
        let correlator = Arc::new(Correlator::new(transport, server.request_timeout()));
        let cancel = CancellationToken::new();

        let tasks = vec![
            tokio::spawn(reader::run_reader(
                supervisor.subscribe_stdout(),
                supervisor.subscribe_state(),
                Arc::clone(&correlator),
                cancel.clone(),
            )),
            tokio::spawn(reader::run_stderr_logger(
                supervisor.subscribe_stderr(),
                cancel.clone(),
            )),
        ];

        let this = Self {
            supervisor,
            correlator,
            cancel,
            tasks,
        };

        if let Err(err) = this.supervisor.start().await {
            error!(%err, "tool server failed to start");
            this.shutdown().await;
            return Err(err);
        }

        match handshake::initialize(&this.correlator, client).await {
            Ok(_) => {
                if let Err(err) = this.supervisor.mark_ready() {
                    warn!(%err, "tool server went away right after the handshake");
                }
            }
            Err(err) => {
                error!(%err, "handshake failed; tool server will reject all calls");
                this.supervisor.mark_degraded();
            }
        }

        Ok(this)
    }

    /// Current process state.
    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.supervisor.state()
    }

    /// Whether the handshake completed and the process is still alive.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ProcessState::Ready
    }

    /// A tool invoker sharing this client's correlator.
    #[must_use]
    pub fn invoker(&self) -> ToolInvoker {
        ToolInvoker::new(Arc::clone(&self.correlator))
    }

    /// The shared correlator, for raw JSON-RPC calls.
    #[must_use]
    pub fn correlator(&self) -> Arc<Correlator> {
        Arc::clone(&self.correlator)
    }

    /// Tear down: terminate the process, fail pending calls, stop tasks.
    pub async fn shutdown(self) {
        self.supervisor.terminate().await;
        self.correlator.fail_all("tool client shut down");
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(%err, "tool client task ended abnormally");
            }
        }
        info!("tool client shut down");
    }
}
