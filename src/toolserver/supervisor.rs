//! Tool server process supervisor.
//!
//! Owns the single long-lived MCP server child process. The supervisor:
//! - tracks lifecycle state in a [`watch`] channel
//!   (`NotStarted → Starting → Ready`, then `Degraded` on unexpected exit or
//!   `Terminated` on explicit teardown);
//! - gates writes to the child's stdin on that state;
//! - republishes raw stdout and stderr chunks on [`broadcast`] channels so
//!   every subscriber sees the stream from the moment it subscribed;
//! - runs an exit monitor that flips the state to `Degraded` when the child
//!   goes away on its own, which is the signal the reader uses to fail every
//!   pending call. A write that stalls past its budget degrades and kills the
//!   child the same way.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{BytesCodec, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::toolserver::correlator::{Transport, WritePhase};
use crate::toolserver::spawner;
use crate::{AppError, Result};

/// Capacity of the stdout / stderr chunk channels.
const STREAM_CAPACITY: usize = 1024;

/// How long teardown waits for each background task before aborting it.
const TEARDOWN_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle of the supervised child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// `start` has not been called.
    NotStarted,
    /// Spawned; handshake in progress.
    Starting,
    /// Handshake complete; accepting requests.
    Ready,
    /// Exited unexpectedly or failed its handshake.
    Degraded,
    /// Torn down by `terminate`.
    Terminated,
}

impl ProcessState {
    /// Whether the process can no longer answer requests.
    #[must_use]
    pub fn is_down(self) -> bool {
        matches!(self, Self::Degraded | Self::Terminated)
    }
}

impl Display for ProcessState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::NotStarted => "not started",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// Supervisor for the tool server child process.
#[derive(Debug)]
pub struct ProcessSupervisor {
    config: ServerConfig,
    state: Arc<watch::Sender<ProcessState>>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    stdout_tx: broadcast::Sender<Bytes>,
    stderr_tx: broadcast::Sender<Bytes>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ProcessSupervisor {
    /// Create a supervisor in the `NotStarted` state.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let (state, _) = watch::channel(ProcessState::NotStarted);
        let (stdout_tx, _) = broadcast::channel(STREAM_CAPACITY);
        let (stderr_tx, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            config,
            state: Arc::new(state),
            stdin: tokio::sync::Mutex::new(None),
            stdout_tx,
            stderr_tx,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ProcessState> {
        self.state.subscribe()
    }

    /// Subscribe to raw stdout chunks from this point on.
    ///
    /// Subscribe before [`start`](Self::start) to observe the full stream.
    #[must_use]
    pub fn subscribe_stdout(&self) -> broadcast::Receiver<Bytes> {
        self.stdout_tx.subscribe()
    }

    /// Subscribe to raw stderr chunks (diagnostics only).
    #[must_use]
    pub fn subscribe_stderr(&self) -> broadcast::Receiver<Bytes> {
        self.stderr_tx.subscribe()
    }

    /// Spawn the child process and move to `Starting`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`AppError::ProcessSpawn`] if the executable is missing or the OS
    ///   refuses to launch it; the supervisor is then `Terminated`.
    /// - [`AppError::ProcessSpawn`] if the supervisor was already started.
    pub async fn start(&self) -> Result<()> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == ProcessState::NotStarted {
                *state = ProcessState::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(AppError::ProcessSpawn(format!(
                "supervisor already used (state: {})",
                self.state()
            )));
        }

        let mut child = match spawner::build_command(&self.config).and_then(|mut cmd| {
            cmd.spawn().map_err(|err| {
                AppError::ProcessSpawn(format!(
                    "failed to launch {}: {err}",
                    self.config.executable.display()
                ))
            })
        }) {
            Ok(child) => child,
            Err(err) => {
                self.state.send_replace(ProcessState::Terminated);
                return Err(err);
            }
        };

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            self.state.send_replace(ProcessState::Terminated);
            return Err(AppError::ProcessSpawn(
                "failed to capture tool server stdio".into(),
            ));
        };

        info!(
            executable = %self.config.executable.display(),
            pid = child.id(),
            "tool server spawned"
        );

        *self.stdin.lock().await = Some(stdin);

        let handles = vec![
            spawn_pump(stdout, self.stdout_tx.clone(), "stdout"),
            spawn_pump(stderr, self.stderr_tx.clone(), "stderr"),
            monitor_exit(child, Arc::clone(&self.state), self.cancel.clone()),
        ];
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(handles);

        Ok(())
    }

    /// Promote `Starting → Ready` after a successful handshake.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ProcessNotReady`] if the process is not `Starting`
    /// (for example because it exited during the handshake).
    pub fn mark_ready(&self) -> Result<()> {
        let promoted = self.state.send_if_modified(|state| {
            if *state == ProcessState::Starting {
                *state = ProcessState::Ready;
                true
            } else {
                false
            }
        });
        if promoted {
            info!("tool server ready");
            Ok(())
        } else {
            Err(AppError::ProcessNotReady(format!(
                "cannot mark ready from state {}",
                self.state()
            )))
        }
    }

    /// Move a live process to `Degraded` (e.g. after a failed handshake).
    pub fn mark_degraded(&self) {
        self.state.send_if_modified(|state| {
            if state.is_down() {
                false
            } else {
                *state = ProcessState::Degraded;
                true
            }
        });
    }

    /// Give up on a write that stalled past its budget.
    ///
    /// The child may hold a partial frame, so it is killed and the state
    /// moves to `Degraded`, which makes the reader fail every pending call.
    pub fn abandon_stalled_write(&self) {
        let degraded = self.state.send_if_modified(|state| {
            if state.is_down() {
                false
            } else {
                *state = ProcessState::Degraded;
                true
            }
        });
        if degraded {
            warn!("tool server stopped reading stdin; killing it");
            self.cancel.cancel();
        }
    }

    /// Write one frame; requires `Ready`.
    ///
    /// # Errors
    ///
    /// - [`AppError::ProcessNotReady`] unless the state is `Ready`.
    /// - [`AppError::ProcessTerminated`] if the pipe is broken.
    pub async fn write(&self, frame: &[u8]) -> Result<()> {
        self.write_gated(frame, ProcessState::Ready).await
    }

    /// Write one handshake frame; requires `Starting`.
    ///
    /// # Errors
    ///
    /// Same as [`write`](Self::write), gated on `Starting` instead.
    pub async fn write_handshake(&self, frame: &[u8]) -> Result<()> {
        self.write_gated(frame, ProcessState::Starting).await
    }

    /// Kill the child and move to `Terminated`. Idempotent.
    pub async fn terminate(&self) {
        let previous = self.state.send_replace(ProcessState::Terminated);
        if previous == ProcessState::Terminated {
            return;
        }

        self.cancel.cancel();
        self.stdin.lock().await.take();

        let handles = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for mut handle in handles {
            match tokio::time::timeout(TEARDOWN_GRACE, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(%err, "tool server task ended abnormally"),
                Err(_elapsed) => handle.abort(),
            }
        }
        info!(previous = %previous, "tool server terminated");
    }

    async fn write_gated(&self, frame: &[u8], required: ProcessState) -> Result<()> {
        let current = self.state();
        if current != required {
            return Err(AppError::ProcessNotReady(format!("tool server is {current}")));
        }

        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| AppError::ProcessNotReady("tool server stdin is closed".into()))?;

        let written = async {
            stdin.write_all(frame).await?;
            stdin.flush().await
        }
        .await;

        written.map_err(|err| {
            warn!(%err, "tool server: write to stdin failed");
            AppError::ProcessTerminated(format!("write failed: {err}"))
        })
    }
}

impl Transport for ProcessSupervisor {
    fn send_frame(
        &self,
        frame: Bytes,
        phase: WritePhase,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            match phase {
                WritePhase::Handshake => self.write_handshake(&frame).await,
                WritePhase::Operational => self.write(&frame).await,
            }
        })
    }

    fn abandon_write(&self) {
        self.abandon_stalled_write();
    }
}

/// Republish every chunk read from `stream` until EOF.
fn spawn_pump<R>(stream: R, tx: broadcast::Sender<Bytes>, name: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut framed = FramedRead::new(stream, BytesCodec::new());
        while let Some(item) = framed.next().await {
            match item {
                Ok(chunk) => {
                    // No subscribers is not an error; the chunk is simply unobserved.
                    let _ = tx.send(chunk.freeze());
                }
                Err(err) => {
                    warn!(stream = name, %err, "tool server stream read failed");
                    break;
                }
            }
        }
        debug!(stream = name, "tool server stream closed");
    })
}

/// Await child exit; an exit nobody asked for degrades the supervisor.
fn monitor_exit(
    mut child: Child,
    state: Arc<watch::Sender<ProcessState>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = child.wait() => {
                let reason = match result {
                    Ok(status) => status.code().map_or_else(
                        || "terminated by signal".to_owned(),
                        |c| format!("exited with code {c}"),
                    ),
                    Err(err) => format!("wait error: {err}"),
                };
                let degraded = state.send_if_modified(|s| {
                    if s.is_down() {
                        false
                    } else {
                        *s = ProcessState::Degraded;
                        true
                    }
                });
                if degraded {
                    warn!(%reason, "tool server process exited unexpectedly");
                } else {
                    debug!(%reason, "tool server process exited");
                }
            }
            () = cancel.cancelled() => {
                if let Err(err) = child.kill().await {
                    warn!(%err, "failed to kill tool server process");
                }
                debug!("monitor_exit: cancellation received, process killed");
            }
        }
    })
}
