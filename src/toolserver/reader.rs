//! Tool server reader tasks.
//!
//! [`run_reader`] consumes raw stdout chunks, reassembles them into lines with
//! a [`FrameDecoder`], and hands every decoded response to the
//! [`Correlator`]. It also watches the supervisor's lifecycle state: as soon
//! as the process is reported down, every pending call is failed instead of
//! being left to time out one by one.
//!
//! [`run_stderr_logger`] forwards stderr output to `tracing` line by line and
//! is never parsed as protocol data.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::toolserver::codec::{FrameDecoder, MAX_LINE_BYTES};
use crate::toolserver::correlator::Correlator;
use crate::toolserver::message::ServerMessage;
use crate::toolserver::supervisor::ProcessState;

/// Stdout reader task: decodes chunks and resolves pending calls.
///
/// Exits on cancellation, when the chunk channel closes, or once the process
/// state reaches `Terminated`. Malformed lines are logged and skipped; they do
/// not stop the task.
pub async fn run_reader(
    mut chunks: broadcast::Receiver<Bytes>,
    mut state: watch::Receiver<ProcessState>,
    correlator: Arc<Correlator>,
    cancel: CancellationToken,
) {
    let mut decoder = FrameDecoder::new();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("tool server reader: cancellation received, stopping");
                break;
            }

            chunk = chunks.recv() => {
                match chunk {
                    Ok(bytes) => {
                        for message in decoder.feed(&bytes) {
                            route(&correlator, message);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            skipped,
                            "tool server reader lagged; discarding partial line"
                        );
                        decoder.reset();
                    }
                    Err(RecvError::Closed) => {
                        debug!("tool server reader: stdout channel closed");
                        for message in decoder.finish() {
                            route(&correlator, message);
                        }
                        break;
                    }
                }
            }

            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                if current.is_down() {
                    let failed = correlator.fail_all(&format!("tool server {current}"));
                    if failed > 0 {
                        warn!(failed, state = %current, "failed pending calls after process exit");
                    }
                    if current == ProcessState::Terminated {
                        break;
                    }
                }
            }
        }
    }

    if decoder.decode_errors() > 0 {
        debug!(
            decode_errors = decoder.decode_errors(),
            "tool server reader finished"
        );
    }
}

/// Stderr logger task. Every non-blank line is logged at `WARN`.
///
/// Lines are reassembled across chunks; whatever is left when the stream
/// ends is logged as a final line.
pub async fn run_stderr_logger(mut chunks: broadcast::Receiver<Bytes>, cancel: CancellationToken) {
    let mut lines = StderrLines::new();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            chunk = chunks.recv() => {
                match chunk {
                    Ok(bytes) => {
                        for line in lines.push(&bytes) {
                            log_stderr(&line);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "stderr logger lagged; discarding partial line");
                        lines.clear();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    if let Some(line) = lines.finish() {
        log_stderr(&line);
    }
}

fn log_stderr(line: &str) {
    warn!(target: "deck_forge::toolserver::stderr", line, "tool server stderr");
}

/// Splits raw stderr chunks into trimmed, non-blank lines.
///
/// Unlike stdout, stderr is free text: invalid UTF-8 is replaced rather than
/// rejected. An unterminated line longer than [`MAX_LINE_BYTES`] is emitted
/// as is instead of growing the buffer further.
#[derive(Debug, Default)]
pub struct StderrLines {
    buffer: BytesMut,
}

impl StderrLines {
    /// Create an empty line buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let scan_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut offset = scan_from;
        while let Some(pos) = self.buffer[offset..].iter().position(|b| *b == b'\n') {
            let raw = self.buffer.split_to(offset + pos + 1);
            lines.extend(clean(&raw));
            offset = 0;
        }
        if self.buffer.len() > MAX_LINE_BYTES {
            let raw = self.buffer.split();
            lines.extend(clean(&raw));
        }
        lines
    }

    /// Take the unterminated remainder, if it holds any text.
    pub fn finish(&mut self) -> Option<String> {
        let raw = self.buffer.split();
        clean(&raw)
    }

    /// Drop the buffered partial line.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

fn clean(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    (!line.is_empty()).then(|| line.to_owned())
}

fn route(correlator: &Correlator, message: ServerMessage) {
    match message {
        ServerMessage::Response(response) => {
            correlator.dispatch(response);
        }
        ServerMessage::Notification { method } => {
            debug!(%method, "tool server notification ignored");
        }
    }
}
