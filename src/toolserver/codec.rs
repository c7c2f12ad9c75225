//! NDJSON framing for the tool server's stdio streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a configurable maximum line
//! length to prevent memory exhaustion caused by unterminated or maliciously
//! large messages from a misbehaving server process.
//!
//! [`FrameDecoder`] is the stateful inbound half: raw chunks of any size are
//! appended to an internal buffer and every complete line is parsed into a
//! [`ServerMessage`]. A partial trailing line stays buffered until the next
//! chunk supplies its newline, so a response split across chunks decodes
//! identically to the same response delivered whole. When the stream ends,
//! [`FrameDecoder::finish`] parses a final line that never got its newline.

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::toolserver::message::{parse_line, ServerMessage};
use crate::{AppError, Result};

/// Maximum line length accepted on the inbound stream: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Line codec for the tool server streams.
///
/// Each newline-terminated (`\n`) UTF-8 string is one complete JSON-RPC
/// message. Inbound lines longer than [`MAX_LINE_BYTES`] return
/// [`AppError::ProtocolDecode`] rather than allocating.
#[derive(Debug)]
pub struct LineCodec(LinesCodec);

impl LineCodec {
    /// Create a new `LineCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl Encoder<String> for LineCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        // LinesCodec::encode does not enforce a max line length;
        // the limit applies only to decoding.
        self.0.encode(item, dst).map_err(map_codec_error)
    }
}

/// Serialise one envelope as a single `\n`-terminated JSON line.
///
/// # Errors
///
/// Returns [`AppError::ProtocolDecode`] if the value cannot be serialised.
pub fn encode<T: Serialize>(message: &T) -> Result<Bytes> {
    let line = serde_json::to_string(message)
        .map_err(|e| AppError::ProtocolDecode(format!("failed to serialise outbound message: {e}")))?;
    let mut dst = BytesMut::with_capacity(line.len() + 1);
    LineCodec::new().encode(line, &mut dst)?;
    Ok(dst.freeze())
}

/// Stateful chunk-to-message decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    codec: LineCodec,
    buffer: BytesMut,
    decode_errors: u64,
}

impl FrameDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every message completed by it.
    ///
    /// Lines that fail to parse are logged, counted, and discarded; they never
    /// abort the stream. Blank lines are skipped silently.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ServerMessage> {
        self.buffer.extend_from_slice(chunk);
        let mut messages = Vec::new();

        loop {
            let decoded = self.codec.decode(&mut self.buffer);
            if !self.accept(decoded, &mut messages) {
                break;
            }
        }

        messages
    }

    /// Decode whatever is left once the stream has ended.
    ///
    /// A final line without its newline is still parsed rather than lost.
    /// The buffer is empty afterwards.
    pub fn finish(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();

        loop {
            let decoded = self.codec.decode_eof(&mut self.buffer);
            if !self.accept(decoded, &mut messages) {
                break;
            }
        }
        self.reset();

        messages
    }

    /// Drop any buffered partial line, e.g. after chunks were lost.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.codec = LineCodec::new();
    }

    /// Bytes currently held as an incomplete line.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of lines discarded as undecodable so far.
    #[must_use]
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    /// Handle one decode step; `false` once no complete line remains.
    fn accept(
        &mut self,
        decoded: Result<Option<String>>,
        messages: &mut Vec<ServerMessage>,
    ) -> bool {
        match decoded {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    match parse_line(trimmed) {
                        Ok(message) => messages.push(message),
                        Err(err) => self.report(&err, trimmed),
                    }
                }
                true
            }
            Ok(None) => false,
            Err(err) => {
                self.report(&err, "");
                true
            }
        }
    }

    fn report(&mut self, err: &AppError, raw_line: &str) {
        self.decode_errors += 1;
        warn!(error = %err, raw_line, "tool server: undecodable line discarded");
    }
}

/// Map a [`LinesCodecError`] to an [`AppError`].
fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::ProtocolDecode(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        // LinesCodec reports a non-UTF-8 line as an `InvalidData` I/O error.
        LinesCodecError::Io(io_err) => AppError::ProtocolDecode(format!("invalid line: {io_err}")),
    }
}
