//! Line framing for pipe payloads.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a configurable maximum frame
//! length so a misbehaving peer cannot make the reader buffer without bound.
//! Each `\n`-terminated UTF-8 line is one payload.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Default maximum frame length: 1 MiB.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1_048_576;

/// Newline-delimited frame codec with a length limit.
///
/// # Decoder
///
/// Inbound lines longer than the limit return
/// [`AppError::Transport`]`("frame too long: …")`. A `FramedRead` ends
/// its stream after that error, so a pipe link reading an oversize frame
/// closes and reports `Disconnected`.
///
/// # Encoder
///
/// Outbound strings are written as `item\n`. Payloads containing `\n` are
/// rejected because they would split into two frames.
#[derive(Debug)]
pub struct FrameCodec {
    inner: LinesCodec,
    max_frame_bytes: usize,
}

impl FrameCodec {
    /// Create a codec with the [`DEFAULT_MAX_FRAME_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    /// Create a codec with a custom frame limit.
    #[must_use]
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_frame_bytes),
            max_frame_bytes,
        }
    }

    /// Configured frame limit.
    #[must_use]
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    fn map_error(&self, err: LinesCodecError) -> AppError {
        match err {
            LinesCodecError::MaxLineLengthExceeded => AppError::Transport(format!(
                "frame too long: exceeded {} bytes",
                self.max_frame_bytes
            )),
            LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.inner.decode(src).map_err(|err| self.map_error(err))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.inner.decode_eof(src).map_err(|err| self.map_error(err))
    }
}

impl Encoder<String> for FrameCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        if item.contains('\n') {
            return Err(AppError::Transport(
                "payload contains a frame delimiter".into(),
            ));
        }
        self.inner.encode(item, dst).map_err(|err| self.map_error(err))
    }
}

/// Validate an outbound payload and turn it into one frame line.
///
/// # Errors
///
/// Returns `AppError::Transport` if the payload is not UTF-8, contains a
/// newline, or exceeds `max_frame_bytes`.
pub fn frame_payload(payload: &[u8], max_frame_bytes: usize) -> Result<String> {
    if payload.len() > max_frame_bytes {
        return Err(AppError::Transport(format!(
            "frame too long: {} bytes exceeds {max_frame_bytes}",
            payload.len()
        )));
    }
    let text = std::str::from_utf8(payload)
        .map_err(|err| AppError::Transport(format!("payload is not utf-8: {err}")))?;
    if text.contains('\n') {
        return Err(AppError::Transport(
            "payload contains a frame delimiter".into(),
        ));
    }
    Ok(text.to_owned())
}
