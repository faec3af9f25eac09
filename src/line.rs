//! Line-based codec.
//!
//! Splits an inbound byte stream on `\n` (stripping a preceding `\r`) and
//! frames outbound lines with `\r\n`. Partial lines are buffered across reads.
//! With the `tokio` feature the codec plugs into `FramedRead`/`FramedWrite`.

use bytes::BytesMut;
use tracing::warn;

use crate::error::{ProtocolError, Result};

/// Maximum inbound line length in bytes, delimiter included.
///
/// Twitch lines carry large tag blocks, so this is well above the 512 bytes
/// of classic IRC.
pub const MAX_LINE_LEN: usize = 8191;

/// Line-based codec that handles newline-terminated messages.
#[derive(Debug)]
pub struct LineCodec {
    /// Bytes fed through [`LineCodec::feed`] that do not form a full line yet.
    buffer: BytesMut,
    /// Index of next byte to check for newline
    next_index: usize,
    /// Maximum line length
    max_len: usize,
    /// Set while skipping the rest of an oversized line.
    discarding: bool,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCodec {
    /// Create a new codec limited to [`MAX_LINE_LEN`].
    pub fn new() -> Self {
        Self::with_max_len(MAX_LINE_LEN)
    }

    /// Create a new codec with custom max line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_len.min(16384)),
            next_index: 0,
            max_len,
            discarding: false,
        }
    }

    /// Append a chunk and return every line it completes.
    ///
    /// Incomplete trailing data stays buffered for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut src = std::mem::take(&mut self.buffer);
        let mut lines = Vec::new();
        while let Some(line) = self.next_line(&mut src) {
            lines.push(line);
        }
        self.buffer = src;
        lines
    }

    /// Number of buffered bytes not yet forming a line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any buffered partial line.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.next_index = 0;
        self.discarding = false;
    }

    fn next_line(&mut self, src: &mut BytesMut) -> Option<String> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                // No complete line yet - remember where we stopped
                self.next_index = src.len();
                if src.len() > self.max_len {
                    if !self.discarding {
                        warn!(limit = self.max_len, "dropping oversized inbound line");
                    }
                    self.discarding = true;
                    src.clear();
                    self.next_index = 0;
                }
                return None;
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_len {
                warn!(actual = line.len(), limit = self.max_len, "dropping oversized inbound line");
                continue;
            }

            let mut body = &line[..line.len() - 1];
            if let Some(stripped) = body.strip_suffix(b"\r") {
                body = stripped;
            }

            return Some(match std::str::from_utf8(body) {
                Ok(s) => s.to_owned(),
                Err(e) => {
                    warn!(byte_pos = e.valid_up_to(), "inbound line is not valid UTF-8");
                    String::from_utf8_lossy(body).into_owned()
                }
            });
        }
    }

    /// Frame an outbound line, rejecting embedded line breaks.
    pub fn encode_line(line: &str, dst: &mut BytesMut) -> Result<()> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.contains(['\r', '\n']) {
            return Err(ProtocolError::IllegalLineBreak(line.to_owned()));
        }
        dst.reserve(line.len() + 2);
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(feature = "tokio")]
impl tokio_util::codec::Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        Ok(self.next_line(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        let line = self.next_line(src);
        if line.is_none() && !src.is_empty() {
            // A fragment without a delimiter is not a line.
            src.clear();
            self.next_index = 0;
        }
        Ok(line)
    }
}

#[cfg(feature = "tokio")]
impl<T: AsRef<str>> tokio_util::codec::Encoder<T> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, line: T, dst: &mut BytesMut) -> Result<()> {
        Self::encode_line(line.as_ref(), dst)
    }
}
