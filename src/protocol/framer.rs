//! Line framing for the telemetry stream.
//!
//! The board emits newline-terminated ASCII records. The framer turns an
//! unbounded byte stream into discrete text records, retaining partial
//! trailing bytes for the next chunk.

use bytes::{Buf, BytesMut};

/// Maximum length of a single record, delimiter excluded.
///
/// A buffer that grows past this without a delimiter is discarded and
/// framing resumes from the next delimiter, so a stuck or garbage-spewing
/// link cannot grow the buffer without bound.
pub const MAX_LINE_LEN: usize = 512;

/// Record delimiter.
const DELIMITER: u8 = b'\n';

/// Splits a raw byte stream into newline-delimited text records.
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    max_line: usize,
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    /// Creates a framer with the default length guard.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_LEN)
    }

    /// Creates a framer with a custom maximum record length.
    #[must_use]
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_line,
            discarding: false,
        }
    }

    /// Feeds a chunk of raw bytes into the framer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the next complete record, or `None` if more data is needed.
    ///
    /// Records are decoded as lossy UTF-8 with the trailing `\r` (if any)
    /// removed. An oversized record is silently dropped and framing resumes
    /// from the next delimiter.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            if self.discarding {
                match self.buffer.iter().position(|&b| b == DELIMITER) {
                    Some(pos) => {
                        self.buffer.advance(pos + 1);
                        self.discarding = false;
                    }
                    None => {
                        self.buffer.clear();
                        return None;
                    }
                }
            }

            match self.buffer.iter().position(|&b| b == DELIMITER) {
                Some(pos) if pos > self.max_line => {
                    tracing::debug!("dropping oversized record ({pos} bytes)");
                    self.buffer.advance(pos + 1);
                }
                Some(pos) => {
                    let mut line = self.buffer.split_to(pos + 1);
                    line.truncate(pos);
                    if line.last() == Some(&b'\r') {
                        line.truncate(pos - 1);
                    }
                    return Some(String::from_utf8_lossy(&line).into_owned());
                }
                None if self.buffer.len() > self.max_line => {
                    tracing::debug!(
                        "record exceeds {} bytes without delimiter, discarding",
                        self.max_line
                    );
                    self.buffer.clear();
                    self.discarding = true;
                    return None;
                }
                None => return None,
            }
        }
    }

    /// Returns the number of bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drops all buffered bytes and any discard state.
    ///
    /// Used when the inbound buffer is flushed around a command write and
    /// when a connection is reopened.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}
