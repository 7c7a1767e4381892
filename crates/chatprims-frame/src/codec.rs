use bytes::Bytes;
use tracing::trace;

use crate::buffer::{ByteBuffer, DEFAULT_MAX_BUFFER_SIZE};
use crate::error::{FrameError, Result};
use crate::message::Message;

/// Record terminator on the wire.
pub const NEWLINE: u8 = b'\n';

/// Whitespace as understood by C `isspace` in the "C" locale.
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

/// Range `(start, end)` of `line` with surrounding whitespace removed.
///
/// `start == end` means the line is blank.
pub fn trim_line(line: &[u8]) -> (usize, usize) {
    let start = line
        .iter()
        .position(|&b| !is_space(b))
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|&b| !is_space(b))
        .map_or(start, |last| last + 1);
    (start, end)
}

/// Append `payload` as one wire line: trimmed, followed by `\n`.
///
/// Returns `Ok(false)` without touching `dst` when the payload is blank.
/// On overflow `dst` is left unchanged.
pub fn encode_line(payload: &[u8], dst: &mut ByteBuffer) -> Result<bool> {
    let (start, end) = trim_line(payload);
    if start == end {
        return Ok(false);
    }
    let line = &payload[start..end];
    if line.contains(&NEWLINE) {
        return Err(FrameError::EmbeddedNewline);
    }

    dst.reserve(line.len().saturating_add(1))?;
    dst.append(line)?;
    dst.append(&[NEWLINE])?;
    Ok(true)
}

/// Splits a byte stream into newline-terminated messages.
///
/// The internal buffer only ever holds the trailing partial record; complete
/// records are resolved as soon as their newline arrives. Every record,
/// terminated or not, is bounded by the size limit, so whether a stream
/// overflows never depends on how it was split into reads.
pub struct LineFramer {
    partial: ByteBuffer,
}

impl LineFramer {
    /// Create a framer with the default partial-record limit.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_BUFFER_SIZE)
    }

    /// Create a framer that rejects records longer than `max_size` bytes.
    pub fn with_limit(max_size: usize) -> Self {
        Self {
            partial: ByteBuffer::with_limit(max_size),
        }
    }

    /// Feed newly received bytes and collect the messages they complete.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Message>> {
        let mut out = Vec::new();
        self.feed_into(data, &mut out)?;
        Ok(out)
    }

    /// Like [`LineFramer::feed`], but appends to `out`.
    ///
    /// Messages completed before an overflow stay in `out` even when an error
    /// is returned. Returns the number of messages appended.
    pub fn feed_into(&mut self, mut data: &[u8], out: &mut Vec<Message>) -> Result<usize> {
        let produced = out.len();

        while let Some(pos) = data.iter().position(|&b| b == NEWLINE) {
            let line = &data[..pos];
            data = &data[pos + 1..];

            let record = if self.partial.is_empty() {
                if line.len() > self.partial.max_size() {
                    return Err(FrameError::BufferOverflow {
                        len: 0,
                        additional: line.len(),
                        max: self.partial.max_size(),
                    });
                }
                let (start, end) = trim_line(line);
                (start < end).then(|| Bytes::copy_from_slice(&line[start..end]))
            } else {
                self.partial.append(line)?;
                let joined = self.partial.split_to(self.partial.len()).freeze();
                let (start, end) = trim_line(&joined);
                (start < end).then(|| joined.slice(start..end))
            };

            match record {
                Some(payload) => out.push(Message::from_framed(payload)),
                None => trace!("dropping blank line"),
            }
        }

        self.partial.append(data)?;
        Ok(out.len() - produced)
    }

    /// Bytes of the record that has not been terminated yet.
    pub fn pending(&self) -> &[u8] {
        self.partial.as_slice()
    }

    /// Discard any partial record.
    pub fn reset(&mut self) {
        self.partial.clear();
    }

    pub fn max_size(&self) -> usize {
        self.partial.max_size()
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LineFramer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineFramer")
            .field("pending", &self.partial.len())
            .field("max_size", &self.partial.max_size())
            .finish()
    }
}
