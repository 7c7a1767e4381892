use std::fmt;

use bytes::Bytes;

use crate::codec::trim_line;
use crate::error::{FrameError, Result};

/// One complete chat message: trimmed, non-empty, without a newline.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Message {
    payload: Bytes,
}

impl Message {
    /// Build a message from caller-supplied text.
    ///
    /// The payload is trimmed the same way received lines are. Payloads that
    /// contain a newline or are empty after trimming are rejected.
    pub fn new(payload: impl Into<Bytes>) -> Result<Self> {
        let payload: Bytes = payload.into();
        if payload.contains(&b'\n') {
            return Err(FrameError::EmbeddedNewline);
        }
        let (start, end) = trim_line(&payload);
        if start == end {
            return Err(FrameError::EmptyMessage);
        }
        Ok(Self {
            payload: payload.slice(start..end),
        })
    }

    /// Wrap bytes the framer has already trimmed and checked.
    pub(crate) fn from_framed(payload: Bytes) -> Self {
        debug_assert!(!payload.is_empty());
        Self { payload }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// The payload as UTF-8, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.payload
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Message")
            .field(&String::from_utf8_lossy(&self.payload))
            .finish()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.payload))
    }
}
