use bytes::{Buf, BytesMut};

use crate::error::{FrameError, Result};

/// Capacity allocated on first growth.
pub const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Default upper bound for a single buffer: 16 MiB.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Append-only byte buffer with doubling growth and a hard size limit.
///
/// Growth arithmetic is checked: an append that would overflow `usize` or
/// exceed the limit fails with [`FrameError::BufferOverflow`] and leaves the
/// buffer untouched. Nothing is ever silently truncated.
pub struct ByteBuffer {
    buf: BytesMut,
    max_size: usize,
}

impl ByteBuffer {
    /// Create an empty buffer with the default size limit.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_BUFFER_SIZE)
    }

    /// Create an empty buffer that never holds more than `max_size` bytes.
    pub fn with_limit(max_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_size,
        }
    }

    /// Make room for `additional` more bytes.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let len = self.buf.len();
        let max = self.max_size;
        let overflow = FrameError::BufferOverflow {
            len,
            additional,
            max,
        };

        let Some(needed) = len.checked_add(additional) else {
            return Err(overflow);
        };
        if needed > max {
            return Err(overflow);
        }
        if needed <= self.buf.capacity() {
            return Ok(());
        }

        let target = grown_capacity(self.buf.capacity(), needed, max);
        self.buf.reserve(target - len);
        Ok(())
    }

    /// Append `data` at the end.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        self.reserve(data.len())?;
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Drop the first `n` bytes (or everything, if fewer are buffered).
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.advance(n);
    }

    /// Detach the first `n` bytes.
    pub(crate) fn split_to(&mut self, n: usize) -> BytesMut {
        self.buf.split_to(n)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for ByteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("len", &self.buf.len())
            .field("capacity", &self.buf.capacity())
            .field("max_size", &self.max_size)
            .finish()
    }
}

fn grown_capacity(current: usize, needed: usize, max: usize) -> usize {
    let mut capacity = current.max(INITIAL_BUFFER_CAPACITY);
    while capacity < needed {
        capacity = match capacity.checked_mul(2) {
            Some(doubled) => doubled,
            None => return needed,
        };
    }
    capacity.min(max).max(needed)
}
