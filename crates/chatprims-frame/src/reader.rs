use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use crate::buffer::DEFAULT_MAX_BUFFER_SIZE;
use crate::codec::LineFramer;
use crate::error::{FrameError, Result};
use crate::message::Message;

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads complete messages from any blocking `Read` stream.
///
/// Handles partial reads internally; callers always get whole lines.
pub struct LineReader<T> {
    inner: T,
    framer: LineFramer,
    ready: VecDeque<Message>,
}

impl<T: Read> LineReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_limit(inner, DEFAULT_MAX_BUFFER_SIZE)
    }

    /// Create a reader that rejects lines longer than `max_size` bytes.
    pub fn with_limit(inner: T, max_size: usize) -> Self {
        Self {
            inner,
            framer: LineFramer::with_limit(max_size),
            ready: VecDeque::new(),
        }
    }

    /// Read the next message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` at end of stream. A partial
    /// line left at end of stream is not returned.
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some(message) = self.ready.pop_front() {
                return Ok(message);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            let mut out = Vec::new();
            let result = self.framer.feed_into(&chunk[..read], &mut out);
            self.ready.extend(out);
            result?;
        }
    }

    /// Bytes received after the last newline.
    pub fn pending(&self) -> &[u8] {
        self.framer.pending()
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn reads_lines_in_order() {
        let mut reader = LineReader::new(Cursor::new(b"one\n two \n\nthree\n".to_vec()));
        assert_eq!(reader.read_message().unwrap().as_str(), Some("one"));
        assert_eq!(reader.read_message().unwrap().as_str(), Some("two"));
        assert_eq!(reader.read_message().unwrap().as_str(), Some("three"));
        assert!(matches!(
            reader.read_message(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn partial_reads_are_reassembled() {
        let reader = ByteByByteReader {
            bytes: b"slow line\n".to_vec(),
            pos: 0,
        };
        let mut reader = LineReader::new(reader);
        assert_eq!(reader.read_message().unwrap().as_str(), Some("slow line"));
    }

    #[test]
    fn trailing_partial_line_is_not_returned() {
        let mut reader = LineReader::new(Cursor::new(b"done\nunfinished".to_vec()));
        assert_eq!(reader.read_message().unwrap().as_str(), Some("done"));
        assert!(matches!(
            reader.read_message(),
            Err(FrameError::ConnectionClosed)
        ));
        assert_eq!(reader.pending(), b"unfinished");
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            bytes: b"ok\n".to_vec(),
            pos: 0,
        };
        let mut reader = LineReader::new(reader);
        assert_eq!(reader.read_message().unwrap().as_str(), Some("ok"));
    }

    #[test]
    fn overlong_line_is_rejected() {
        let mut reader = LineReader::with_limit(Cursor::new(vec![b'x'; 64]), 16);
        assert!(matches!(
            reader.read_message(),
            Err(FrameError::BufferOverflow { .. })
        ));
    }

    #[test]
    fn reads_from_socket_pair() {
        use std::io::Write;

        let (mut left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut reader = LineReader::new(right);
        left.write_all(b"ping\n").unwrap();
        assert_eq!(reader.read_message().unwrap().as_str(), Some("ping"));
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            let remaining = &self.bytes[self.pos..];
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            self.pos += n;
            Ok(n)
        }
    }
}
