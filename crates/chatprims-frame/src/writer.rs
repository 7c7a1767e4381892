use std::io::{ErrorKind, Write};

use crate::buffer::{ByteBuffer, DEFAULT_MAX_BUFFER_SIZE};
use crate::codec::encode_line;
use crate::error::{FrameError, Result};

/// Writes complete lines to any blocking `Write` stream.
pub struct LineWriter<T> {
    inner: T,
    buf: ByteBuffer,
}

impl<T: Write> LineWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: ByteBuffer::with_limit(DEFAULT_MAX_BUFFER_SIZE),
        }
    }

    /// Trim `payload` and send it as one line (blocking).
    ///
    /// Blank payloads are not sent; returns whether a line went out.
    pub fn send(&mut self, payload: &[u8]) -> Result<bool> {
        self.buf.clear();
        if !encode_line(payload, &mut self.buf)? {
            return Ok(false);
        }

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf.as_slice()[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()?;
        Ok(true)
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
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
    use crate::reader::LineReader;

    #[test]
    fn writes_trimmed_line() {
        let mut writer = LineWriter::new(Cursor::new(Vec::<u8>::new()));
        assert!(writer.send(b"  hello  ").unwrap());
        assert_eq!(writer.into_inner().into_inner(), b"hello\n");
    }

    #[test]
    fn blank_payload_is_skipped() {
        let mut writer = LineWriter::new(Cursor::new(Vec::<u8>::new()));
        assert!(!writer.send(b" \t ").unwrap());
        assert!(writer.into_inner().into_inner().is_empty());
    }

    #[test]
    fn zero_write_reports_closed() {
        let mut writer = LineWriter::new(ZeroWriter);
        assert!(matches!(
            writer.send(b"x"),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn short_writes_are_completed() {
        let mut writer = LineWriter::new(OneByteWriter(Vec::new()));
        writer.send(b"abc").unwrap();
        assert_eq!(writer.get_ref().0, b"abc\n");
    }

    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = LineWriter::new(left);
        let mut reader = LineReader::new(right);

        writer.send(b"first").unwrap();
        writer.send(b"second").unwrap();

        assert_eq!(reader.read_message().unwrap().as_str(), Some("first"));
        assert_eq!(reader.read_message().unwrap().as_str(), Some("second"));
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct OneByteWriter(Vec<u8>);

    impl Write for OneByteWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            match buf.first() {
                Some(b) => {
                    self.0.push(*b);
                    Ok(1)
                }
                None => Ok(0),
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
