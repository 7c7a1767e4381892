/// Errors that can occur while buffering or framing messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Growing a buffer would exceed its size limit or overflow `usize`.
    #[error("buffer overflow ({len} bytes buffered, {additional} more, max {max})")]
    BufferOverflow {
        len: usize,
        additional: usize,
        max: usize,
    },

    /// A message payload contained a newline.
    #[error("message contains an embedded newline")]
    EmbeddedNewline,

    /// A message payload was empty after trimming.
    #[error("message is empty after trimming")]
    EmptyMessage,

    /// An I/O error occurred while reading or writing lines.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before another complete line was received.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
