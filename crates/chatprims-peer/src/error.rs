use std::io;

use chatprims_frame::FrameError;
use chatprims_transport::TransportError;

/// Errors returned by [`ChatServer`](crate::ChatServer) and
/// [`ChatClient`](crate::ChatClient) operations.
///
/// Faults that belong to a single peer never show up here; they close that
/// peer and are logged instead.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The engine has not been started with `listen`/`connect` yet.
    #[error("not started")]
    NotStarted,

    /// `listen`/`connect` was called on an engine that is already running.
    #[error("already started")]
    AlreadyStarted,

    /// The connect target could not be parsed or resolved.
    #[error("bad address: {0}")]
    BadAddress(String),

    /// An OS-level failure, or the connection is gone.
    #[error("system error: {0}")]
    System(#[source] io::Error),

    /// The listen port is already in use.
    #[error("port {0} is busy")]
    PortBusy(u16),

    /// Nothing became ready before the timeout expired.
    #[error("timed out")]
    Timeout,

    /// Reserved for optional functionality.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

impl ChatError {
    /// The error reported once a client connection has shut down.
    pub fn closed() -> Self {
        ChatError::System(io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "connection closed",
        ))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ChatError::Timeout)
    }
}

impl From<TransportError> for ChatError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::BadAddress { addr, reason } => {
                ChatError::BadAddress(format!("{addr}: {reason}"))
            }
            TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
                ChatError::System(source)
            }
            TransportError::Accept(err) | TransportError::Poll(err) | TransportError::Io(err) => {
                ChatError::System(err)
            }
        }
    }
}

impl From<FrameError> for ChatError {
    fn from(err: FrameError) -> Self {
        let message = err.to_string();
        let kind = match err {
            FrameError::Io(io) => return ChatError::System(io),
            FrameError::BufferOverflow { .. } => io::ErrorKind::OutOfMemory,
            FrameError::EmbeddedNewline | FrameError::EmptyMessage => io::ErrorKind::InvalidInput,
            FrameError::ConnectionClosed => io::ErrorKind::UnexpectedEof,
        };
        ChatError::System(io::Error::new(kind, message))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
