use std::net::SocketAddr;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to start a connection to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The target could not be parsed or resolved.
    #[error("bad address {addr:?}: {reason}")]
    BadAddress { addr: String, reason: String },

    /// The listener failed in a way that is not tied to a single connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// The readiness multiplexer failed.
    #[error("poller error: {0}")]
    Poll(std::io::Error),

    /// An I/O error occurred on a socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// The underlying OS error, when there is one.
    pub fn io_error(&self) -> Option<&std::io::Error> {
        match self {
            TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
                Some(source)
            }
            TransportError::Accept(err) | TransportError::Poll(err) | TransportError::Io(err) => {
                Some(err)
            }
            TransportError::BadAddress { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
