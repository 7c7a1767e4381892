use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};

use chatprims_frame::{encode_line, ByteBuffer, LineFramer, Message};
use chatprims_transport::{Interest, Poller, Registration, TcpStream, Token, READ_WRITE};
use tracing::{debug, trace, warn};

use crate::error::{ChatError, Result};

/// Size of the on-stack receive buffer used for every read.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Lifecycle of one socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Client only: the connect is still in progress.
    Connecting,
    Open,
    /// An error or shutdown was seen; no more I/O. Removed at the end of the batch.
    Closing,
    /// Deregistered and released.
    Removed,
}

/// One socket with its inbound framer, outbound queue and registration.
pub struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    inbound: LineFramer,
    outbound: ByteBuffer,
    registration: Option<Registration>,
    state: ConnectionState,
    failure: Option<io::Error>,
}

impl Connection {
    /// Register an accepted socket for read interest.
    pub(crate) fn accepted(
        poller: &Poller,
        stream: TcpStream,
        peer_addr: SocketAddr,
        token: Token,
        max_buffer_size: usize,
    ) -> Result<Self> {
        Self::register(
            poller,
            stream,
            peer_addr,
            token,
            Interest::READABLE,
            ConnectionState::Open,
            max_buffer_size,
        )
    }

    /// Register a socket with a connect in progress for read and write interest.
    pub(crate) fn connecting(
        poller: &Poller,
        stream: TcpStream,
        peer_addr: SocketAddr,
        token: Token,
        max_buffer_size: usize,
    ) -> Result<Self> {
        Self::register(
            poller,
            stream,
            peer_addr,
            token,
            READ_WRITE,
            ConnectionState::Connecting,
            max_buffer_size,
        )
    }

    fn register(
        poller: &Poller,
        mut stream: TcpStream,
        peer_addr: SocketAddr,
        token: Token,
        interest: Interest,
        state: ConnectionState,
        max_buffer_size: usize,
    ) -> Result<Self> {
        let registration = Registration::new(poller, &mut stream, token, interest)?;
        Ok(Self {
            stream,
            peer_addr,
            inbound: LineFramer::with_limit(max_buffer_size),
            outbound: ByteBuffer::with_limit(max_buffer_size),
            registration: Some(registration),
            state,
            failure: None,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// `true` while the connection may still do I/O.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        )
    }

    pub fn is_closing(&self) -> bool {
        self.state == ConnectionState::Closing
    }

    /// Bytes queued for send.
    pub fn pending_output(&self) -> usize {
        self.outbound.len()
    }

    /// Bytes received after the last newline.
    pub fn pending_input(&self) -> &[u8] {
        self.inbound.pending()
    }

    pub(crate) fn mark_open(&mut self) {
        if self.state == ConnectionState::Connecting {
            debug!(addr = %self.peer_addr, "connected");
            self.state = ConnectionState::Open;
        }
    }

    /// Flag the connection for removal at the end of the batch.
    pub(crate) fn close(&mut self, reason: &str) {
        if self.is_active() {
            debug!(addr = %self.peer_addr, reason, "closing connection");
            self.state = ConnectionState::Closing;
        }
    }

    /// Close because of an OS error, keeping the first one for the caller.
    fn fail(&mut self, err: io::Error, reason: &str) {
        debug!(addr = %self.peer_addr, error = %err, reason, "connection failed");
        if self.failure.is_none() {
            self.failure = Some(err);
        }
        self.close(reason);
    }

    /// The error that explains why the connection stopped.
    ///
    /// Falls back to the pending socket error (`SO_ERROR`) and finally to a
    /// generic "connection closed".
    pub(crate) fn take_failure(&mut self) -> ChatError {
        let err = self
            .failure
            .take()
            .or_else(|| self.stream.take_error().ok().flatten());
        match err {
            Some(err) => ChatError::System(err),
            None => ChatError::closed(),
        }
    }

    /// Drain the socket until it would block, appending every completed
    /// message to `out`. Returns the number of messages appended.
    pub(crate) fn read_ready(&mut self, out: &mut Vec<Message>) -> usize {
        let before = out.len();
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        while self.is_active() {
            match self.stream.read(&mut chunk) {
                Ok(0) => self.close("end of stream"),
                Ok(n) => {
                    trace!(addr = %self.peer_addr, bytes = n, "received");
                    if let Err(err) = self.inbound.feed_into(&chunk[..n], out) {
                        warn!(addr = %self.peer_addr, error = %err, "inbound buffer overflow");
                        self.close("inbound overflow");
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => self.fail(err, "receive error"),
            }
        }

        out.len() - before
    }

    /// Send queued bytes until drained or the socket would block.
    ///
    /// Write interest is dropped once the queue is empty.
    pub(crate) fn flush_ready(&mut self, poller: &Poller) {
        while self.is_active() && !self.outbound.is_empty() {
            match self.stream.write(self.outbound.as_slice()) {
                Ok(0) => self.close("send returned zero"),
                Ok(n) => {
                    trace!(addr = %self.peer_addr, bytes = n, "sent");
                    self.outbound.consume(n);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => self.fail(err, "send error"),
            }
        }

        if self.is_active() && self.outbound.is_empty() {
            self.set_interest(poller, Interest::READABLE);
        }
    }

    /// Queue one message as a wire line.
    ///
    /// On overflow the connection is closed and the error returned.
    pub(crate) fn queue_message(&mut self, poller: &Poller, message: &Message) -> Result<()> {
        let was_empty = self.outbound.is_empty();
        match encode_line(message.as_bytes(), &mut self.outbound) {
            Ok(_) => {
                if was_empty {
                    self.set_interest(poller, READ_WRITE);
                }
                Ok(())
            }
            Err(err) => {
                warn!(addr = %self.peer_addr, error = %err, "outbound buffer overflow");
                self.close("outbound overflow");
                Err(err.into())
            }
        }
    }

    /// Queue raw bytes exactly as given.
    pub(crate) fn queue_bytes(&mut self, poller: &Poller, data: &[u8]) -> Result<()> {
        if let Err(err) = self.outbound.append(data) {
            warn!(addr = %self.peer_addr, error = %err, "outbound buffer overflow");
            self.close("outbound overflow");
            return Err(err.into());
        }
        self.set_interest(poller, READ_WRITE);
        Ok(())
    }

    fn set_interest(&mut self, poller: &Poller, interest: Interest) {
        let Some(registration) = self.registration.as_mut() else {
            return;
        };
        if let Err(err) = registration.set_interest(poller, &mut self.stream, interest) {
            warn!(addr = %self.peer_addr, error = %err, "failed to update interest");
            self.close("registration error");
        }
    }

    /// Deregister from `poller` and drop both buffers.
    ///
    /// Only the first call does anything.
    pub(crate) fn release(&mut self, poller: &Poller) {
        let Some(registration) = self.registration.take() else {
            return;
        };
        if let Err(err) = registration.deregister(poller, &mut self.stream) {
            debug!(addr = %self.peer_addr, error = %err, "deregister failed");
        }
        self.inbound.reset();
        self.outbound.clear();
        self.state = ConnectionState::Removed;
        trace!(addr = %self.peer_addr, "released");
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state)
            .field("pending_input", &self.inbound.pending().len())
            .field("pending_output", &self.outbound.len())
            .finish()
    }
}
