use std::collections::VecDeque;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use chatprims_frame::{Message, DEFAULT_MAX_BUFFER_SIZE};
use chatprims_transport::{is_hangup, tcp, Events, Poller, Token, WaitOutcome};
use tracing::{debug, info, trace};

use crate::connection::{Connection, ConnectionState};
use crate::error::{ChatError, Result};
use crate::events::PendingEvents;

/// Only one socket is ever registered.
pub const DEFAULT_CLIENT_EVENT_CAPACITY: usize = 1;

const SOCKET: Token = Token(1);

/// Client tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Limit for the inbound record length and the outbound queue.
    pub max_buffer_size: usize,
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            event_capacity: DEFAULT_CLIENT_EVENT_CAPACITY,
        }
    }
}

struct Session {
    poller: Poller,
    connection: Connection,
    events: Events,
}

/// One connection to a chat server.
///
/// Outgoing bytes are queued by [`ChatClient::feed`] and sent from
/// [`ChatClient::update`]; received lines come out of [`ChatClient::pop_next`].
pub struct ChatClient {
    config: ClientConfig,
    session: Option<Session>,
    messages: VecDeque<Message>,
    closed: bool,
}

impl ChatClient {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            session: None,
            messages: VecDeque::new(),
            closed: false,
        }
    }

    /// Start connecting to `address` (`host:port`).
    ///
    /// Returns once the connect is in flight; it completes during `update`.
    /// Every resolved address is tried until a socket can be created.
    pub fn connect(&mut self, address: &str) -> Result<()> {
        if self.session.is_some() || self.closed {
            return Err(ChatError::AlreadyStarted);
        }

        let addrs = tcp::resolve(address)?;
        let poller = Poller::new()?;

        let mut last_err = None;
        for addr in addrs {
            match tcp::connect_nonblocking(addr) {
                Ok(stream) => {
                    let connection = Connection::connecting(
                        &poller,
                        stream,
                        addr,
                        SOCKET,
                        self.config.max_buffer_size,
                    )?;
                    info!(%addr, "chat client connecting");
                    self.session = Some(Session {
                        poller,
                        connection,
                        events: Events::with_capacity(self.config.event_capacity),
                    });
                    return Ok(());
                }
                Err(err) => {
                    debug!(%addr, error = %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }

        Err(match last_err {
            Some(err) => err.into(),
            None => ChatError::BadAddress(address.to_string()),
        })
    }

    /// The remote address, while connected or connecting.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.session
            .as_ref()
            .map(|session| session.connection.peer_addr())
    }

    pub fn state(&self) -> Option<ConnectionState> {
        if self.closed {
            return Some(ConnectionState::Removed);
        }
        self.session
            .as_ref()
            .map(|session| session.connection.state())
    }

    /// Wait for at most `timeout` (`None` blocks) and handle what became ready.
    ///
    /// On timeout any queued output is still attempted before
    /// [`ChatError::Timeout`] is returned. Once the connection is lost every
    /// call fails with [`ChatError::System`]; messages received before that
    /// stay available from [`ChatClient::pop_next`].
    pub fn update(&mut self, timeout: Option<Duration>) -> Result<()> {
        if self.closed {
            return Err(ChatError::closed());
        }
        let Some(session) = self.session.as_mut() else {
            return Err(ChatError::NotStarted);
        };
        let Session {
            poller,
            connection,
            events,
        } = session;

        let outcome = poller.wait(events, timeout)?;
        match outcome {
            WaitOutcome::Timeout => {
                if connection.state() == ConnectionState::Open && connection.pending_output() > 0 {
                    trace!("flushing on timeout");
                    connection.flush_ready(poller);
                }
            }
            WaitOutcome::Ready(_) => {
                let mut received = Vec::new();
                for event in events.iter() {
                    connection.mark_open();
                    let hangup = is_hangup(event);
                    if event.is_readable() || hangup || event.is_error() {
                        connection.read_ready(&mut received);
                    }
                    if event.is_writable() {
                        connection.flush_ready(poller);
                    }
                    if event.is_error() {
                        connection.close("socket error");
                    } else if hangup {
                        connection.close("hangup");
                    }
                }
                self.messages.extend(received);
            }
        }

        if !connection.is_active() {
            return Err(self.shut_down());
        }
        match outcome {
            WaitOutcome::Timeout => Err(ChatError::Timeout),
            WaitOutcome::Ready(_) => Ok(()),
        }
    }

    /// Queue raw bytes for sending. Lines must be terminated by the caller.
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(ChatError::closed());
        }
        let Some(session) = self.session.as_mut() else {
            return Err(ChatError::NotStarted);
        };
        if data.is_empty() {
            return Ok(());
        }

        if let Err(err) = session.connection.queue_bytes(&session.poller, data) {
            self.shut_down();
            return Err(err);
        }
        Ok(())
    }

    /// Next received message, oldest first.
    pub fn pop_next(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    /// [`PendingEvents::INPUT`] while connected, plus
    /// [`PendingEvents::OUTPUT`] when output is queued.
    pub fn pending_events(&self) -> PendingEvents {
        let Some(session) = self.session.as_ref() else {
            return PendingEvents::NONE;
        };
        let mut events = PendingEvents::INPUT;
        if session.connection.pending_output() > 0 {
            events |= PendingEvents::OUTPUT;
        }
        events
    }

    /// The socket descriptor, for use in an external event loop.
    pub fn descriptor(&self) -> Option<RawFd> {
        self.session
            .as_ref()
            .map(|session| session.connection.as_raw_fd())
    }

    /// Release the connection and latch the closed state.
    fn shut_down(&mut self) -> ChatError {
        self.closed = true;
        let Some(mut session) = self.session.take() else {
            return ChatError::closed();
        };
        let err = session.connection.take_failure();
        session.connection.release(&session.poller);
        info!(addr = %session.connection.peer_addr(), "chat client disconnected");
        err
    }
}

impl Default for ChatClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("peer_addr", &self.peer_addr())
            .field("state", &self.state())
            .field("queued_messages", &self.messages.len())
            .finish()
    }
}
