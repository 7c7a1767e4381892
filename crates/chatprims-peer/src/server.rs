use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use chatprims_frame::{LineFramer, Message, DEFAULT_MAX_BUFFER_SIZE};
use chatprims_transport::{
    is_hangup, tcp, Accept, Event, Events, Interest, Poller, TcpListener, Token, TransportError,
    WaitOutcome,
};
use tracing::{debug, info, trace, warn};

use crate::connection::Connection;
use crate::error::{ChatError, Result};
use crate::events::PendingEvents;
use crate::registry::{ConnectionId, PeerRegistry};

/// Maximum number of simultaneously connected peers.
pub const DEFAULT_MAX_PEERS: usize = 100;

/// Readiness events handled per `update` call.
pub const DEFAULT_SERVER_EVENT_CAPACITY: usize = 30;

const LISTENER: Token = Token(0);

/// Server tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Connections beyond this count are closed right after accept.
    pub max_peers: usize,
    /// Limit for each peer's inbound record length and outbound queue.
    pub max_buffer_size: usize,
    /// Events handled per `update` call.
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_peers: DEFAULT_MAX_PEERS,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            event_capacity: DEFAULT_SERVER_EVENT_CAPACITY,
        }
    }
}

struct Running {
    poller: Poller,
    listener: TcpListener,
    local_addr: SocketAddr,
    peers: PeerRegistry,
    events: Events,
}

/// Accepts peers and relays every line one of them sends to all the others.
///
/// Single-threaded: all work happens inside [`ChatServer::update`].
pub struct ChatServer {
    config: ServerConfig,
    running: Option<Running>,
    messages: VecDeque<Message>,
    outgoing: LineFramer,
}

impl ChatServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let outgoing = LineFramer::with_limit(config.max_buffer_size);
        Self {
            config,
            running: None,
            messages: VecDeque::new(),
            outgoing,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Start listening on `port` on all IPv4 interfaces. Port 0 picks a free port.
    pub fn listen(&mut self, port: u16) -> Result<()> {
        if self.running.is_some() {
            return Err(ChatError::AlreadyStarted);
        }

        let mut listener = tcp::listen(port).map_err(|err| match err {
            TransportError::Bind { source, .. } if source.kind() == ErrorKind::AddrInUse => {
                ChatError::PortBusy(port)
            }
            other => other.into(),
        })?;
        let local_addr = listener.local_addr().map_err(ChatError::System)?;

        let poller = Poller::new()?;
        poller.register(&mut listener, LISTENER, Interest::READABLE)?;

        info!(%local_addr, max_peers = self.config.max_peers, "chat server started");
        self.running = Some(Running {
            poller,
            listener,
            local_addr,
            peers: PeerRegistry::new(self.config.max_peers),
            events: Events::with_capacity(self.config.event_capacity),
        });
        Ok(())
    }

    /// The bound address, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    pub fn peer_count(&self) -> usize {
        self.running
            .as_ref()
            .map_or(0, |running| running.peers.len())
    }

    /// Wait for at most `timeout` (`None` blocks) and handle one batch of events.
    ///
    /// Returns [`ChatError::Timeout`] if nothing became ready. Peers that fail
    /// during the batch are removed after it; their errors are not returned.
    pub fn update(&mut self, timeout: Option<Duration>) -> Result<()> {
        let Some(running) = self.running.as_mut() else {
            return Err(ChatError::NotStarted);
        };
        let Running {
            poller,
            listener,
            peers,
            events,
            ..
        } = running;

        match poller.wait(events, timeout)? {
            WaitOutcome::Timeout => return Err(ChatError::Timeout),
            WaitOutcome::Ready(n) => trace!(ready = n, "dispatching batch"),
        }

        let mut received = Vec::new();
        let mut result = Ok(());
        for event in events.iter() {
            if event.token() == LISTENER {
                if let Err(err) = accept_all(poller, listener, peers, &self.config) {
                    result = Err(err);
                }
                continue;
            }

            let id = ConnectionId::from_token(event.token());
            dispatch(poller, peers, id, event, &mut received);
            for message in received.drain(..) {
                fan_out(poller, peers, Some(id), &message);
                self.messages.push_back(message);
            }
        }

        remove_closed(poller, peers);
        result
    }

    /// Next message received from any peer, oldest first.
    pub fn pop_next(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    /// Broadcast lines to every connected peer.
    ///
    /// `data` is framed like peer input: a trailing partial line is held until
    /// a later call completes it. The bytes go out on subsequent `update` calls.
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        let Some(running) = self.running.as_mut() else {
            return Err(ChatError::NotStarted);
        };

        let mut lines = Vec::new();
        let framed = self.outgoing.feed_into(data, &mut lines);
        for message in &lines {
            fan_out(&running.poller, &mut running.peers, None, message);
        }
        framed?;
        Ok(())
    }

    /// [`PendingEvents::INPUT`] while listening, plus
    /// [`PendingEvents::OUTPUT`] when any peer has queued output.
    pub fn pending_events(&self) -> PendingEvents {
        let Some(running) = self.running.as_ref() else {
            return PendingEvents::NONE;
        };
        let mut events = PendingEvents::INPUT;
        if running.peers.has_pending_output() {
            events |= PendingEvents::OUTPUT;
        }
        events
    }

    /// The poller's descriptor: readable whenever `update` has work to do.
    pub fn descriptor(&self) -> Option<RawFd> {
        self.running
            .as_ref()
            .map(|running| running.poller.as_raw_fd())
    }
}

impl Default for ChatServer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChatServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatServer")
            .field("local_addr", &self.local_addr())
            .field("peers", &self.peer_count())
            .field("queued_messages", &self.messages.len())
            .finish()
    }
}

/// Accept until the listener would block.
fn accept_all(
    poller: &Poller,
    listener: &TcpListener,
    peers: &mut PeerRegistry,
    config: &ServerConfig,
) -> Result<()> {
    loop {
        match tcp::accept(listener)? {
            Accept::WouldBlock => return Ok(()),
            Accept::Skipped(err) => {
                debug!(error = %err, "accept skipped");
            }
            Accept::Connection(stream, addr) => {
                if peers.is_full() {
                    warn!(%addr, max_peers = peers.max_peers(), "peer limit reached, rejecting");
                    drop(stream);
                    continue;
                }

                let id = peers.allocate_id();
                match Connection::accepted(poller, stream, addr, id.token(), config.max_buffer_size)
                {
                    Ok(connection) => {
                        debug!(%id, %addr, "peer connected");
                        peers.insert(id, connection);
                    }
                    Err(err) => warn!(%addr, error = %err, "failed to register peer"),
                }
            }
        }
    }
}

/// Handle one readiness event for peer `id`.
fn dispatch(
    poller: &Poller,
    peers: &mut PeerRegistry,
    id: ConnectionId,
    event: &Event,
    received: &mut Vec<Message>,
) {
    let Some(peer) = peers.get_mut(id) else {
        trace!(%id, "event for unknown peer");
        return;
    };
    if !peer.is_active() {
        return;
    }

    let hangup = is_hangup(event);
    if event.is_readable() || hangup || event.is_error() {
        let n = peer.read_ready(received);
        if n > 0 {
            trace!(%id, messages = n, "framed");
        }
    }
    if event.is_writable() {
        peer.flush_ready(poller);
    }
    if event.is_error() {
        peer.close("socket error");
    } else if hangup {
        peer.close("hangup");
    }

    if !peer.is_active() {
        peers.defer_removal(id);
    }
}

/// Queue `message` on every live peer except `from`.
///
/// A recipient that cannot take the message is flagged for removal; the
/// remaining recipients still get it.
fn fan_out(
    poller: &Poller,
    peers: &mut PeerRegistry,
    from: Option<ConnectionId>,
    message: &Message,
) {
    let mut dropped = Vec::new();
    for (id, peer) in peers.iter_mut() {
        if Some(id) == from || !peer.is_active() {
            continue;
        }
        if let Err(err) = peer.queue_message(poller, message) {
            debug!(%id, error = %err, "dropping recipient");
        }
        if !peer.is_active() {
            dropped.push(id);
        }
    }
    for id in dropped {
        peers.defer_removal(id);
    }
}

/// Release every peer flagged during the batch.
fn remove_closed(poller: &Poller, peers: &mut PeerRegistry) {
    for id in peers.take_closing() {
        if let Some(mut peer) = peers.remove(id) {
            peer.release(poller);
            debug!(%id, addr = %peer.peer_addr(), remaining = peers.len(), "peer removed");
        }
    }
}
