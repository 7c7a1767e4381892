use std::collections::BTreeMap;
use std::fmt;

use chatprims_transport::Token;

use crate::connection::Connection;

/// Stable identifier of one accepted peer.
///
/// Ids are never reused, so a stale readiness token can never reach a newer
/// peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(usize);

impl ConnectionId {
    pub fn get(self) -> usize {
        self.0
    }

    pub fn token(self) -> Token {
        Token(self.0)
    }

    pub fn from_token(token: Token) -> Self {
        ConnectionId(token.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Owning map of live peers, bounded by a maximum count.
///
/// Iteration order is id order, i.e. accept order. Peers flagged during a
/// batch are queued with [`PeerRegistry::defer_removal`] and only taken out
/// once the batch is over.
#[derive(Debug)]
pub struct PeerRegistry {
    peers: BTreeMap<ConnectionId, Connection>,
    closing: Vec<ConnectionId>,
    max_peers: usize,
    next_id: usize,
}

impl PeerRegistry {
    /// Ids start at 1; token 0 stays free for the listener.
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: BTreeMap::new(),
            closing: Vec::new(),
            max_peers,
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.peers.len() >= self.max_peers
    }

    pub fn max_peers(&self) -> usize {
        self.max_peers
    }

    /// Hand out the next unused id.
    pub fn allocate_id(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn insert(&mut self, id: ConnectionId, connection: Connection) {
        self.peers.insert(id, connection);
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.peers.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.peers.get_mut(&id)
    }

    pub(crate) fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.peers.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, &Connection)> {
        self.peers.iter().map(|(id, conn)| (*id, conn))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (ConnectionId, &mut Connection)> {
        self.peers.iter_mut().map(|(id, conn)| (*id, conn))
    }

    /// Queue `id` for removal after the current batch.
    pub(crate) fn defer_removal(&mut self, id: ConnectionId) {
        if !self.closing.contains(&id) {
            self.closing.push(id);
        }
    }

    /// Peers queued for removal, in the order they were flagged.
    pub fn closing_ids(&self) -> &[ConnectionId] {
        &self.closing
    }

    /// Take every queued id, leaving the queue empty.
    pub(crate) fn take_closing(&mut self) -> Vec<ConnectionId> {
        std::mem::take(&mut self.closing)
    }

    /// `true` if any peer has bytes waiting to be sent.
    pub fn has_pending_output(&self) -> bool {
        self.peers.values().any(|conn| conn.pending_output() > 0)
    }
}
