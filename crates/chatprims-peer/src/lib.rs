//! Single-threaded chat server and client.
//!
//! This is the "just works" layer. A [`ChatServer`] accepts peers and relays
//! every line one peer sends to all the others; a [`ChatClient`] talks to it.
//! Both are driven by calling `update` in a loop, or by embedding
//! [`descriptor`](ChatServer::descriptor) and
//! [`pending_events`](ChatServer::pending_events) in an external poll loop.

pub mod client;
pub mod connection;
pub mod error;
pub mod events;
pub mod registry;
pub mod server;

pub use chatprims_frame::Message;
pub use client::{ChatClient, ClientConfig, DEFAULT_CLIENT_EVENT_CAPACITY};
pub use connection::{Connection, ConnectionState, READ_CHUNK_SIZE};
pub use error::{ChatError, Result};
pub use events::PendingEvents;
pub use registry::{ConnectionId, PeerRegistry};
pub use server::{ChatServer, ServerConfig, DEFAULT_MAX_PEERS, DEFAULT_SERVER_EVENT_CAPACITY};
