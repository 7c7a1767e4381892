//! Readiness multiplexing and non-blocking TCP endpoints.
//!
//! This is the lowest layer of chatprims:
//! - [`Poller`] wraps a `mio` poll instance; every registration is edge-triggered
//! - [`tcp`] creates listeners, accepts peers and starts non-blocking connects
//!
//! Nothing here knows about messages or peers. Everything else builds on top of
//! the [`Poller`] and the sockets handed out by [`tcp`].

#[cfg(not(unix))]
compile_error!("chatprims-transport exposes raw descriptors and currently only builds on Unix");

pub mod error;
pub mod poller;
pub mod tcp;

pub use error::{Result, TransportError};
pub use poller::{
    is_hangup, Event, Events, Interest, Poller, Registration, Token, WaitOutcome,
    DEFAULT_EVENT_CAPACITY, READ_WRITE,
};
pub use tcp::{accept, connect_nonblocking, listen, resolve, Accept, TcpListener, TcpStream};
