//! Non-blocking, single-threaded text chat over TCP.
//!
//! Peers exchange newline-delimited lines; the server relays every line it
//! receives to all other connected peers.
//!
//! # Crate Structure
//!
//! - [`transport`]: mio readiness multiplexer and non-blocking TCP endpoints
//! - [`frame`]: Growable buffers and newline framing
//! - [`peer`]: Chat server and client engines (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use chatprims_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use chatprims_frame::*;
}

/// Re-export server and client types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use chatprims_peer::*;
}
