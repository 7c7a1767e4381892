use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};

use tracing::{debug, info};

pub use mio::net::{TcpListener, TcpStream};

use crate::error::{Result, TransportError};

/// Outcome of one non-blocking accept attempt.
#[derive(Debug)]
pub enum Accept {
    /// A new non-blocking connection.
    Connection(TcpStream, SocketAddr),
    /// The accept queue is drained.
    WouldBlock,
    /// This attempt failed for reasons local to the connection; keep accepting.
    Skipped(io::Error),
}

/// Bind a non-blocking listener on all IPv4 interfaces.
///
/// Port 0 picks an ephemeral port; use `local_addr()` to learn it.
pub fn listen(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    let listener =
        TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;

    let local = listener.local_addr().unwrap_or(addr);
    info!(%local, "listening");
    Ok(listener)
}

/// Accept one pending connection without blocking.
///
/// Returns `Err` only for listener-level faults that will not go away by
/// retrying (for example descriptor exhaustion or an invalid listener).
pub fn accept(listener: &TcpListener) -> Result<Accept> {
    match listener.accept() {
        Ok((stream, addr)) => {
            if let Err(err) = stream.set_nodelay(true) {
                debug!(%addr, error = %err, "failed to set TCP_NODELAY");
            }
            debug!(%addr, "accepted connection");
            Ok(Accept::Connection(stream, addr))
        }
        Err(err) => match err.kind() {
            ErrorKind::WouldBlock => Ok(Accept::WouldBlock),
            ErrorKind::Interrupted | ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset => {
                debug!(error = %err, "transient accept error");
                Ok(Accept::Skipped(err))
            }
            _ => Err(TransportError::Accept(err)),
        },
    }
}

/// Parse and resolve a `host:port` target.
pub fn resolve(target: &str) -> Result<Vec<SocketAddr>> {
    let bad = |reason: &str| TransportError::BadAddress {
        addr: target.to_string(),
        reason: reason.to_string(),
    };

    let Some((host, port)) = target.rsplit_once(':') else {
        return Err(bad("expected host:port"));
    };
    if host.is_empty() {
        return Err(bad("missing host"));
    }
    if port.parse::<u16>().is_err() {
        return Err(bad("invalid port"));
    }

    let addrs: Vec<SocketAddr> = target
        .to_socket_addrs()
        .map_err(|err| bad(&err.to_string()))?
        .collect();
    if addrs.is_empty() {
        return Err(bad("no addresses found"));
    }
    Ok(addrs)
}

/// Start a TCP connection on a non-blocking socket.
///
/// The connect normally completes later; the first writable readiness event
/// on the returned stream signals the outcome.
pub fn connect_nonblocking(addr: SocketAddr) -> Result<TcpStream> {
    let stream =
        TcpStream::connect(addr).map_err(|source| TransportError::Connect { addr, source })?;
    if let Err(err) = stream.set_nodelay(true) {
        debug!(%addr, error = %err, "failed to set TCP_NODELAY");
    }
    info!(%addr, "connecting");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::time::Duration;

    use super::*;
    use crate::poller::{Events, Poller, Token, WaitOutcome, READ_WRITE};

    #[test]
    fn listen_on_ephemeral_port() {
        let listener = listen(0).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn listen_reports_busy_port() {
        let holder = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = holder.local_addr().unwrap().port();

        let err = listen(port).unwrap_err();
        match err {
            TransportError::Bind { source, .. } => {
                assert_eq!(source.kind(), ErrorKind::AddrInUse)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn accept_would_block_when_queue_empty() {
        let listener = listen(0).unwrap();
        assert!(matches!(accept(&listener).unwrap(), Accept::WouldBlock));
    }

    #[test]
    fn accept_returns_non_blocking_stream() {
        let listener = listen(0).unwrap();
        let port = listener.local_addr().unwrap().port();
        let _client = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();

        let stream = loop {
            match accept(&listener).unwrap() {
                Accept::Connection(stream, _) => break stream,
                Accept::WouldBlock => std::thread::sleep(Duration::from_millis(5)),
                Accept::Skipped(err) => panic!("unexpected skip: {err}"),
            }
        };

        let mut buf = [0u8; 8];
        let err = (&stream).read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
    }

    #[test]
    fn resolve_accepts_ip_and_hostname() {
        let addrs = resolve("127.0.0.1:8080").unwrap();
        assert_eq!(addrs[0], "127.0.0.1:8080".parse().unwrap());

        let addrs = resolve("[::1]:9000").unwrap();
        assert_eq!(addrs[0].port(), 9000);

        let addrs = resolve("localhost:7000").unwrap();
        assert!(addrs.iter().all(|a| a.port() == 7000));
    }

    #[test]
    fn resolve_rejects_malformed_targets() {
        for target in ["", "localhost", ":80", "127.0.0.1:", "127.0.0.1:port", "1.2.3.4:70000"] {
            let err = resolve(target).unwrap_err();
            assert!(
                matches!(err, TransportError::BadAddress { .. }),
                "{target:?} gave {err}"
            );
        }
    }

    #[test]
    fn nonblocking_connect_completes_on_writable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut stream = connect_nonblocking(addr).unwrap();
        let mut poller = Poller::new().unwrap();
        poller.register(&mut stream, Token(1), READ_WRITE).unwrap();

        let mut events = Events::with_capacity(2);
        let outcome = poller
            .wait(&mut events, Some(Duration::from_secs(2)))
            .unwrap();
        assert!(matches!(outcome, WaitOutcome::Ready(_)));
        assert!(events.iter().any(|e| e.is_writable()));

        let (mut server_side, _) = listener.accept().unwrap();
        stream.write_all(b"hi\n").unwrap();
        let mut buf = [0u8; 3];
        server_side.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hi\n");
    }

    #[test]
    fn nonblocking_connect_over_ipv6_loopback() {
        let Ok(listener) = std::net::TcpListener::bind("[::1]:0") else {
            // No IPv6 loopback in this environment.
            return;
        };
        let addr = listener.local_addr().unwrap();
        let stream = connect_nonblocking(addr).unwrap();
        let (_server_side, peer) = listener.accept().unwrap();
        assert_eq!(peer, stream.local_addr().unwrap());
    }
}
