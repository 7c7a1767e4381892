use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use mio::event::Source;
use mio::{Poll, Registry};
use tracing::trace;

pub use mio::event::Event;
pub use mio::{Events, Interest, Token};

use crate::error::{Result, TransportError};

/// Default number of events returned by a single [`Poller::wait`].
pub const DEFAULT_EVENT_CAPACITY: usize = 32;

/// Read and write interest together.
pub const READ_WRITE: Interest = Interest::READABLE.add(Interest::WRITABLE);

/// Full hangup, or the remote side shut down its write half.
pub fn is_hangup(event: &Event) -> bool {
    event.is_read_closed() || event.is_write_closed()
}

/// Result of a [`Poller::wait`] that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// This many events were stored in the [`Events`] buffer.
    Ready(usize),
    /// Nothing became ready in time, or the wait was interrupted by a signal.
    Timeout,
}

/// Edge-triggered readiness multiplexer.
///
/// Every registration is edge-triggered: a condition is reported once per
/// transition, so sockets must be drained until they would block. The
/// poller's own descriptor is pollable, so an external loop can wait on it
/// and call [`Poller::wait`] with a zero timeout when it fires.
pub struct Poller {
    poll: Poll,
}

impl Poller {
    pub fn new() -> Result<Self> {
        let poll = Poll::new().map_err(TransportError::Poll)?;
        Ok(Self { poll })
    }

    /// The registry, for wakers and other sources registered by the caller.
    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    /// Start watching `source`.
    pub fn register<S>(&self, source: &mut S, token: Token, interest: Interest) -> Result<()>
    where
        S: Source + ?Sized,
    {
        trace!(?token, ?interest, "register");
        self.registry()
            .register(source, token, interest)
            .map_err(TransportError::Poll)
    }

    /// Replace the interest set of an existing registration.
    pub fn reregister<S>(&self, source: &mut S, token: Token, interest: Interest) -> Result<()>
    where
        S: Source + ?Sized,
    {
        trace!(?token, ?interest, "reregister");
        self.registry()
            .reregister(source, token, interest)
            .map_err(TransportError::Poll)
    }

    /// Stop watching `source`.
    pub fn deregister<S>(&self, source: &mut S) -> Result<()>
    where
        S: Source + ?Sized,
    {
        trace!("deregister");
        self.registry()
            .deregister(source)
            .map_err(TransportError::Poll)
    }

    /// Wait for readiness, blocking for at most `timeout` (`None` blocks forever).
    ///
    /// Timeouts are rounded up to whole milliseconds. An interrupted wait is
    /// reported as [`WaitOutcome::Timeout`].
    pub fn wait(&mut self, events: &mut Events, timeout: Option<Duration>) -> Result<WaitOutcome> {
        if let Err(err) = self.poll.poll(events, timeout) {
            if err.kind() == io::ErrorKind::Interrupted {
                trace!("wait interrupted");
                events.clear();
                return Ok(WaitOutcome::Timeout);
            }
            return Err(TransportError::Poll(err));
        }

        match events.iter().count() {
            0 => Ok(WaitOutcome::Timeout),
            n => Ok(WaitOutcome::Ready(n)),
        }
    }
}

impl AsRawFd for Poller {
    fn as_raw_fd(&self) -> RawFd {
        self.poll.as_raw_fd()
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("fd", &self.poll.as_raw_fd())
            .finish()
    }
}

/// A live registration that remembers its interest set.
///
/// [`Registration::set_interest`] only reaches the kernel when the interest
/// actually changes. The source itself stays owned by the caller and is
/// passed back in for every change.
#[derive(Debug)]
pub struct Registration {
    token: Token,
    interest: Interest,
}

impl Registration {
    /// Register `source` and remember the interest set.
    pub fn new<S>(poller: &Poller, source: &mut S, token: Token, interest: Interest) -> Result<Self>
    where
        S: Source + ?Sized,
    {
        poller.register(source, token, interest)?;
        Ok(Self { token, interest })
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn interest(&self) -> Interest {
        self.interest
    }

    /// Switch to `interest`. Returns `true` if the kernel registration changed.
    pub fn set_interest<S>(
        &mut self,
        poller: &Poller,
        source: &mut S,
        interest: Interest,
    ) -> Result<bool>
    where
        S: Source + ?Sized,
    {
        if self.interest == interest {
            return Ok(false);
        }
        poller.reregister(source, self.token, interest)?;
        self.interest = interest;
        Ok(true)
    }

    /// Remove the registration from `poller`.
    pub fn deregister<S>(self, poller: &Poller, source: &mut S) -> Result<()>
    where
        S: Source + ?Sized,
    {
        poller.deregister(source)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use mio::net::UnixStream;

    use super::*;

    fn wait_once(poller: &mut Poller, events: &mut Events, timeout: Duration) -> WaitOutcome {
        poller.wait(events, Some(timeout)).unwrap()
    }

    #[test]
    fn wait_times_out_with_nothing_registered() {
        let mut poller = Poller::new().unwrap();
        let mut events = Events::with_capacity(4);
        let outcome = wait_once(&mut poller, &mut events, Duration::from_millis(5));
        assert_eq!(outcome, WaitOutcome::Timeout);
        assert!(events.is_empty());
    }

    #[test]
    fn readable_event_carries_token() {
        let mut poller = Poller::new().unwrap();
        let (mut left, mut right) = UnixStream::pair().unwrap();
        poller
            .register(&mut right, Token(7), Interest::READABLE)
            .unwrap();

        left.write_all(b"ping").unwrap();

        let mut events = Events::with_capacity(4);
        let outcome = wait_once(&mut poller, &mut events, Duration::from_secs(1));
        assert_eq!(outcome, WaitOutcome::Ready(1));

        let event = events.iter().next().unwrap();
        assert_eq!(event.token(), Token(7));
        assert!(event.is_readable());
        assert!(!event.is_writable());
    }

    #[test]
    fn edge_triggered_reports_transition_once() {
        let mut poller = Poller::new().unwrap();
        let (mut left, mut right) = UnixStream::pair().unwrap();
        poller
            .register(&mut right, Token(1), Interest::READABLE)
            .unwrap();

        left.write_all(b"data").unwrap();

        let mut events = Events::with_capacity(4);
        assert_eq!(
            wait_once(&mut poller, &mut events, Duration::from_secs(1)),
            WaitOutcome::Ready(1)
        );
        // Not drained, but no new transition either.
        assert_eq!(
            wait_once(&mut poller, &mut events, Duration::ZERO),
            WaitOutcome::Timeout
        );
    }

    #[test]
    fn writable_interest_fires_on_empty_socket() {
        let mut poller = Poller::new().unwrap();
        let (mut left, _right) = UnixStream::pair().unwrap();
        poller.register(&mut left, Token(3), READ_WRITE).unwrap();

        let mut events = Events::with_capacity(4);
        wait_once(&mut poller, &mut events, Duration::from_secs(1));
        let event = events.iter().next().unwrap();
        assert!(event.is_writable());
    }

    #[test]
    fn hangup_is_reported_when_peer_closes() {
        let mut poller = Poller::new().unwrap();
        let (left, mut right) = UnixStream::pair().unwrap();
        poller
            .register(&mut right, Token(9), Interest::READABLE)
            .unwrap();
        drop(left);

        let mut events = Events::with_capacity(4);
        wait_once(&mut poller, &mut events, Duration::from_secs(1));
        let event = events.iter().next().unwrap();
        assert_eq!(event.token(), Token(9));
        assert!(is_hangup(event));
    }

    #[test]
    fn set_interest_is_idempotent() {
        let poller = Poller::new().unwrap();
        let (mut left, _right) = UnixStream::pair().unwrap();
        let mut registration =
            Registration::new(&poller, &mut left, Token(5), Interest::READABLE).unwrap();

        assert!(!registration
            .set_interest(&poller, &mut left, Interest::READABLE)
            .unwrap());
        assert!(registration
            .set_interest(&poller, &mut left, READ_WRITE)
            .unwrap());
        assert_eq!(registration.interest(), READ_WRITE);
        assert!(!registration
            .set_interest(&poller, &mut left, READ_WRITE)
            .unwrap());
        assert_eq!(registration.token(), Token(5));

        registration.deregister(&poller, &mut left).unwrap();
    }

    #[test]
    fn deregister_twice_fails() {
        let poller = Poller::new().unwrap();
        let (mut left, _right) = UnixStream::pair().unwrap();
        poller
            .register(&mut left, Token(1), Interest::READABLE)
            .unwrap();
        poller.deregister(&mut left).unwrap();
        let err = poller.deregister(&mut left).unwrap_err();
        assert!(matches!(err, TransportError::Poll(_)));
    }

    #[test]
    fn descriptor_is_stable() {
        let poller = Poller::new().unwrap();
        assert!(poller.as_raw_fd() >= 0);
        assert_eq!(poller.as_raw_fd(), poller.as_raw_fd());
    }
}
