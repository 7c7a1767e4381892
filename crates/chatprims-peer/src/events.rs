use std::ops::{BitOr, BitOrAssign};

use chatprims_transport::Interest;

/// Advisory summary of what an engine is waiting for.
///
/// Meant for callers that embed the engine in their own event loop: watch
/// [`descriptor`](crate::ChatClient::descriptor) for these events, then call
/// `update` with a zero timeout.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PendingEvents(u8);

impl PendingEvents {
    pub const NONE: PendingEvents = PendingEvents(0);
    /// Incoming data or connections are of interest.
    pub const INPUT: PendingEvents = PendingEvents(0b01);
    /// Queued output is waiting for the socket to become writable.
    pub const OUTPUT: PendingEvents = PendingEvents(0b10);

    pub fn contains(self, other: PendingEvents) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The matching readiness interest, or `None` when nothing is pending.
    pub fn to_interest(self) -> Option<Interest> {
        let input = self.contains(PendingEvents::INPUT).then_some(Interest::READABLE);
        let output = self.contains(PendingEvents::OUTPUT).then_some(Interest::WRITABLE);
        match (input, output) {
            (Some(read), Some(write)) => Some(read | write),
            (read, write) => read.or(write),
        }
    }
}

impl BitOr for PendingEvents {
    type Output = PendingEvents;

    fn bitor(self, rhs: PendingEvents) -> PendingEvents {
        PendingEvents(self.0 | rhs.0)
    }
}

impl BitOrAssign for PendingEvents {
    fn bitor_assign(&mut self, rhs: PendingEvents) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Debug for PendingEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (
            self.contains(PendingEvents::INPUT),
            self.contains(PendingEvents::OUTPUT),
        ) {
            (false, false) => f.write_str("NONE"),
            (true, false) => f.write_str("INPUT"),
            (false, true) => f.write_str("OUTPUT"),
            (true, true) => f.write_str("INPUT | OUTPUT"),
        }
    }
}
