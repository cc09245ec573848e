//! Client-side disconnect reason slot.

use netportal_protocol::ConnectStatus;

/// The last reason the client was given for a disconnect.
///
/// Distinguishes "nothing was said" (`Undefined`, not set) from an explicit
/// reason. The server's `SetDisconnectReason` message fills it; the
/// presentation layer reads it once, shows a message, and clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisconnectReason {
    reason: ConnectStatus,
    has_been_set: bool,
}

impl DisconnectReason {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an explicit reason, replacing any earlier one.
    pub fn set(&mut self, reason: ConnectStatus) {
        self.reason = reason;
        self.has_been_set = true;
    }

    /// Back to "nothing was said".
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The stored reason, `Undefined` if none.
    pub fn reason(&self) -> ConnectStatus {
        self.reason
    }

    /// `true` once [`set`](Self::set) has been called since the last clear.
    pub fn has_transition_reason(&self) -> bool {
        self.has_been_set
    }

    /// Reads and clears in one step.
    pub fn take(&mut self) -> Option<ConnectStatus> {
        let reason = self.has_been_set.then_some(self.reason);
        self.clear();
        reason
    }
}
