//! Client connection state machine
//!
//! Every accepted client moves through:
//!
//! ```text
//! Accepted -> AwaitingRequest -> InTransaction -> AwaitingRequest -> ... -> Closed
//! ```
//!
//! `Closed` is terminal and any state may fall into it.

use std::fmt;

use crate::error::{Error, Result};

/// Identity of an accepted client connection
///
/// Assigned by the multiplexer in accept order and never reused within a
/// process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Accepted, not yet read from
    #[default]
    Accepted,

    /// Waiting for the next request frame
    AwaitingRequest,

    /// Request forwarded to the bus link, reply pending
    InTransaction,

    /// Connection closed
    Closed,
}

impl ConnectionState {
    /// Check whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Accepted, AwaitingRequest)
                | (AwaitingRequest, InTransaction)
                | (InTransaction, AwaitingRequest)
                | (Accepted | AwaitingRequest | InTransaction, Closed)
        )
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn advance(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidTransition { from: *self, to: next });
        }

        *self = next;
        Ok(())
    }

    /// Check if no further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}
