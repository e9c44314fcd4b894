//! Error types for canrelay-core

use crate::state::ConnectionState;

/// Result type alias for canrelay-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Buffer is not exactly one frame long
    #[error("Invalid frame length: expected {expected} bytes, got {actual} bytes")]
    InvalidFrameLength {
        expected: usize,
        actual: usize,
    },
    
    /// Connection state machine rejected a transition
    #[error("Invalid connection state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}
