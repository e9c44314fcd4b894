//! Transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,
    
    #[error("Already connected")]
    AlreadyConnected,
    
    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Timed out waiting for peer to connect on {0}")]
    AcceptTimeout(String),
    
    #[error("Read timeout")]
    ReadTimeout,
    
    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("Malformed datagram: {0} bytes")]
    MalformedDatagram(usize),
    
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Frame error: {0}")]
    Core(#[from] canrelay_core::Error),
}
