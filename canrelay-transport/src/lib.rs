//! Transport layer for the relay gateway
//!
//! Provides fixed-size frame I/O over byte streams and the TCP/UDP
//! half-channels that make up the hardware link.

pub mod error;
pub mod framed;
pub mod tcp;
pub mod udp;

pub use error::{Error, Result};
pub use framed::{read_frame, write_frame, Incoming};
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use canrelay_core::Frame;

/// One half-channel of the hardware link
///
/// Outbound half-channels actively connect to the hardware; inbound ones
/// bind a local port and wait for the hardware to reach them.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the half-channel (connect, or bind and accept)
    async fn connect(&mut self) -> Result<()>;

    /// Close the half-channel
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Send one frame in full
    async fn send(&mut self, frame: &Frame) -> Result<()>;

    /// Receive exactly one frame, failing once `timeout` elapses
    async fn receive(&mut self, timeout: Duration) -> Result<Frame>;

    /// Discard anything already buffered without blocking
    ///
    /// Returns the number of bytes thrown away.
    fn drain(&mut self) -> Result<usize>;

    /// Get remote address
    fn remote_addr(&self) -> String;
}

/// Resolve `host:port` to the first matching socket address
pub(crate) async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addr_str = format!("{}:{}", host, port);

    let mut addrs = tokio::net::lookup_host(&addr_str)
        .await
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?;

    addrs
        .next()
        .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))
}

/// Wildcard local address in the same family as `remote`
pub(crate) fn unspecified_for(remote: &SocketAddr) -> SocketAddr {
    match remote {
        SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
        SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
    }
}
