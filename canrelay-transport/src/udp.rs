//! UDP half-channel
//!
//! Each frame travels as one datagram. The outbound side is a connected
//! socket on an ephemeral port; the inbound side is bound to the
//! well-known `can2lan` port and takes datagrams from whoever sends them.
//! There is no handshake, so the inbound side is ready as soon as it is
//! bound.

use std::io::{self, Read};
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use canrelay_core::{Frame, FRAME_SIZE};
use socket2::{SockRef, Socket};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::{error::*, Transport};

/// Receive buffer, larger than a frame so oversize datagrams are detected
const DATAGRAM_BUF: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Connect,
    Bind,
}

/// UDP half-channel to the hardware
pub struct UdpTransport {
    host: String,
    port: u16,
    role: Role,
    socket: Option<UdpSocket>,
    peer_addr: Option<SocketAddr>,
    connect_timeout: Duration,
}

impl UdpTransport {
    /// Half-channel sending to `host:port`
    pub fn connect_to(host: impl Into<String>, port: u16) -> Self {
        Self::with_role(host.into(), port, Role::Connect)
    }

    /// Half-channel receiving on `bind_host:port`
    pub fn bind_on(bind_host: impl Into<String>, port: u16) -> Self {
        Self::with_role(bind_host.into(), port, Role::Bind)
    }

    fn with_role(host: String, port: u16, role: Role) -> Self {
        Self {
            host,
            port,
            role,
            socket: None,
            peer_addr: None,
            connect_timeout: Duration::from_secs(1),
        }
    }

    /// Bound how long address resolution may take
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Local address of the bound socket
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let socket = self.socket.as_ref().ok_or(Error::NotConnected)?;
        Ok(socket.local_addr()?)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let addr = timeout(self.connect_timeout, crate::resolve(&self.host, self.port))
            .await
            .map_err(|_| Error::ConnectionTimeout)??;

        let socket = match self.role {
            Role::Connect => {
                debug!("Connecting to {} via UDP...", addr);

                // Bind to any available local port
                let socket = UdpSocket::bind(crate::unspecified_for(&addr)).await?;

                // Connect to remote address (sets default send/recv target)
                socket.connect(addr).await?;
                self.peer_addr = Some(addr);

                debug!("Connected to {} via UDP", addr);
                socket
            }
            Role::Bind => {
                let socket = UdpSocket::bind(addr).await?;
                debug!("Listening for datagrams on {}", addr);
                socket
            }
        };

        self.socket = Some(socket);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.socket.take().is_some() {
            debug!("Disconnecting from {}...", self.remote_addr());
        }

        self.peer_addr = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    async fn send(&mut self, frame: &Frame) -> Result<()> {
        let socket = self.socket.as_ref().ok_or(Error::NotConnected)?;

        trace!("Sending {} bytes via UDP: {}", FRAME_SIZE, frame);

        let sent = match (self.role, self.peer_addr) {
            (Role::Connect, _) => socket.send(frame.as_bytes()).await?,
            (Role::Bind, Some(peer)) => socket.send_to(frame.as_bytes(), peer).await?,
            (Role::Bind, None) => return Err(Error::NotConnected),
        };

        if sent != FRAME_SIZE {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("datagram truncated to {} bytes", sent),
            )));
        }

        Ok(())
    }

    async fn receive(&mut self, read_timeout: Duration) -> Result<Frame> {
        let socket = self.socket.as_ref().ok_or(Error::NotConnected)?;

        let mut buf = BytesMut::zeroed(DATAGRAM_BUF);

        let (n, from) = timeout(read_timeout, socket.recv_from(&mut buf))
            .await
            .map_err(|_| {
                warn!("Read timeout after {:?}", read_timeout);
                Error::ReadTimeout
            })?
            .map_err(|e| {
                warn!("Read error: {}", e);
                Error::Io(e)
            })?;

        if n == 0 {
            warn!("Received 0 bytes");
            return Err(Error::ConnectionClosed);
        }

        if n != FRAME_SIZE {
            warn!("Dropping {} byte datagram from {}", n, from);
            return Err(Error::MalformedDatagram(n));
        }

        if self.role == Role::Bind {
            self.peer_addr = Some(from);
        }

        let frame = Frame::from_slice(&buf[..n])?;
        trace!("Received {} bytes via UDP: {}", n, frame);

        Ok(frame)
    }

    fn drain(&mut self) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(Error::NotConnected)?;

        // Bypass the reactor's cached readiness and ask the kernel directly
        let socket = SockRef::from(socket);
        let mut reader: &Socket = &socket;

        let mut buf = [0u8; DATAGRAM_BUF];
        let mut discarded = 0;

        loop {
            // One datagram per read; an empty datagram is not end of stream
            match reader.read(&mut buf) {
                Ok(n) => discarded += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(discarded),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    fn remote_addr(&self) -> String {
        self.peer_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_transport_create() {
        let transport = UdpTransport::connect_to("192.168.1.100", 2000);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_udp_transport_invalid_address() {
        let mut transport = UdpTransport::connect_to("invalid..address", 2000);

        let result = transport.connect().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_udp_round_trip() {
        let mut inbound = UdpTransport::bind_on("127.0.0.1", 0);
        inbound.connect().await.unwrap();
        let port = inbound.local_addr().unwrap().port();

        let mut outbound = UdpTransport::connect_to("127.0.0.1", port);
        outbound.connect().await.unwrap();

        let frame = Frame::new([0x42; FRAME_SIZE]);
        outbound.send(&frame).await.unwrap();

        let received = inbound.receive(Duration::from_secs(1)).await.unwrap();
        assert_eq!(received, frame);
    }

    #[tokio::test]
    async fn test_udp_malformed_datagram() {
        let mut inbound = UdpTransport::bind_on("127.0.0.1", 0);
        inbound.connect().await.unwrap();
        let target = inbound.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[1u8; 10], target).await.unwrap();

        let result = inbound.receive(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::MalformedDatagram(10))));
    }

    #[tokio::test]
    async fn test_udp_receive_timeout() {
        let mut inbound = UdpTransport::bind_on("127.0.0.1", 0);
        inbound.connect().await.unwrap();

        let result = inbound.receive(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::ReadTimeout)));
    }

    #[tokio::test]
    async fn test_udp_drain() {
        let mut inbound = UdpTransport::bind_on("127.0.0.1", 0);
        inbound.connect().await.unwrap();
        let target = inbound.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[1u8; FRAME_SIZE], target).await.unwrap();
        sender.send_to(&[2u8; FRAME_SIZE], target).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(inbound.drain().unwrap(), 2 * FRAME_SIZE);
        assert_eq!(inbound.drain().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_udp_drain_sees_datagrams_the_runtime_has_not_polled() {
        let mut inbound = UdpTransport::bind_on("127.0.0.1", 0);
        inbound.connect().await.unwrap();
        let target = inbound.local_addr().unwrap();

        // Blocking send and sleep without yielding to the runtime
        let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&[0xEE; FRAME_SIZE], target).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(inbound.drain().unwrap(), FRAME_SIZE);

        sender.send_to(&[0x11; FRAME_SIZE], target).unwrap();
        let frame = inbound.receive(Duration::from_secs(1)).await.unwrap();
        assert_eq!(frame, Frame::new([0x11; FRAME_SIZE]));
    }
}
