//! TCP half-channel
//!
//! The outbound (`lan2can`) side connects to the hardware. The inbound
//! (`can2lan`) side binds a well-known local port and waits for the
//! hardware to connect back, because the gateway's routing table only
//! ever dials out.

use std::io::{self, Read};
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use canrelay_core::Frame;
use socket2::{SockRef, Socket};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::{error::*, framed, Incoming, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Connect,
    Accept,
}

/// TCP half-channel to the hardware
pub struct TcpTransport {
    host: String,
    port: u16,
    role: Role,
    peer_addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    accept_timeout: Duration,
}

impl TcpTransport {
    /// Half-channel that connects out to `host:port`
    pub fn connect_to(host: impl Into<String>, port: u16) -> Self {
        Self::with_role(host.into(), port, Role::Connect)
    }

    /// Half-channel that binds `bind_host:port` and accepts one peer
    pub fn accept_on(bind_host: impl Into<String>, port: u16) -> Self {
        Self::with_role(bind_host.into(), port, Role::Accept)
    }

    fn with_role(host: String, port: u16, role: Role) -> Self {
        Self {
            host,
            port,
            role,
            peer_addr: None,
            stream: None,
            connect_timeout: Duration::from_secs(1),
            accept_timeout: Duration::from_secs(5),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set how long the inbound side waits for its peer
    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = timeout;
        self
    }

    async fn dial(&self) -> Result<TcpStream> {
        debug!("Connecting to {}:{}...", self.host, self.port);

        // Name lookup counts against the connect timeout too
        let stream = timeout(self.connect_timeout, async {
            let addr = crate::resolve(&self.host, self.port).await?;
            TcpStream::connect(addr).await.map_err(Error::Io)
        })
        .await
        .map_err(|_| Error::ConnectionTimeout)??;

        debug!("Connected to {}:{}", self.host, self.port);
        Ok(stream)
    }

    async fn accept_one(&self) -> Result<TcpStream> {
        let local = crate::resolve(&self.host, self.port).await?;

        let socket = match local {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        // Allow an immediate restart while the previous socket sits in TIME_WAIT
        socket.set_reuseaddr(true)?;
        socket.bind(local)?;
        let listener = socket.listen(1)?;

        debug!("Waiting for peer on {}...", local);

        let (stream, peer) = timeout(self.accept_timeout, listener.accept())
            .await
            .map_err(|_| Error::AcceptTimeout(local.to_string()))?
            .map_err(Error::Io)?;

        debug!("Accepted {} on {}", peer, local);

        // Only one peer is ever expected; stop listening
        drop(listener);
        Ok(stream)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let stream = match self.role {
            Role::Connect => self.dial().await?,
            Role::Accept => self.accept_one().await?,
        };

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        self.peer_addr = stream.peer_addr().ok();
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Disconnecting from {}...", self.remote_addr());

            // Graceful shutdown
            let _ = stream.shutdown().await;
        }

        self.peer_addr = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, frame: &Frame) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        trace!("Sending {} bytes: {}", Frame::SIZE, frame);

        framed::write_frame(stream, frame).await
    }

    async fn receive(&mut self, read_timeout: Duration) -> Result<Frame> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let incoming = timeout(read_timeout, framed::read_frame(stream))
            .await
            .map_err(|_| {
                warn!("Read timeout after {:?}", read_timeout);
                Error::ReadTimeout
            })??;

        match incoming {
            Incoming::Frame(frame) => {
                trace!("Received {} bytes: {}", Frame::SIZE, frame);
                Ok(frame)
            }
            Incoming::Closed { received } => {
                warn!("Connection closed after {} of {} bytes", received, Frame::SIZE);
                Err(Error::ConnectionClosed)
            }
        }
    }

    fn drain(&mut self) -> Result<usize> {
        let stream = self.stream.as_ref().ok_or(Error::NotConnected)?;

        // Read the descriptor directly: the reactor may not have seen bytes
        // that arrived since it last polled, and `try_read` would trust it
        let socket = SockRef::from(stream);
        let mut reader: &Socket = &socket;

        let mut buf = [0u8; 64];
        let mut discarded = 0;

        loop {
            match reader.read(&mut buf) {
                Ok(0) => return Err(Error::ConnectionClosed),
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

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("TCP transport dropped while still connected");
        }
    }
}
