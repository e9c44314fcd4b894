//! Bus link to the PCAN-Ethernet gateway
//!
//! The hardware routes frames through two preconfigured half-channels:
//! `lan2can` (we send) and `can2lan` (it sends back). Together they form
//! one logical link that carries one request/reply transaction at a time.
//! Replies carry no request identity, so pairing relies entirely on
//! strict alternation: drain, send, read exactly one reply.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, trace, warn};

use canrelay_core::Frame;
use canrelay_transport::{TcpTransport, Transport, UdpTransport};
use canrelay_types::{LinkConfig, LinkInfo, TransportKind};

use crate::error::{Error, Result};

/// The single shared link to the hardware
///
/// [`BusLink::transact`] takes `&mut self` and is not reentrant; sharing
/// the link between clients requires a width-one lock around it.
pub struct BusLink {
    outbound: Box<dyn Transport>,
    inbound: Box<dyn Transport>,
    read_timeout: Duration,
    info: LinkInfo,
    lost: bool,
}

impl BusLink {
    /// Create a link from any pair of half-channels
    pub fn new(
        outbound: Box<dyn Transport>,
        inbound: Box<dyn Transport>,
        transport: TransportKind,
        read_timeout: Duration,
    ) -> Self {
        let info = LinkInfo::new(outbound.remote_addr(), inbound.remote_addr(), transport);

        Self {
            outbound,
            inbound,
            read_timeout,
            info,
            lost: false,
        }
    }

    /// Build both half-channels from configuration
    pub fn from_config(config: &LinkConfig) -> Self {
        let (outbound, inbound): (Box<dyn Transport>, Box<dyn Transport>) = match config.transport {
            TransportKind::Tcp => (
                Box::new(
                    TcpTransport::connect_to(config.host.clone(), config.port)
                        .with_connect_timeout(config.connect_timeout()),
                ),
                Box::new(
                    TcpTransport::accept_on(config.bind_host.clone(), config.accept_port)
                        .with_accept_timeout(config.accept_timeout()),
                ),
            ),
            TransportKind::Udp => (
                Box::new(
                    UdpTransport::connect_to(config.host.clone(), config.port)
                        .with_connect_timeout(config.connect_timeout()),
                ),
                Box::new(
                    UdpTransport::bind_on(config.bind_host.clone(), config.accept_port)
                        .with_connect_timeout(config.connect_timeout()),
                ),
            ),
        };

        Self::new(outbound, inbound, config.transport, config.read_timeout())
    }

    /// Open both half-channels
    ///
    /// The outbound side is connected first; then the inbound accept point
    /// is opened and this blocks until the hardware connects to it. Either
    /// step failing is fatal.
    pub async fn establish(&mut self) -> Result<()> {
        info!("Connecting lan2can to {}...", self.outbound.remote_addr());
        self.outbound.connect().await.map_err(Error::Establish)?;

        info!("Waiting for can2lan connection on {}...", self.inbound.remote_addr());
        self.inbound.connect().await.map_err(Error::Establish)?;

        self.info.outbound = self.outbound.remote_addr();
        self.info.inbound = self.inbound.remote_addr();
        self.info.established_at = Some(Utc::now());

        info!("Bus link established: {}", self.info);
        Ok(())
    }

    /// Run one request/reply transaction
    ///
    /// Any failure marks the link lost; every later call fails immediately
    /// without touching the hardware.
    pub async fn transact(&mut self, request: &Frame) -> Result<Frame> {
        if self.lost {
            return Err(Error::LinkLost(canrelay_transport::Error::NotConnected));
        }

        match self.exchange(request).await {
            Ok(reply) => {
                self.info.transactions += 1;
                Ok(reply)
            }
            Err(e) => {
                self.lost = true;
                error!("Lost PCAN connection: {}", e);
                Err(Error::LinkLost(e))
            }
        }
    }

    async fn exchange(&mut self, request: &Frame) -> canrelay_transport::Result<Frame> {
        // Leftover bytes would pair the next request with a stale reply
        let stale = self.outbound.drain()? + self.inbound.drain()?;
        if stale > 0 {
            debug!("Discarded {} stale bytes before transaction", stale);
        }

        self.outbound.send(request).await?;
        trace!("lan2can sent: {}", request);

        let reply = self.inbound.receive(self.read_timeout).await?;
        trace!("can2lan recv: {}", reply);

        Ok(reply)
    }

    /// Check if a transaction has failed on this link
    pub fn is_lost(&self) -> bool {
        self.lost
    }

    /// Snapshot of link details
    pub fn info(&self) -> LinkInfo {
        self.info.clone()
    }

    /// Close both half-channels
    pub async fn close(&mut self) {
        for (name, half) in [("lan2can", &mut self.outbound), ("can2lan", &mut self.inbound)] {
            if let Err(e) = half.disconnect().await {
                warn!("Failed to close {}: {}", name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use canrelay_core::FRAME_SIZE;
    use mockall::{mock, predicate::*, Sequence};
    use pretty_assertions::assert_eq;

    mock! {
        pub Half {}

        #[async_trait]
        impl Transport for Half {
            async fn connect(&mut self) -> canrelay_transport::Result<()>;
            async fn disconnect(&mut self) -> canrelay_transport::Result<()>;
            fn is_connected(&self) -> bool;
            async fn send(&mut self, frame: &Frame) -> canrelay_transport::Result<()>;
            async fn receive(&mut self, timeout: Duration) -> canrelay_transport::Result<Frame>;
            fn drain(&mut self) -> canrelay_transport::Result<usize>;
            fn remote_addr(&self) -> String;
        }
    }

    fn half(name: &'static str) -> MockHalf {
        let mut half = MockHalf::new();
        half.expect_remote_addr().returning(move || name.to_string());
        half
    }

    fn link(outbound: MockHalf, inbound: MockHalf) -> BusLink {
        BusLink::new(
            Box::new(outbound),
            Box::new(inbound),
            TransportKind::Tcp,
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn test_transact_drains_then_sends_then_receives() {
        let request = Frame::new([1; FRAME_SIZE]);
        let reply = Frame::new([2; FRAME_SIZE]);

        let mut seq = Sequence::new();
        let mut outbound = half("out");
        let mut inbound = half("in");

        outbound
            .expect_drain()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(0));
        inbound
            .expect_drain()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(36));
        outbound
            .expect_send()
            .withf(move |f| *f == request)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        inbound
            .expect_receive()
            .with(eq(Duration::from_millis(100)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(reply));

        let mut link = link(outbound, inbound);
        let got = link.transact(&request).await.unwrap();

        assert_eq!(got, reply);
        assert_eq!(link.info().transactions, 1);
        assert!(!link.is_lost());
    }

    #[tokio::test]
    async fn test_closed_reply_is_link_loss() {
        let mut outbound = half("out");
        let mut inbound = half("in");

        outbound.expect_drain().returning(|| Ok(0));
        inbound.expect_drain().returning(|| Ok(0));
        outbound.expect_send().times(1).returning(|_| Ok(()));
        inbound
            .expect_receive()
            .times(1)
            .returning(|_| Err(canrelay_transport::Error::ConnectionClosed));

        let mut link = link(outbound, inbound);
        let result = link.transact(&Frame::new([0; FRAME_SIZE])).await;

        assert!(matches!(
            result,
            Err(Error::LinkLost(canrelay_transport::Error::ConnectionClosed))
        ));
        assert!(link.is_lost());

        // No further hardware traffic once lost
        let result = link.transact(&Frame::new([0; FRAME_SIZE])).await;
        assert!(matches!(result, Err(Error::LinkLost(_))));
        assert_eq!(link.info().transactions, 0);
    }

    #[tokio::test]
    async fn test_timeout_is_link_loss() {
        let mut outbound = half("out");
        let mut inbound = half("in");

        outbound.expect_drain().returning(|| Ok(0));
        inbound.expect_drain().returning(|| Ok(0));
        outbound.expect_send().returning(|_| Ok(()));
        inbound
            .expect_receive()
            .returning(|_| Err(canrelay_transport::Error::ReadTimeout));

        let mut link = link(outbound, inbound);
        let result = link.transact(&Frame::new([0; FRAME_SIZE])).await;

        assert!(result.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_closed_during_drain_skips_send() {
        let mut outbound = half("out");
        let mut inbound = half("in");

        outbound
            .expect_drain()
            .returning(|| Err(canrelay_transport::Error::ConnectionClosed));
        outbound.expect_send().never();
        inbound.expect_receive().never();

        let mut link = link(outbound, inbound);
        let result = link.transact(&Frame::new([0; FRAME_SIZE])).await;

        assert!(matches!(result, Err(Error::LinkLost(_))));
    }

    #[tokio::test]
    async fn test_establish_connects_outbound_first() {
        let mut seq = Sequence::new();
        let mut outbound = half("out");
        let mut inbound = half("in");

        outbound
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        inbound
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let mut link = link(outbound, inbound);
        link.establish().await.unwrap();

        assert!(link.info().established_at.is_some());
    }

    #[tokio::test]
    async fn test_establish_failure_is_fatal() {
        let mut outbound = half("out");
        let mut inbound = half("in");

        outbound
            .expect_connect()
            .returning(|| Err(canrelay_transport::Error::ConnectionTimeout));
        inbound.expect_connect().never();

        let mut link = link(outbound, inbound);
        let result = link.establish().await;

        assert!(matches!(result, Err(Error::Establish(_))));
        assert!(link.info().established_at.is_none());
    }

    #[tokio::test]
    async fn test_close_disconnects_both() {
        let mut outbound = half("out");
        let mut inbound = half("in");

        outbound.expect_disconnect().times(1).returning(|| Ok(()));
        inbound.expect_disconnect().times(1).returning(|| Ok(()));

        let mut link = link(outbound, inbound);
        link.close().await;
    }
}
