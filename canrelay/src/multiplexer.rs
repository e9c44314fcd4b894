//! Connection multiplexer
//!
//! Accepts any number of clients and funnels their requests through the
//! single bus link. Each client gets its own task; the link sits behind a
//! width-one async mutex so exactly one transaction runs at a time, and a
//! client waiting for the lock simply queues behind whoever holds it.
//!
//! ```text
//! client ─┐
//! client ─┼─> read frame ─> lock(link).transact ─> write reply ─> same client
//! client ─┘
//! ```

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use canrelay_core::{ClientId, ConnectionState, Frame};
use canrelay_transport::{read_frame, write_frame, Incoming};

use crate::bus_link::BusLink;
use crate::error::{Error, Result};
use crate::registry::Registry;

/// The bus link, shared under a width-one lock
pub type SharedLink = Arc<Mutex<BusLink>>;

/// Pause after a failed accept before trying again
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Owns the client listener, the bus link, and every client task
///
/// Dropping or [`close`](Multiplexer::close)-ing it tears all of them down.
pub struct Multiplexer {
    listener: TcpListener,
    link: SharedLink,
    registry: Registry,
    tasks: JoinSet<()>,
    next_id: u64,
    fatal_tx: mpsc::Sender<Error>,
    fatal_rx: mpsc::Receiver<Error>,
}

/// What woke the multiplexer up
enum Event {
    Accepted(io::Result<(TcpStream, SocketAddr)>),
    LinkFailed(Error),
    Shutdown,
}

impl Multiplexer {
    /// Create a multiplexer over an established link
    pub fn new(listener: TcpListener, link: BusLink) -> Self {
        let (fatal_tx, fatal_rx) = mpsc::channel(1);

        Self {
            listener,
            link: Arc::new(Mutex::new(link)),
            registry: Registry::new(),
            tasks: JoinSet::new(),
            next_id: 0,
            fatal_tx,
            fatal_rx,
        }
    }

    /// Address clients connect to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of live client connections
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Serve clients until the link fails or `shutdown` resolves
    ///
    /// Returns the link error on failure and `Ok(())` on shutdown. Either
    /// way the caller should [`close`](Self::close) afterwards.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        if let Ok(addr) = self.local_addr() {
            info!("Accepting clients on {}", addr);
        }

        loop {
            let event = tokio::select! {
                // A link failure wins over new clients
                biased;
                Some(err) = self.fatal_rx.recv() => Event::LinkFailed(err),
                _ = &mut shutdown => Event::Shutdown,
                accepted = self.listener.accept() => Event::Accepted(accepted),
                // Reap finished client tasks so the set does not grow
                Some(_) = self.tasks.join_next(), if !self.tasks.is_empty() => continue,
            };

            match event {
                Event::Accepted(Ok((stream, peer))) => self.spawn_client(stream, peer),
                Event::Accepted(Err(e)) => accept_failed(&e).await,
                Event::LinkFailed(err) => {
                    error!("Stopping: {}", err);
                    return Err(err);
                }
                Event::Shutdown => {
                    info!("Shutdown requested");
                    return Ok(());
                }
            }
        }
    }

    fn spawn_client(&mut self, stream: TcpStream, peer: SocketAddr) {
        self.next_id += 1;
        let id = ClientId(self.next_id);

        if let Err(e) = stream.set_nodelay(true) {
            debug!("{}: failed to set TCP_NODELAY: {}", id, e);
        }

        self.registry.insert(id, peer);
        debug!("{} connected from {} ({} live)", id, peer, self.client_count());

        let client = Client {
            id,
            stream,
            link: self.link.clone(),
            registry: self.registry.clone(),
        };
        let fatal_tx = self.fatal_tx.clone();

        self.tasks.spawn(async move {
            let registry = client.registry.clone();

            match client.serve().await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    // Only the first failure matters; the channel holds one
                    let _ = fatal_tx.try_send(e);
                }
                Err(e) => warn!("Dropping client: {}", e),
            }

            registry.remove(id);
            debug!("{} closed ({} live)", id, registry.len());
        });
    }

    /// Tear down every client, the listener, and the bus link
    pub async fn close(mut self) {
        // Aborted tasks never reach their own cleanup, so count first
        let pending = self.registry.in_transaction();
        self.tasks.shutdown().await;

        let dropped = self.registry.clear();
        if dropped > 0 {
            info!(
                "Closed {} client connection(s), {} mid-transaction",
                dropped, pending
            );
        }

        drop(self.listener);

        let mut link = self.link.lock().await;
        let info = link.info();
        let uptime = info
            .uptime(Utc::now())
            .map(|d| d.num_seconds())
            .unwrap_or(0);

        if link.is_lost() {
            warn!("Closing lost bus link after {}s: {}", uptime, info);
        } else {
            info!("Closing bus link after {}s: {}", uptime, info);
        }
        link.close().await;
    }
}

/// Log a failed accept and pause before the next one
///
/// Errors such as fd exhaustion repeat immediately on every retry; the pause
/// keeps the loop from spinning while live clients release descriptors.
async fn accept_failed(err: &io::Error) {
    warn!("Failed to accept client: {}, retrying in {:?}", err, ACCEPT_BACKOFF);
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

/// One accepted client connection
struct Client {
    id: ClientId,
    stream: TcpStream,
    link: SharedLink,
    registry: Registry,
}

impl Client {
    /// Serve request/reply cycles until the client goes away
    async fn serve(mut self) -> Result<()> {
        loop {
            self.registry.transition(self.id, ConnectionState::AwaitingRequest)?;

            let request = match read_frame(&mut self.stream).await.map_err(|e| self.error(e))? {
                Incoming::Frame(frame) => frame,
                Incoming::Closed { received: 0 } => {
                    debug!("{} disconnected", self.id);
                    return Ok(());
                }
                Incoming::Closed { received } => {
                    warn!("{} sent {} byte partial frame, dropping", self.id, received);
                    return Ok(());
                }
            };

            trace!("{} request: {}", self.id, request);
            self.registry.transition(self.id, ConnectionState::InTransaction)?;

            let reply = self.transact(&request).await?;

            // The transaction has already completed; if the client is gone
            // the reply is simply lost with the connection
            write_frame(&mut self.stream, &reply)
                .await
                .map_err(|e| self.error(e))?;
            trace!("{} reply: {}", self.id, reply);
        }
    }

    async fn transact(&self, request: &Frame) -> Result<Frame> {
        let mut link = self.link.lock().await;
        link.transact(request).await
    }

    fn error(&self, source: canrelay_transport::Error) -> Error {
        Error::Client { id: self.id, source }
    }
}
