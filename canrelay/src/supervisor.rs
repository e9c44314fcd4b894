//! Daemon lifecycle
//!
//! Startup order is fixed: the hardware expects the daemon's ports to be
//! ready before it dials back, so the client listener is bound first, then
//! `lan2can` is connected, then `can2lan` is accepted, and only then are
//! clients served.
//!
//! There is no reconnect logic. Any bus link failure tears everything down
//! and is returned to the caller, which exits non-zero and leaves the
//! restart to an external service manager.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket};
use tracing::{error, info, warn};

use canrelay_types::{GatewayConfig, ServerConfig};

use crate::bus_link::BusLink;
use crate::error::{Error, Result};
use crate::multiplexer::Multiplexer;

/// Runs the gateway from startup to teardown
pub struct Supervisor {
    config: GatewayConfig,
}

impl Supervisor {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// Run until SIGINT/SIGTERM or a fatal link error
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` resolves or a fatal link error
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.config.validate()?;

        let listener = bind_listener(&self.config.server).await?;

        let mut link = BusLink::from_config(&self.config.link);
        if let Err(e) = link.establish().await {
            error!("{}", e);
            link.close().await;
            return Err(e);
        }

        let mut mux = Multiplexer::new(listener, link);
        let result = mux.run(shutdown).await;
        mux.close().await;

        match &result {
            Ok(()) => info!("Gateway stopped"),
            Err(e) => error!("Gateway terminated: {}", e),
        }
        result
    }
}

/// Bind the client-facing listener
///
/// `SO_REUSEADDR` lets a restarted daemon rebind while the previous socket
/// is still in TIME_WAIT.
pub async fn bind_listener(config: &ServerConfig) -> Result<TcpListener> {
    let addr_str = config.listen_addr();
    let bind_err = |source| Error::Bind {
        addr: addr_str.clone(),
        source,
    };

    let addr: SocketAddr = tokio::net::lookup_host(&addr_str)
        .await
        .map_err(bind_err)?
        .next()
        .ok_or_else(|| {
            bind_err(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "no addresses resolved",
            ))
        })?;

    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(true).map_err(bind_err)?;
    socket.bind(addr).map_err(bind_err)?;
    let listener = socket.listen(1024).map_err(bind_err)?;

    info!("Client listener bound on {}", addr);
    Ok(listener)
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_listener_reuses_address() {
        let config = ServerConfig {
            bind_host: "127.0.0.1".into(),
            port: 0,
        };

        let listener = bind_listener(&config).await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        // Rebinding the same port straight away succeeds
        let config = ServerConfig {
            bind_host: "127.0.0.1".into(),
            port: addr.port(),
        };
        assert!(bind_listener(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_bind_listener_bad_host() {
        let config = ServerConfig {
            bind_host: "invalid..host".into(),
            port: 2002,
        };

        let result = bind_listener(&config).await;
        assert!(matches!(result, Err(Error::Bind { .. })));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_binding() {
        let mut config = GatewayConfig::default();
        config.link.host = String::new();

        let result = Supervisor::new(config).run_until(async {}).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
