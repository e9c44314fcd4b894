//! canrelayd - PCAN-Ethernet relay daemon
//!
//! Exits with status 1 whenever the hardware link is lost, so it should be
//! run under a service manager that restarts it (e.g. a systemd unit with
//! `Restart=always`).
//!
//! # Usage
//!
//! ```bash
//! canrelayd --config /etc/canrelay.toml
//! canrelayd --host 192.168.1.100 --transport tcp -v
//! ```

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use canrelay::{GatewayConfig, Supervisor, TransportKind};

#[derive(Parser, Debug)]
#[command(name = "canrelayd")]
#[command(about = "Share one PCAN-Ethernet gateway between many local clients")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Hardware address for the lan2can route
    #[arg(long)]
    host: Option<String>,

    /// Hardware lan2can port
    #[arg(long)]
    port: Option<u16>,

    /// Local port the hardware's can2lan route connects to
    #[arg(long)]
    accept_port: Option<u16>,

    /// Client-facing listen port
    #[arg(long)]
    listen_port: Option<u16>,

    /// Hardware transport (tcp or udp)
    #[arg(long)]
    transport: Option<TransportKind>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::load(path)
                .with_context(|| format!("loading config from {}", path))?,
            None => GatewayConfig::default(),
        };

        if let Some(host) = self.host {
            config.link.host = host;
        }
        if let Some(port) = self.port {
            config.link.port = port;
        }
        if let Some(port) = self.accept_port {
            config.link.accept_port = port;
        }
        if let Some(port) = self.listen_port {
            config.server.port = port;
        }
        if let Some(transport) = self.transport {
            config.link.transport = transport;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "canrelay=debug,canrelayd=debug,canrelay_transport=debug"
    } else {
        "canrelay=info,canrelayd=info,canrelay_transport=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(args: Args) -> Result<()> {
    let config = args.into_config()?;

    info!(
        "Starting canrelayd (hardware {}:{} via {}, clients on {})",
        config.link.host,
        config.link.port,
        config.link.transport,
        config.server.listen_addr()
    );

    Supervisor::new(config).run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
