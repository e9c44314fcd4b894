//! Gateway configuration
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! [link]
//! host = "192.168.1.100"
//! port = 2000
//! accept_port = 2001
//! transport = "tcp"
//!
//! [server]
//! port = 2002
//! ```

use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use canrelay_core::constants::{
    DEFAULT_ACCEPT_TIMEOUT_MS, DEFAULT_CAN2LAN_PORT, DEFAULT_CONNECT_TIMEOUT_MS,
    DEFAULT_LAN2CAN_PORT, DEFAULT_LISTEN_PORT, DEFAULT_READ_TIMEOUT_MS,
};

use crate::error::{Error, Result};

/// Transport used for both hardware half-channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(Error::Parse(format!("unknown transport kind: {}", other))),
        }
    }
}

/// Complete daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Hardware link settings
    #[serde(default)]
    pub link: LinkConfig,

    /// Client-facing listener settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Hardware link (both half-channels)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Hardware address for the outbound `lan2can` half-channel
    pub host: String,

    /// Hardware `lan2can` port
    pub port: u16,

    /// Local address the inbound `can2lan` half-channel binds to
    pub bind_host: String,

    /// Local port the hardware connects back to
    pub accept_port: u16,

    /// TCP or UDP
    pub transport: TransportKind,

    pub connect_timeout_ms: u64,

    pub accept_timeout_ms: u64,

    /// Upper bound on waiting for one reply; expiry means link loss
    pub read_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_LAN2CAN_PORT,
            bind_host: "0.0.0.0".to_string(),
            accept_port: DEFAULT_CAN2LAN_PORT,
            transport: TransportKind::default(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            accept_timeout_ms: DEFAULT_ACCEPT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

impl LinkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Client-facing listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_LISTEN_PORT,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

impl GatewayConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Parse(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml(&text)
    }

    /// Reject configurations that can never start
    pub fn validate(&self) -> Result<()> {
        if self.link.host.trim().is_empty() {
            return Err(Error::Validation("link.host must not be empty".into()));
        }

        for (name, port) in [
            ("link.port", self.link.port),
            ("link.accept_port", self.link.accept_port),
            ("server.port", self.server.port),
        ] {
            if port == 0 {
                return Err(Error::Validation(format!("{} must not be zero", name)));
            }
        }

        for (name, ms) in [
            ("link.connect_timeout_ms", self.link.connect_timeout_ms),
            ("link.accept_timeout_ms", self.link.accept_timeout_ms),
            ("link.read_timeout_ms", self.link.read_timeout_ms),
        ] {
            if ms == 0 {
                return Err(Error::Validation(format!("{} must not be zero", name)));
            }
        }

        if self.link.accept_port == self.server.port
            && hosts_overlap(&self.link.bind_host, &self.server.bind_host)
        {
            return Err(Error::Validation(format!(
                "link.accept_port ({}:{}) and server.port ({}:{}) overlap",
                self.link.bind_host, self.link.accept_port, self.server.bind_host, self.server.port
            )));
        }

        Ok(())
    }
}

/// Whether two bind hosts can collide on the same port
///
/// A wildcard address covers every local address, so it overlaps with
/// anything.
fn hosts_overlap(a: &str, b: &str) -> bool {
    a == b || is_wildcard(a) || is_wildcard(b)
}

fn is_wildcard(host: &str) -> bool {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok_and(|ip| ip.is_unspecified())
}
