//! # canrelay
//!
//! Relay daemon for the PEAK PCAN-Ethernet gateway.
//!
//! The gateway hardware talks over one preconfigured pair of routes and
//! handles one request at a time. `canrelay` owns that pair and lets any
//! number of local clients share it, each over an ordinary bidirectional
//! TCP socket carrying fixed 36-byte frames.
//!
//! ## Quick Start
//!
//! ```no_run
//! use canrelay::{GatewayConfig, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> canrelay::Result<()> {
//!     let config = GatewayConfig::load("canrelay.toml")?;
//!
//!     // Returns only on shutdown signal or when the hardware link is lost
//!     Supervisor::new(config).run().await
//! }
//! ```

pub mod bus_link;
pub mod error;
pub mod multiplexer;
pub mod registry;
pub mod supervisor;

// Re-exports
pub use bus_link::BusLink;
pub use error::{Error, Result};
pub use multiplexer::Multiplexer;
pub use registry::Registry;
pub use supervisor::Supervisor;

// Re-export types
pub use canrelay_core::{ClientId, ConnectionState, Frame, FRAME_SIZE};
pub use canrelay_types::{GatewayConfig, LinkConfig, LinkInfo, ServerConfig, TransportKind};
