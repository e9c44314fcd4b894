//! Type definitions for canrelay

pub mod config;
pub mod error;
pub mod link_info;

pub use config::{GatewayConfig, LinkConfig, ServerConfig, TransportKind};
pub use error::{Error, Result};
pub use link_info::LinkInfo;
