//! # canrelay-core
//!
//! Core primitives for the CAN-over-Ethernet relay gateway.
//!
//! This crate provides the pieces every other layer shares:
//! - The fixed-size opaque [`Frame`]
//! - Per-client connection state machine
//! - Protocol constants and defaults

pub mod constants;
pub mod error;
pub mod frame;
pub mod state;

pub use constants::FRAME_SIZE;
pub use error::{Error, Result};
pub use frame::Frame;
pub use state::{ClientId, ConnectionState};
