//! Protocol constants

/// Size of every frame exchanged with clients and with the hardware
pub const FRAME_SIZE: usize = 36;

/// Default hardware `lan2can` port (daemon connects here)
pub const DEFAULT_LAN2CAN_PORT: u16 = 2000;

/// Default local `can2lan` port (hardware connects back here)
pub const DEFAULT_CAN2LAN_PORT: u16 = 2001;

/// Default client-facing listen port
pub const DEFAULT_LISTEN_PORT: u16 = 2002;

/// Default outbound connection timeout (milliseconds)
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1000;

/// Default wait for the hardware to connect back (milliseconds)
pub const DEFAULT_ACCEPT_TIMEOUT_MS: u64 = 5000;

/// Default wait for one reply frame from the hardware (milliseconds)
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;
