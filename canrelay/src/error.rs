//! High-level error types

use canrelay_core::ClientId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core error: {0}")]
    Core(#[from] canrelay_core::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] canrelay_types::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Failed to establish bus link: {0}")]
    Establish(#[source] canrelay_transport::Error),

    #[error("Bus link lost: {0}")]
    LinkLost(#[source] canrelay_transport::Error),

    #[error("{id}: {source}")]
    Client {
        id: ClientId,
        source: canrelay_transport::Error,
    },
}

impl Error {
    /// Check if the error must take the whole daemon down
    ///
    /// Anything touching the hardware link, or failing before clients are
    /// served, is fatal. Client errors only end their own connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Bind { .. } | Self::Establish(_) | Self::LinkLost(_)
        )
    }
}
