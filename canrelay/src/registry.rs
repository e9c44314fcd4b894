//! Registry of live client connections

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;

use canrelay_core::{ClientId, ConnectionState};

use crate::error::Result;

/// Per-connection bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientEntry {
    pub peer: SocketAddr,
    pub state: ConnectionState,
}

/// Map from connection identity to its state
///
/// Owned by the multiplexer and shared with client tasks. Cloning is
/// cheap (Arc internally).
#[derive(Debug, Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<HashMap<ClientId, ClientEntry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly accepted connection
    pub fn insert(&self, id: ClientId, peer: SocketAddr) {
        self.inner.lock().insert(
            id,
            ClientEntry {
                peer,
                state: ConnectionState::Accepted,
            },
        );
    }

    /// Advance a connection's state
    ///
    /// Unknown ids are ignored: the entry may already have been cleared by
    /// shutdown.
    pub fn transition(&self, id: ClientId, next: ConnectionState) -> Result<()> {
        if let Some(entry) = self.inner.lock().get_mut(&id) {
            entry.state.advance(next)?;
        }
        Ok(())
    }

    /// Mark a connection closed and forget it
    pub fn remove(&self, id: ClientId) -> Option<ClientEntry> {
        let mut entry = self.inner.lock().remove(&id)?;
        // Closed is reachable from every live state
        let _ = entry.state.advance(ConnectionState::Closed);
        Some(entry)
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Count connections currently waiting on the bus link
    pub fn in_transaction(&self) -> usize {
        self.inner
            .lock()
            .values()
            .filter(|e| e.state == ConnectionState::InTransaction)
            .count()
    }

    /// Drop every entry, returning how many were live
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.len();
        inner.clear();
        count
    }
}
