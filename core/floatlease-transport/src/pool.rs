//! Process-wide keep-alive connections to license servers.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};
use tokio::net::TcpStream;
use tracing::debug;

/// A single connection slot. The async mutex serializes exchanges on the
/// connection it guards.
pub(crate) type Slot = Arc<tokio::sync::Mutex<Option<TcpStream>>>;

static GLOBAL_POOL: LazyLock<Arc<ConnectionPool>> =
    LazyLock::new(|| Arc::new(ConnectionPool::new()));

/// Keep-alive connections keyed by `host:port`.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ConnectionPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pool shared by every [`TcpTransport`](crate::TcpTransport)
    /// created with the default constructor.
    pub fn global() -> Arc<ConnectionPool> {
        Arc::clone(&GLOBAL_POOL)
    }

    /// Number of server addresses with a connection slot.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no slots exist.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every pooled connection. Returns the number of slots removed.
    ///
    /// Exchanges in flight keep their connection until they finish; it is
    /// closed afterwards instead of being returned to the pool.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        if !drained.is_empty() {
            debug!("Closed {} pooled license server connections", drained.len());
        }
        drained.len()
    }

    pub(crate) fn slot(&self, address: &str) -> Slot {
        Arc::clone(self.lock().entry(address.to_string()).or_default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Releases the network resources shared by all transports in this process.
///
/// Does not release any leased seat; call `release` on every lease first.
/// Safe to call more than once.
pub fn global_cleanup() {
    GLOBAL_POOL.clear();
}
