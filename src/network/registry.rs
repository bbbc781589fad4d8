use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::Connection;

/// Tracks every live connection of one server instance.
///
/// Connections register themselves at construction and unregister during
/// `stop()`, possibly from many tasks at once.
pub trait Registry: Send + Sync {
    fn add_connection(&self, conn: Arc<Connection>);
    fn remove_connection(&self, conn: &Connection);
    fn get(&self, conn_id: u64) -> Option<Arc<Connection>>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The production registry.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<u64, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> ConnectionRegistry {
        ConnectionRegistry {
            connections: DashMap::new(),
        }
    }

    /// Stops every registered connection, used by server shutdown.
    ///
    /// `stop()` re-enters `remove_connection`, so collect the targets first
    /// rather than stopping while holding map shards.
    pub fn stop_all(&self) {
        let conns: Vec<Arc<Connection>> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        debug!("stopping {} live connections", conns.len());
        for conn in conns {
            conn.stop();
        }
    }
}

impl Registry for ConnectionRegistry {
    fn add_connection(&self, conn: Arc<Connection>) {
        self.connections.insert(conn.id(), conn);
    }

    fn remove_connection(&self, conn: &Connection) {
        self.connections.remove(&conn.id());
    }

    fn get(&self, conn_id: u64) -> Option<Arc<Connection>> {
        self.connections
            .get(&conn_id)
            .map(|entry| entry.value().clone())
    }

    fn len(&self) -> usize {
        self.connections.len()
    }
}
