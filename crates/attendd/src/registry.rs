//! Connection registry and broadcaster.
//!
//! Tracks live connections, delivers targeted and broadcast messages
//! through the [`Transport`] trait, evicts connections whose delivery
//! fails, and runs a periodic keep-alive probe per connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use attend_core::messages::{EventEnvelope, OutboundMessage};
use futures::future::join_all;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::pool::IoPool;
use crate::traits::Transport;
use crate::ConnectionId;

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

struct ConnectionEntry {
    transport: Arc<dyn Transport>,
    probe: JoinHandle<()>,
}

/// Registry of live connections.
pub struct ConnectionRegistry {
    // Short critical sections only; transports are cloned out before any send.
    connections: Mutex<HashMap<ConnectionId, ConnectionEntry>>,
    io_pool: IoPool,
    ping_interval: Duration,
}

impl ConnectionRegistry {
    pub fn new(io_pool: IoPool, ping_interval: Duration) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            io_pool,
            ping_interval,
        }
    }

    /// Add a connection and start its keep-alive probe.
    pub fn register(&self, transport: Arc<dyn Transport>) -> ConnectionId {
        let connection_id = Uuid::new_v4();
        let probe = spawn_probe(Arc::clone(&transport), self.ping_interval, connection_id);

        let total = {
            let mut connections = self.lock();
            connections.insert(connection_id, ConnectionEntry { transport, probe });
            connections.len()
        };
        tracing::info!(%connection_id, total, "connection registered");
        connection_id
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.lock().contains_key(&connection_id)
    }

    pub fn connection_count(&self) -> usize {
        self.lock().len()
    }

    /// Best-effort targeted send. An absent connection drops the message
    /// (it already went away — not an error); a failed send evicts.
    pub async fn deliver(&self, connection_id: ConnectionId, message: &OutboundMessage) -> bool {
        let transport = {
            let connections = self.lock();
            connections
                .get(&connection_id)
                .map(|entry| Arc::clone(&entry.transport))
        };
        let Some(transport) = transport else {
            tracing::debug!(%connection_id, "connection gone, dropping message");
            return false;
        };

        match self.io_pool.run(transport.send(message)).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%connection_id, error = %err, "delivery failed, evicting");
                self.evict(connection_id);
                false
            }
        }
    }

    /// Deliver to every registered connection concurrently, waiting for all.
    /// Each failed delivery evicts that connection; failures never touch the
    /// other connections' sends.
    pub async fn broadcast(&self, message: &OutboundMessage) {
        let targets: Vec<(ConnectionId, Arc<dyn Transport>)> = {
            let connections = self.lock();
            connections
                .iter()
                .map(|(id, entry)| (*id, Arc::clone(&entry.transport)))
                .collect()
        };
        if targets.is_empty() {
            tracing::debug!("no connections to broadcast to");
            return;
        }
        tracing::debug!(connections = targets.len(), "broadcasting");

        let sends = targets.into_iter().map(|(id, transport)| {
            let io_pool = self.io_pool.clone();
            async move { (id, io_pool.run(transport.send(message)).await) }
        });

        for (id, result) in join_all(sends).await {
            if let Err(err) = result {
                tracing::warn!(connection_id = %id, error = %err, "broadcast delivery failed, evicting");
                self.evict(id);
            }
        }
    }

    /// Remove a connection and cancel its probe. Idempotent: the map
    /// removal decides exactly one winner, so a failed broadcast racing a
    /// failed direct response cannot double-tear-down the transport.
    pub fn evict(&self, connection_id: ConnectionId) {
        let entry = {
            let mut connections = self.lock();
            connections.remove(&connection_id)
        };
        let Some(entry) = entry else { return };

        entry.probe.abort();
        tracing::info!(%connection_id, remaining = self.connection_count(), "connection removed");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ConnectionId, ConnectionEntry>> {
        self.connections.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Keep-alive probe: ping at a fixed interval until a send fails or the
/// task is cancelled. Eviction belongs to the delivery-failure path, not
/// the probe, so a failed ping only stops probing.
fn spawn_probe(
    transport: Arc<dyn Transport>,
    interval: Duration,
    connection_id: ConnectionId,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ping: OutboundMessage = EventEnvelope::Ping.into();
        loop {
            tokio::time::sleep(interval).await;
            if let Err(err) = transport.send(&ping).await {
                tracing::debug!(%connection_id, error = %err, "ping failed, stopping probe");
                break;
            }
        }
    })
}
