//! Daemon lifecycle: wiring the pools, queues, cache, registry, and
//! consumer loops together, and tearing them down in order.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::cache::DirectoryCache;
use crate::config::Config;
use crate::consumers::{run_event_consumer, run_response_consumer};
use crate::ledger::TaskLedger;
use crate::pool::{CpuPool, IoPool};
use crate::registry::ConnectionRegistry;
use crate::relay::{queues, QueueRelay};
use crate::traits::{AttendanceStore, FaceExtractor, ReferenceStore};
use crate::ConnectionId;

/// The pluggable edges of the daemon. Everything else is owned by
/// [`AppContext`] itself.
pub struct Collaborators {
    pub extractor: Arc<dyn FaceExtractor>,
    pub reference_store: Arc<dyn ReferenceStore>,
    pub attendance_store: Arc<dyn AttendanceStore>,
}

/// Shared state for one running daemon instance.
pub struct AppContext {
    pub similarity_threshold: f32,
    pub max_pending_per_connection: usize,
    pub cpu_pool: Arc<CpuPool>,
    pub ledger: TaskLedger,
    pub cache: DirectoryCache,
    pub registry: Arc<ConnectionRegistry>,
    pub extractor: Arc<dyn FaceExtractor>,
    pub attendance: Arc<dyn AttendanceStore>,
    // Taken (and thereby closed) on shutdown; the consumer loops exit once
    // every sender is gone.
    relay: Mutex<Option<QueueRelay>>,
    consumers: Mutex<Vec<JoinHandle<()>>>,
}

impl AppContext {
    /// Build the full pipeline and start the consumer loops. Must run
    /// inside a Tokio runtime.
    pub fn start(config: &Config, collaborators: Collaborators) -> Arc<Self> {
        let io_pool = IoPool::new(config.io_workers);
        let registry = Arc::new(ConnectionRegistry::new(
            io_pool,
            Duration::from_secs(config.ping_interval_secs),
        ));
        let (relay, receivers) = queues(config.queue_capacity);
        let cpu_pool = Arc::new(CpuPool::new(config.cpu_workers));
        let cache = DirectoryCache::new(
            collaborators.reference_store,
            Duration::from_secs(config.cache_ttl_secs),
        );

        let response_consumer = tokio::spawn(run_response_consumer(
            receivers.responses,
            Arc::clone(&registry),
            relay.events.clone(),
        ));
        let event_consumer = tokio::spawn(run_event_consumer(
            receivers.events,
            Arc::clone(&registry),
        ));

        tracing::info!(
            cpu_workers = config.cpu_workers,
            io_workers = config.io_workers,
            queue_capacity = config.queue_capacity,
            threshold = config.similarity_threshold,
            "attendance pipeline started"
        );

        Arc::new(Self {
            similarity_threshold: config.similarity_threshold,
            max_pending_per_connection: config.max_pending_per_connection,
            cpu_pool,
            ledger: TaskLedger::new(),
            cache,
            registry,
            extractor: collaborators.extractor,
            attendance: collaborators.attendance_store,
            relay: Mutex::new(Some(relay)),
            consumers: Mutex::new(vec![response_consumer, event_consumer]),
        })
    }

    /// Producer half of the queues, or `None` once shutdown has begun.
    pub fn relay(&self) -> Option<QueueRelay> {
        self.relay.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Graceful stop: finish every in-flight and queued task, close the
    /// queues, and join the consumer loops. Joining rather than cancelling
    /// means every queued response and broadcast is fully delivered first.
    pub async fn shutdown(&self) {
        tracing::info!("pipeline shutdown requested");

        // Joining the pool flushes every completion into the response queue.
        let pool = Arc::clone(&self.cpu_pool);
        if tokio::task::spawn_blocking(move || pool.shutdown())
            .await
            .is_err()
        {
            tracing::error!("CPU pool shutdown task panicked");
        }

        // Dropping the last senders closes the queues. The response loop
        // drains, exits, and thereby drops its event-sender clone, which
        // lets the event loop drain and exit in turn.
        drop(self.relay.lock().unwrap_or_else(|e| e.into_inner()).take());

        let consumers = {
            let mut guard = self
                .consumers
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        for handle in consumers {
            if handle.await.is_err() {
                tracing::error!("consumer loop panicked during shutdown");
            }
        }
        tracing::info!("pipeline stopped");
    }

    /// Drop a connection: stop its probe, forget its transport, and clear
    /// its pending-task accounting. In-flight tasks for it still complete;
    /// their responses are discarded at delivery time.
    pub fn disconnect(&self, connection_id: ConnectionId) {
        self.registry.evict(connection_id);
        self.ledger.remove_connection(connection_id);
    }
}
