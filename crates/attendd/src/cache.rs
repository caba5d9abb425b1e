//! TTL-bounded read-through cache of the reference population.

use std::sync::Arc;
use std::time::{Duration, Instant};

use attend_core::ReferenceIdentity;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::traits::ReferenceStore;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

struct CacheState {
    last_refresh: Option<Instant>,
    /// Replaced wholesale under the lock, never mutated in place; readers
    /// holding an earlier `Arc` keep a consistent snapshot.
    snapshot: Arc<Vec<ReferenceIdentity>>,
}

/// Read-through snapshot cache over the reference store.
///
/// One async mutex guards both readers and the refresher: holding it across
/// the bulk fetch makes the refresh single-flight, so concurrent callers
/// after expiry produce exactly one store read. A failed refresh propagates
/// to that caller without advancing the timestamp — the stale snapshot
/// stays usable and the next call retries immediately.
pub struct DirectoryCache {
    store: Arc<dyn ReferenceStore>,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl DirectoryCache {
    pub fn new(store: Arc<dyn ReferenceStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            state: Mutex::new(CacheState {
                last_refresh: None,
                snapshot: Arc::new(Vec::new()),
            }),
        }
    }

    /// Current reference population, refreshed when the TTL has lapsed or
    /// the snapshot is empty. No partial refresh, no negative caching.
    pub async fn get_all(&self) -> Result<Arc<Vec<ReferenceIdentity>>, StoreError> {
        let mut state = self.state.lock().await;

        let expired = match state.last_refresh {
            None => true,
            Some(at) => at.elapsed() > self.ttl,
        };
        if expired || state.snapshot.is_empty() {
            let population = self.store.load_reference_population().await?;
            state.snapshot = Arc::new(population);
            state.last_refresh = Some(Instant::now());
            tracing::info!(
                identities = state.snapshot.len(),
                "reference population cache refreshed"
            );
        }

        Ok(Arc::clone(&state.snapshot))
    }
}
