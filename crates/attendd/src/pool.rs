//! Fixed worker pools: a CPU-bound pool for matching work and a
//! semaphore-bounded I/O pool for blocking delivery calls.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use tokio::sync::Semaphore;

type Job = Box<dyn FnOnce(&tokio::runtime::Handle) + Send + 'static>;

struct SharedPoolState {
    /// Unbounded by design: backpressure is enforced at the queue relay and
    /// the per-connection counters, not at pool submission.
    queue: Mutex<VecDeque<Job>>,
    condvar: Condvar,
    stop_flag: AtomicBool,
}

/// Fixed-size pool of OS threads for CPU-bound matching work.
///
/// Workers carry a Tokio runtime handle so jobs can `block_on` the async
/// collaborators (cache refresh, attendance store). Submission never blocks
/// the caller. Shutdown drains every queued job before joining workers.
pub struct CpuPool {
    state: Arc<SharedPoolState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl CpuPool {
    /// Spawn `worker_count` threads. Must be called from within a Tokio
    /// runtime; the current handle is captured for the workers.
    pub fn new(worker_count: usize) -> Self {
        let state = Arc::new(SharedPoolState {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            stop_flag: AtomicBool::new(false),
        });

        let rt_handle = tokio::runtime::Handle::current();

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let state = Arc::clone(&state);
            let rt_handle = rt_handle.clone();
            let handle = thread::Builder::new()
                .name(format!("match-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, state, rt_handle))
                .expect("failed to spawn match worker thread");
            workers.push(handle);
        }

        tracing::info!(workers = worker_count, "CPU matching pool started");
        Self {
            state,
            workers: Mutex::new(workers),
        }
    }

    /// Queue a job. Never blocks on capacity.
    pub fn submit(&self, job: impl FnOnce(&tokio::runtime::Handle) + Send + 'static) {
        {
            let mut queue = lock(&self.state.queue);
            queue.push_back(Box::new(job));
        }
        self.state.condvar.notify_one();
    }

    pub fn queued(&self) -> usize {
        lock(&self.state.queue).len()
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stop_flag.load(Ordering::SeqCst)
    }

    /// Stop accepting the idle wait and join every worker. Queued jobs all
    /// run to completion first; graceful shutdown drops no work.
    pub fn shutdown(&self) {
        self.state.stop_flag.store(true, Ordering::SeqCst);
        self.state.condvar.notify_all();

        let workers = {
            let mut guard = lock(&self.workers);
            std::mem::take(&mut *guard)
        };
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!("match worker panicked during shutdown");
            }
        }
        tracing::info!("CPU matching pool stopped");
    }
}

fn worker_loop(
    worker_id: usize,
    state: Arc<SharedPoolState>,
    rt_handle: tokio::runtime::Handle,
) {
    tracing::debug!(worker_id, "match worker started");
    loop {
        let job = {
            let mut queue = lock(&state.queue);
            loop {
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                if state.stop_flag.load(Ordering::SeqCst) {
                    break None;
                }
                queue = state
                    .condvar
                    .wait(queue)
                    .unwrap_or_else(|e| e.into_inner());
            }
        };

        let Some(job) = job else { break };
        // A panicking job must not take the worker down with it.
        if catch_unwind(AssertUnwindSafe(|| job(&rt_handle))).is_err() {
            tracing::error!(worker_id, "matching job panicked");
        }
    }
    tracing::debug!(worker_id, "match worker exiting");
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Bounds concurrent blocking/delivery work without owning threads of its
/// own: each `run` holds one permit for the duration of the future.
#[derive(Clone)]
pub struct IoPool {
    permits: Arc<Semaphore>,
}

impl IoPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub async fn run<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        // The semaphore is never closed while the pool exists.
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("io pool semaphore closed");
        fut.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_drains_queued_jobs() {
        let pool = Arc::new(CpuPool::new(2));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let done = Arc::clone(&done);
            pool.submit(move |_| {
                thread::sleep(Duration::from_millis(5));
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        let p = Arc::clone(&pool);
        tokio::task::spawn_blocking(move || p.shutdown()).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 20);
        assert_eq!(pool.queued(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_job_does_not_kill_worker() {
        let pool = Arc::new(CpuPool::new(1));
        let done = Arc::new(AtomicUsize::new(0));

        pool.submit(|_| panic!("boom"));
        let d = Arc::clone(&done);
        pool.submit(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        });

        let p = Arc::clone(&pool);
        tokio::task::spawn_blocking(move || p.shutdown()).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn workers_can_block_on_async_work() {
        let pool = Arc::new(CpuPool::new(1));
        let done = Arc::new(AtomicUsize::new(0));

        let d = Arc::clone(&done);
        pool.submit(move |handle| {
            handle.block_on(async {
                tokio::time::sleep(Duration::from_millis(1)).await;
            });
            d.fetch_add(1, Ordering::SeqCst);
        });

        let p = Arc::clone(&pool);
        tokio::task::spawn_blocking(move || p.shutdown()).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn io_pool_bounds_concurrency() {
        let pool = IoPool::new(1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                pool.run(async {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
