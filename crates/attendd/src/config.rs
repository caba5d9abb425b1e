use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f32,
    /// Reference population cache TTL in seconds.
    pub cache_ttl_secs: u64,
    /// Capacity of the event and response queues.
    pub queue_capacity: usize,
    /// Keep-alive probe interval in seconds.
    pub ping_interval_secs: u64,
    /// Maximum in-flight matching tasks per connection.
    pub max_pending_per_connection: usize,
    /// CPU-bound matching workers.
    pub cpu_workers: usize,
    /// Concurrent blocking-delivery permits.
    pub io_workers: usize,
    /// Path to the reference population snapshot (JSON).
    pub population_path: PathBuf,
}

impl Config {
    /// Load configuration from `ATTENDD_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("attend");

        let population_path = std::env::var("ATTENDD_POPULATION_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("population.json"));

        Self {
            similarity_threshold: env_f32(
                "ATTENDD_SIMILARITY_THRESHOLD",
                attend_core::DEFAULT_SIMILARITY_THRESHOLD,
            ),
            cache_ttl_secs: env_u64("ATTENDD_CACHE_TTL_SECS", 300),
            queue_capacity: env_usize("ATTENDD_QUEUE_CAPACITY", 100),
            ping_interval_secs: env_u64("ATTENDD_PING_INTERVAL_SECS", 30),
            max_pending_per_connection: env_usize("ATTENDD_MAX_PENDING_PER_CONNECTION", 2),
            // One CPU stays free for the event loop and system tasks.
            cpu_workers: env_usize("ATTENDD_CPU_WORKERS", parallelism.saturating_sub(1).max(1)),
            io_workers: env_usize("ATTENDD_IO_WORKERS", parallelism * 2),
            population_path,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
