use std::time::Duration;

/// Tuning knobs for a [`crate::pool::WorkerPool`], sourced from the daemon's
/// `[worker]` TOML table.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_concurrent_jobs: usize,
    pub results_channel_capacity: usize,
    pub fetch_cooldown: Duration,
    pub parse_cooldown: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2 * std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            results_channel_capacity: 1024,
            fetch_cooldown: Duration::from_secs(60),
            parse_cooldown: Duration::from_secs(5 * 60),
        }
    }
}
