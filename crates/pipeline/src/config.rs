use std::str::FromStr;
use std::time::Duration;

/// Tunables of the sync pipeline.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Minimum spacing between operator-triggered syncs of one platform.
    pub throttle_ttl: Duration,
    /// Attempts per step, the first one included.
    pub retry_attempts: u32,
    /// Fixed delay between step attempts.
    pub retry_delay: Duration,
    /// Upper bound of the random delay added to `retry_delay`.
    pub retry_jitter: Duration,
    /// Budget for one platform's full sync.
    pub platform_timeout: Duration,
    /// Budget for awaiting a whole sweep.
    pub sweep_timeout: Duration,
    pub full_sync_interval: Duration,
    pub metrics_interval: Duration,
    pub max_concurrent_jobs: usize,
    /// Per-request timeout against inventory endpoints.
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            throttle_ttl: Duration::from_secs(300),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(60),
            retry_jitter: Duration::from_secs(10),
            platform_timeout: Duration::from_secs(600),
            sweep_timeout: Duration::from_secs(1800),
            full_sync_interval: Duration::from_secs(3600),
            metrics_interval: Duration::from_secs(300),
            max_concurrent_jobs: 8,
            request_timeout: virtsync_inventory::DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `SYNC_THROTTLE_SECS`          | `300`   |
    /// | `SYNC_RETRY_ATTEMPTS`         | `3`     |
    /// | `SYNC_RETRY_DELAY_SECS`       | `60`    |
    /// | `SYNC_RETRY_JITTER_SECS`      | `10`    |
    /// | `SYNC_PLATFORM_TIMEOUT_SECS`  | `600`   |
    /// | `SYNC_SWEEP_TIMEOUT_SECS`     | `1800`  |
    /// | `SYNC_FULL_INTERVAL_SECS`     | `3600`  |
    /// | `SYNC_METRICS_INTERVAL_SECS`  | `300`   |
    /// | `SYNC_MAX_CONCURRENT_JOBS`    | `8`     |
    /// | `INVENTORY_REQUEST_TIMEOUT_SECS` | `30` |
    ///
    /// Unparseable values are logged and replaced by the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            throttle_ttl: secs_or("SYNC_THROTTLE_SECS", defaults.throttle_ttl),
            retry_attempts: env_or("SYNC_RETRY_ATTEMPTS", defaults.retry_attempts).max(1),
            retry_delay: secs_or("SYNC_RETRY_DELAY_SECS", defaults.retry_delay),
            retry_jitter: secs_or("SYNC_RETRY_JITTER_SECS", defaults.retry_jitter),
            platform_timeout: secs_or("SYNC_PLATFORM_TIMEOUT_SECS", defaults.platform_timeout),
            sweep_timeout: secs_or("SYNC_SWEEP_TIMEOUT_SECS", defaults.sweep_timeout),
            full_sync_interval: secs_or("SYNC_FULL_INTERVAL_SECS", defaults.full_sync_interval),
            metrics_interval: secs_or("SYNC_METRICS_INTERVAL_SECS", defaults.metrics_interval),
            max_concurrent_jobs: env_or("SYNC_MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs)
                .max(1),
            request_timeout: secs_or("INVENTORY_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Invalid configuration value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn secs_or(key: &str, default: Duration) -> Duration {
    Duration::from_secs(env_or(key, default.as_secs()))
}
