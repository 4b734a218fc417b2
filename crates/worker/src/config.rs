use std::time::Duration;

use pixelforge_db::queue::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use pixelforge_storage::StorageConfig;

use crate::supervisor::SupervisorConfig;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Concurrent consumer loops (default: `4`).
    pub concurrency: usize,
    /// Sleep between polls of an empty queue (default: `1000` ms).
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    pub supervisor: SupervisorConfig,
    pub storage: StorageConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default |
    /// |---------------------------------|---------|
    /// | `DATABASE_URL`                  | required |
    /// | `WORKER_CONCURRENCY`            | `4`     |
    /// | `WORKER_POLL_INTERVAL_MS`       | `1000`  |
    /// | `TASK_MAX_ATTEMPTS`             | `5`     |
    /// | `TASK_RETRY_BASE_SECS`          | `5`     |
    /// | `STALE_PROCESSING_TIMEOUT_SECS` | `1800`  |
    /// | `STALE_PENDING_TIMEOUT_SECS`    | `300`   |
    /// | `SUPERVISOR_INTERVAL_SECS`      | `60`    |
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let concurrency: usize = parse_var("WORKER_CONCURRENCY", "4");
        let poll_interval_ms: u64 = parse_var("WORKER_POLL_INTERVAL_MS", "1000");
        let processing_timeout_secs: u64 = parse_var("STALE_PROCESSING_TIMEOUT_SECS", "1800");
        let pending_timeout_secs: u64 = parse_var("STALE_PENDING_TIMEOUT_SECS", "300");
        let supervisor_interval_secs: u64 = parse_var("SUPERVISOR_INTERVAL_SECS", "60");

        Self {
            database_url,
            concurrency: concurrency.max(1),
            poll_interval: Duration::from_millis(poll_interval_ms),
            retry: retry_policy_from_env(),
            supervisor: SupervisorConfig {
                interval: Duration::from_secs(supervisor_interval_secs.max(1)),
                processing_timeout: Duration::from_secs(processing_timeout_secs),
                pending_timeout: Duration::from_secs(pending_timeout_secs),
            },
            storage: StorageConfig::from_env(),
        }
    }

    /// Pool size: one connection per in-flight delivery plus headroom for
    /// job updates, publishing and the supervisor.
    pub fn max_db_connections(&self) -> u32 {
        (self.concurrency as u32).saturating_mul(2) + 2
    }
}

/// `TASK_MAX_ATTEMPTS` and `TASK_RETRY_BASE_SECS`, defaulting to
/// [`RetryPolicy::default`] so the API and the worker agree.
fn retry_policy_from_env() -> RetryPolicy {
    let defaults = RetryPolicy::default();
    let max_attempts: u32 = parse_var("TASK_MAX_ATTEMPTS", &DEFAULT_MAX_ATTEMPTS.to_string());
    let retry_base_secs: u64 = parse_var(
        "TASK_RETRY_BASE_SECS",
        &defaults.base_backoff.as_secs().to_string(),
    );
    RetryPolicy {
        max_attempts: max_attempts.max(1),
        base_backoff: Duration::from_secs(retry_base_secs),
    }
}

fn parse_var<T>(name: &str, default: &str) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Debug,
{
    std::env::var(name)
        .unwrap_or_else(|_| default.into())
        .parse()
        .unwrap_or_else(|e| panic!("{name} must be a valid number: {e:?}"))
}
