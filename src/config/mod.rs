use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Redis host holding the job queue and result keys
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    /// Redis password. Empty means no AUTH.
    #[serde(default)]
    pub redis_password: String,

    /// Redis list the producer pushes audit jobs onto
    #[serde(default = "default_queue_name")]
    pub lighthouse_queue_name: String,

    /// Namespace prefix for report and status keys
    #[serde(default = "default_results_prefix")]
    pub lighthouse_results_prefix: String,

    /// Delay between queue polls, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// How many times a job is re-queued after a retryable failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential retry backoff, in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Watchdog bound for a single audit, in seconds
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    #[serde(default = "default_status_ttl_secs")]
    pub status_ttl_secs: u64,

    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,

    /// Scratch directory for report artifacts and Chrome profiles
    #[serde(default = "std::env::temp_dir")]
    pub lighthouse_temp_dir: PathBuf,

    #[serde(default = "default_chrome_path")]
    pub chrome_path: String,

    #[serde(default = "default_lighthouse_path")]
    pub lighthouse_path: String,

    /// How long to wait for Chrome's DevTools endpoint after launch
    #[serde(default = "default_chrome_startup_timeout_secs")]
    pub chrome_startup_timeout_secs: u64,

    /// Launch Chrome with image loading disabled
    #[serde(default = "default_optimized")]
    pub lighthouse_optimized: bool,

    /// Health endpoint port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_redis_host() -> String {
    "redis".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_queue_name() -> String {
    "lighthouse-jobs".to_string()
}

fn default_results_prefix() -> String {
    "lighthouse-results:".to_string()
}

fn default_poll_interval() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_status_ttl_secs() -> u64 {
    30 * 60
}

fn default_result_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_chrome_path() -> String {
    "google-chrome".to_string()
}

fn default_lighthouse_path() -> String {
    "lighthouse".to_string()
}

fn default_chrome_startup_timeout_secs() -> u64 {
    15
}

fn default_optimized() -> bool {
    true
}

fn default_port() -> u16 {
    8086
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Connection settings for the shared Redis instance. The password is
    /// passed through as-is, so it never needs URL escaping.
    pub fn redis_connection_info(&self) -> redis::ConnectionInfo {
        redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(self.redis_host.clone(), self.redis_port),
            redis: redis::RedisConnectionInfo {
                password: (!self.redis_password.is_empty()).then(|| self.redis_password.clone()),
                ..Default::default()
            },
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn chrome_startup_timeout(&self) -> Duration {
        Duration::from_secs(self.chrome_startup_timeout_secs)
    }
}
