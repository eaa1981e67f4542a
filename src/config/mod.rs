use serde::Deserialize;
use std::time::Duration;

use crate::services::queue::RetryPolicy;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for job queue
    pub redis_url: String,

    /// OpenAI API key. Absent key means the provider reports unavailable.
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// Stability AI API key. Absent key means the provider reports unavailable.
    #[serde(default)]
    pub stability_api_key: Option<String>,

    /// Provider used when a product names an unknown one
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// R2 bucket name
    pub r2_bucket: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// Public base URL generated assets are served from
    pub public_asset_base_url: String,

    /// Webhook URL for pipeline events; unset disables emission
    #[serde(default)]
    pub event_webhook_url: Option<String>,

    /// Number of concurrent worker slots (bounds in-flight provider calls)
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Maximum delivery attempts before a job is dead-lettered
    #[serde(default = "default_max_attempts")]
    pub queue_max_attempts: u32,

    /// Base retry delay in milliseconds; doubles per attempt
    #[serde(default = "default_retry_base_ms")]
    pub queue_retry_base_ms: u64,

    /// Timeout for provider calls and image transfers, in seconds
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    2000
}

fn default_provider_timeout() -> u64 {
    60
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.queue_max_attempts,
            base_delay: Duration::from_millis(self.queue_retry_base_ms),
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}
