//! Environment-driven configuration, read once at startup.

use std::time::Duration;

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub database_url: String,
    pub redis_url: String,

    pub strict_completion_barrier: bool,
    pub use_llm_summaries: bool,
    pub llm_api_key: Option<String>,
    pub validation_skip_signature: bool,
    pub allow_insecure_test_mode: bool,
    pub log_level: String,

    pub outbox_batch_size: usize,
    pub outbox_poll_interval: Duration,
    pub outbox_max_backoff: Duration,

    pub max_concurrent_units: usize,
    pub unit_timeout: Duration,
    pub job_timeout: Duration,

    pub lease_ttl: Duration,

    pub sweeper_interval: Duration,
    pub sweeper_threshold: Duration,
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        OrchestratorConfig {
            database_url: env_string("DATABASE_URL", "postgres://localhost/orchestrator"),
            redis_url: env_string("REDIS_URL", "redis://127.0.0.1:6379"),

            strict_completion_barrier: env_bool("STRICT_COMPLETION_BARRIER", true),
            use_llm_summaries: env_bool("USE_LLM_SUMMARIES", false),
            llm_api_key: std::env::var("LLM_API_KEY").ok(),
            validation_skip_signature: env_bool("VALIDATION_SKIP_SIGNATURE", false),
            allow_insecure_test_mode: env_bool("ALLOW_INSECURE_TEST_MODE", false),
            log_level: env_string("LOG_LEVEL", "info"),

            outbox_batch_size: env_usize("OUTBOX_BATCH_SIZE", 100),
            outbox_poll_interval: Duration::from_millis(env_u64("OUTBOX_POLL_INTERVAL_MS", 500)),
            outbox_max_backoff: Duration::from_secs(env_u64("OUTBOX_MAX_BACKOFF_SECS", 30)),

            max_concurrent_units: env_usize("MAX_CONCURRENT_UNITS", 10),
            unit_timeout: Duration::from_secs(env_u64("UNIT_TIMEOUT_SECS", 300)),
            job_timeout: Duration::from_secs(env_u64("JOB_TIMEOUT_SECS", 3600)),

            lease_ttl: Duration::from_secs(env_u64("LEASE_TTL_SECS", 900)),

            sweeper_interval: Duration::from_secs(env_u64("SWEEPER_INTERVAL_SECS", 300)),
            sweeper_threshold: Duration::from_secs(env_u64("SWEEPER_THRESHOLD_SECS", 900)),
        }
    }

    /// Signature verification may only be skipped in debug builds or when the
    /// operator has explicitly opted into test mode — a production release
    /// build ignores VALIDATION_SKIP_SIGNATURE unless this flag is also set.
    pub fn signature_check_disabled(&self) -> bool {
        self.validation_skip_signature && (cfg!(debug_assertions) || self.allow_insecure_test_mode)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
