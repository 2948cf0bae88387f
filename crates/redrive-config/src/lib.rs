// ============================================================================
// Redrive Config - Centralized configuration management
// ============================================================================
//
// This crate provides centralized configuration for the redrive scheduler.
// Supports loading from environment variables with sensible defaults.
//
// ============================================================================

mod constants;
mod kafka;
mod retry;

// Re-export all public types
pub use constants::{
    DEFAULT_DELAY_MINUTES, DEFAULT_MAX_RETRY, DEFAULT_RETRY_COUNT, SECONDS_PER_MINUTE,
};
pub use kafka::KafkaConfig;
pub use retry::RetryConfig;

use anyhow::Result;

/// Main configuration structure for the redrive scheduler
#[derive(Clone, Debug)]
pub struct Config {
    /// Redis connection URL (redis:// or rediss://)
    pub redis_url: String,
    /// Log filter, passed to the tracing EnvFilter
    pub rust_log: String,

    // Sub-configurations
    pub kafka: KafkaConfig,
    pub retry: RetryConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            kafka: KafkaConfig::from_env(),
            retry: RetryConfig::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_defaults_match_protocol() {
        // The defaults are part of the wire protocol between producers and
        // this scheduler; changing them silently changes retry behavior for
        // every producer that omits headers.
        assert_eq!(DEFAULT_DELAY_MINUTES, 2);
        assert_eq!(DEFAULT_MAX_RETRY, 3);
        assert_eq!(DEFAULT_RETRY_COUNT, 0);
    }

    #[test]
    fn test_empty_dead_letter_key_disables_sink() {
        std::env::set_var("DEAD_LETTER_KEY", "");
        let retry = RetryConfig::from_env();
        assert_eq!(retry.dead_letter_key, None);

        std::env::remove_var("DEAD_LETTER_KEY");
        let retry = RetryConfig::from_env();
        assert_eq!(retry.dead_letter_key.as_deref(), Some("redrive:dead-letter"));
    }
}
