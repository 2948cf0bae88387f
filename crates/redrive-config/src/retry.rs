// ============================================================================
// Retry Scheduler Configuration
// ============================================================================

use crate::constants::{DEFAULT_DEAD_LETTER_KEY, DEFAULT_DRAIN_INTERVAL_SECS, DEFAULT_FAILURE_KEY};

/// Configuration for the retry scheduling engine
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// How often the drain loop fires, in seconds
    pub drain_interval_secs: u64,
    /// Kafka message key that marks a record as a failure report.
    /// Records with any other key are ignored by the intake loop.
    pub failure_key: String,
    /// Redis hash receiving exhausted entries, `None` disables escalation
    /// (exhausted entries are then dropped with a warning).
    pub dead_letter_key: Option<String>,
}

impl RetryConfig {
    pub(crate) fn from_env() -> Self {
        let dead_letter_raw = std::env::var("DEAD_LETTER_KEY")
            .unwrap_or_else(|_| DEFAULT_DEAD_LETTER_KEY.to_string());

        Self {
            drain_interval_secs: std::env::var("DRAIN_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DRAIN_INTERVAL_SECS),
            failure_key: std::env::var("FAILURE_KEY")
                .unwrap_or_else(|_| DEFAULT_FAILURE_KEY.to_string()),
            // Empty string disables the sink, matching "no DLQ configured"
            dead_letter_key: if dead_letter_raw.is_empty() {
                None
            } else {
                Some(dead_letter_raw)
            },
        }
    }
}
