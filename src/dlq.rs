// ============================================================================
// Dead-Letter Sink
// ============================================================================
//
// Terminal store for retries that exhausted their budget. A Redis hash is
// used, keyed by the configured sink name, one field per event name, so an
// operator can HGETALL the sink and see the latest failing payload per
// event at a glance.
//
// Escalating a second envelope under the same event name OVERWRITES the
// first: the hash keeps the most recent exhausted payload, not a history.
//
// ============================================================================

use anyhow::{Context, Result};
use redrive_store::RedisStore;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::scheduler::types::RetryEnvelope;

/// Hash-field payload for an escalated envelope.
///
/// `headers` re-encodes the envelope's retry options the way they travel in
/// Kafka headers, so a dead-lettered event can be replayed by publishing
/// `value` with these headers verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    pub value: serde_json::Value,
    pub headers: DeadLetterHeaders,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterHeaders {
    pub delay: String,
    pub max_retry: String,
    pub retry_count: String,
}

impl DeadLetterEntry {
    pub fn from_envelope(envelope: &RetryEnvelope) -> Self {
        Self {
            value: envelope.value.clone(),
            headers: DeadLetterHeaders {
                delay: envelope.options.delay.to_string(),
                max_retry: envelope.options.max_retry.to_string(),
                retry_count: envelope.options.retry_count.to_string(),
            },
        }
    }
}

/// Persists exhausted retry envelopes for manual inspection.
#[derive(Clone)]
pub struct DeadLetterSink {
    store: RedisStore,
    sink_key: String,
}

impl DeadLetterSink {
    pub fn new(store: RedisStore, sink_key: impl Into<String>) -> Self {
        Self {
            store,
            sink_key: sink_key.into(),
        }
    }

    pub fn sink_key(&self) -> &str {
        &self.sink_key
    }

    /// Write the envelope into the sink hash under its event name.
    ///
    /// Overwrites any prior entry for the same event name (no
    /// append/versioning).
    pub async fn escalate(&self, envelope: &RetryEnvelope) -> Result<()> {
        let entry = DeadLetterEntry::from_envelope(envelope);
        let payload =
            serde_json::to_string(&entry).context("Failed to serialize dead-letter entry")?;

        let mut store = self.store.clone();
        store
            .hset(&self.sink_key, &envelope.event, payload)
            .await
            .context("Failed to write dead-letter entry")?;

        info!(
            sink = %self.sink_key,
            event = %envelope.event,
            retry_count = envelope.options.retry_count,
            max_retry = envelope.options.max_retry,
            "Envelope dead-lettered after exhausting retry budget"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::types::RetryOptions;
    use serde_json::json;

    #[test]
    fn test_dead_letter_entry_serialization() {
        let envelope = RetryEnvelope {
            topic: "orders".to_string(),
            event: "OrderFailed".to_string(),
            value: json!({"msgId": "a-1", "success": false}),
            options: RetryOptions {
                delay: 2,
                max_retry: 3,
                retry_count: 4,
                execute_at: "2024-01-01 10:03:00".to_string(),
            },
        };

        let entry = DeadLetterEntry::from_envelope(&envelope);
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(
            json,
            json!({
                "value": {"msgId": "a-1", "success": false},
                "headers": {"delay": "2", "maxRetry": "3", "retryCount": "4"},
            })
        );
    }
}
