use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kafka::RetryHeaders;

/// JSON field inside the payload carrying the identity token.
pub const MSG_ID_FIELD: &str = "msgId";

/// Retry bookkeeping stored with every bucket entry.
///
/// The three counters serialize as JSON strings: they round-trip through
/// Kafka headers (which are UTF-8 bytes) and the stored form matches what
/// producers see on the wire. Deserialization accepts bare numbers too, so
/// a hand-written entry does not poison the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOptions {
    /// Redelivery delay in minutes
    #[serde(with = "count_as_string")]
    pub delay: u32,
    /// Retry budget; escalation happens once `retry_count` exceeds it
    #[serde(with = "count_as_string")]
    pub max_retry: u32,
    /// Enqueue counter, incremented by exactly 1 per enqueue
    #[serde(with = "count_as_string")]
    pub retry_count: u32,
    /// Scheduled execution minute, `YYYY-MM-DD HH:mm:00` (UTC, seconds zeroed)
    pub execute_at: String,
}

/// One pending retry attempt, as stored in a time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryEnvelope {
    /// Topic the redelivery is published to
    pub topic: String,
    /// Failure-marker label, also the redelivery record key and the
    /// dead-letter hash field
    pub event: String,
    /// Arbitrary JSON payload; `value.msgId` (when present) is the identity
    /// token arbitrating exclusive redelivery
    pub value: Value,
    pub options: RetryOptions,
}

impl RetryEnvelope {
    /// Identity token carried by the payload, if any.
    pub fn identity_token(&self) -> Option<&str> {
        self.value.get(MSG_ID_FIELD).and_then(Value::as_str)
    }

    /// Replace the identity token in the payload.
    ///
    /// No-op when the payload is not a JSON object; such payloads never had
    /// a token to begin with, so no claim was taken for them.
    pub fn set_identity_token(&mut self, token: &str) {
        if let Some(object) = self.value.as_object_mut() {
            object.insert(MSG_ID_FIELD.to_string(), Value::String(token.to_string()));
        }
    }

    /// True while the retry budget is not exhausted.
    pub fn within_budget(&self) -> bool {
        self.options.retry_count <= self.options.max_retry
    }

    /// Header triple for the outgoing redelivery record.
    pub fn headers(&self) -> RetryHeaders {
        RetryHeaders {
            delay: self.options.delay,
            max_retry: self.options.max_retry,
            retry_count: self.options.retry_count,
        }
    }
}

/// Serialize a counter as a JSON string, accept either form on the way in.
pub(crate) mod count_as_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(t) => t.trim().parse().map_err(serde::de::Error::custom),
        }
    }
}
