use rdkafka::message::{Header, Headers, OwnedHeaders};
use redrive_config::{DEFAULT_DELAY_MINUTES, DEFAULT_MAX_RETRY, DEFAULT_RETRY_COUNT};

/// Retry parameters carried in Kafka record headers.
///
/// Producers attach `delay`, `maxRetry` and `retryCount` as UTF-8 encoded
/// header values. Any header that is missing or unparseable falls back to
/// the protocol default, so a bare failure report without headers is valid
/// and retries with `delay=2`, `maxRetry=3`, `retryCount=0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryHeaders {
    /// Redelivery delay in minutes
    pub delay: u32,
    /// Retry budget; redelivery stops once the count exceeds it
    pub max_retry: u32,
    /// Number of enqueues already performed for this event
    pub retry_count: u32,
}

impl Default for RetryHeaders {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY_MINUTES,
            max_retry: DEFAULT_MAX_RETRY,
            retry_count: DEFAULT_RETRY_COUNT,
        }
    }
}

impl RetryHeaders {
    pub const DELAY: &'static str = "delay";
    pub const MAX_RETRY: &'static str = "maxRetry";
    pub const RETRY_COUNT: &'static str = "retryCount";

    /// Decode retry headers from a Kafka record, applying defaults for
    /// anything missing.
    pub fn from_kafka<H: Headers>(headers: Option<&H>) -> Self {
        let Some(headers) = headers else {
            return Self::default();
        };

        Self {
            delay: header_count(headers, Self::DELAY, DEFAULT_DELAY_MINUTES),
            max_retry: header_count(headers, Self::MAX_RETRY, DEFAULT_MAX_RETRY),
            retry_count: header_count(headers, Self::RETRY_COUNT, DEFAULT_RETRY_COUNT),
        }
    }

    /// Re-encode for an outgoing redelivery record.
    pub fn to_owned_headers(&self) -> OwnedHeaders {
        OwnedHeaders::new()
            .insert(Header {
                key: Self::DELAY,
                value: Some(&self.delay.to_string()),
            })
            .insert(Header {
                key: Self::MAX_RETRY,
                value: Some(&self.max_retry.to_string()),
            })
            .insert(Header {
                key: Self::RETRY_COUNT,
                value: Some(&self.retry_count.to_string()),
            })
    }
}

fn header_count<H: Headers>(headers: &H, name: &str, default: u32) -> u32 {
    for header in headers.iter() {
        if header.key == name {
            return header
                .value
                .and_then(|v| std::str::from_utf8(v).ok())
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default);
        }
    }
    default
}

/// One record received from the failure topic, before payload parsing.
///
/// The payload stays raw here: JSON decoding happens in the intake loop so
/// that a malformed payload can be logged and dropped without touching the
/// consumer.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub topic: String,
    pub partition: i32,
    /// Record key; the intake loop only acts on the configured failure marker
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub headers: RetryHeaders,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_headers_absent() {
        let headers = RetryHeaders::from_kafka::<OwnedHeaders>(None);
        assert_eq!(
            headers,
            RetryHeaders {
                delay: 2,
                max_retry: 3,
                retry_count: 0
            }
        );
    }

    #[test]
    fn test_decode_with_partial_headers() {
        let owned = OwnedHeaders::new()
            .insert(Header {
                key: "delay",
                value: Some("10"),
            })
            .insert(Header {
                key: "retryCount",
                value: Some("4"),
            });

        let headers = RetryHeaders::from_kafka(Some(&owned));
        assert_eq!(headers.delay, 10);
        assert_eq!(headers.max_retry, 3); // defaulted
        assert_eq!(headers.retry_count, 4);
    }

    #[test]
    fn test_garbage_header_value_falls_back_to_default() {
        let owned = OwnedHeaders::new().insert(Header {
            key: "maxRetry",
            value: Some("not-a-number"),
        });

        let headers = RetryHeaders::from_kafka(Some(&owned));
        assert_eq!(headers.max_retry, 3);
    }

    #[test]
    fn test_header_round_trip() {
        let headers = RetryHeaders {
            delay: 5,
            max_retry: 7,
            retry_count: 2,
        };

        let owned = headers.to_owned_headers();
        assert_eq!(RetryHeaders::from_kafka(Some(&owned)), headers);
    }
}
