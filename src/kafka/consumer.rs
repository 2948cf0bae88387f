use anyhow::{Context, Result};
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use tracing::{error, info};

use super::config::create_client_config;
use super::types::{FailureRecord, RetryHeaders};
use redrive_config::KafkaConfig;

/// Kafka consumer for the failure-report topic
///
/// This consumer is configured for:
/// - Manual offset commits (after a failure report is safely enqueued)
/// - Consumer group coordination (multiple scheduler instances)
/// - Auto-rebalancing on instance addition/removal
pub struct FailureConsumer {
    consumer: StreamConsumer,
    topic: String,
}

impl FailureConsumer {
    /// Create a new Kafka consumer from the application configuration.
    ///
    /// The consumer will not be created if `config.enabled` is false.
    ///
    /// # Configuration
    /// - `enable.auto.commit=false`: Manual offset management.
    /// - `auto.offset.reset=earliest`: Read from beginning on first start.
    /// - `session.timeout.ms=30000`: 30s session timeout.
    /// - `heartbeat.interval.ms=3000`: 3s heartbeat interval.
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        if !config.enabled {
            anyhow::bail!("Cannot create Kafka consumer when Kafka is disabled");
        }

        info!("Initializing Kafka consumer...");
        let mut client_config = create_client_config(config)?;

        let consumer: StreamConsumer = client_config
            .set("group.id", &config.consumer_group)
            // Offset management
            .set("enable.auto.commit", "false") // Manual commit after enqueue
            .set("auto.offset.reset", "earliest")
            .set("allow.auto.create.topics", "true")
            // Session management
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "3000")
            .set("max.poll.interval.ms", "300000")
            .create()
            .context("Failed to create Kafka consumer")?;

        consumer
            .subscribe(&[&config.topic])
            .context("Failed to subscribe to Kafka topic")?;

        info!(
            "Kafka consumer initialized for topic '{}' in group '{}'",
            config.topic, config.consumer_group
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }

    /// Receive the next record from the failure topic.
    ///
    /// Headers are decoded (with defaults) here; the payload stays raw so
    /// the intake loop owns the malformed-JSON policy.
    pub async fn recv(&self) -> Result<FailureRecord> {
        match self.consumer.recv().await {
            Ok(message) => {
                let key = message
                    .key()
                    .and_then(|k| std::str::from_utf8(k).ok())
                    .map(str::to_string);

                Ok(FailureRecord {
                    topic: message.topic().to_string(),
                    partition: message.partition(),
                    key,
                    payload: message.payload().map(|p| p.to_vec()).unwrap_or_default(),
                    headers: RetryHeaders::from_kafka(message.headers()),
                })
            }
            Err(e) => {
                error!(error = %e, "Kafka consumer error");
                Err(anyhow::anyhow!("Consumer error: {}", e))
            }
        }
    }

    /// Commit current offset (after the report is enqueued or discarded)
    ///
    /// This tells Kafka "every report up to this point is handled". If the
    /// instance crashes before committing, the report is redelivered to the
    /// group and enqueued again.
    pub fn commit(&self) -> Result<()> {
        self.consumer
            .commit_consumer_state(rdkafka::consumer::CommitMode::Sync)
            .context("Failed to commit offset")?;
        Ok(())
    }

    /// Subscribed topic name
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_creation_fails_when_disabled() {
        let config = KafkaConfig {
            enabled: false,
            brokers: "localhost:9092".to_string(),
            topic: "test-topic".to_string(),
            consumer_group: "test-group".to_string(),
            ssl_enabled: false,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            ssl_ca_location: None,
            producer_compression: "snappy".to_string(),
            producer_acks: "all".to_string(),
            producer_linger_ms: 0,
            producer_retries: 10,
            producer_request_timeout_ms: 30000,
            producer_enable_idempotence: true,
        };

        let result = FailureConsumer::new(&config);
        assert!(result.is_err());
        if let Err(e) = result {
            assert_eq!(
                e.to_string(),
                "Cannot create Kafka consumer when Kafka is disabled"
            );
        }
    }
}
