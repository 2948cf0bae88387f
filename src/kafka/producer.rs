use anyhow::{Context, Result};
use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use super::config::create_client_config;
use super::metrics;
use super::types::RetryHeaders;
use redrive_config::KafkaConfig;

/// The seam between the scheduler and the event bus.
///
/// The drain loop only needs "fire this redelivery"; everything else
/// (delivery guarantees, circuit breaking, batching) belongs to the
/// implementation. Tests substitute a recording stub.
#[async_trait]
pub trait RedeliveryPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &RetryHeaders,
    ) -> Result<()>;
}

/// Kafka producer for redelivered events
///
/// This producer is configured for:
/// - At-least-once delivery guarantees
/// - Idempotent writes (no duplicates within producer session)
/// - Circuit breaker protection (a dead broker fails fast instead of
///   stalling the drain tick)
pub struct RetryProducer {
    /// The actual Kafka producer (None when disabled)
    producer: Option<Arc<FutureProducer>>,
    circuit_breaker: Arc<CircuitBreaker>,
    enabled: bool,
}

impl RetryProducer {
    /// Create a new Kafka producer from the application configuration.
    ///
    /// # Configuration
    /// - `acks=all`: Wait for all in-sync replicas to acknowledge.
    /// - `enable.idempotence=true`: Prevent duplicate writes.
    /// - `compression.type=snappy`: Optimized compression.
    /// - `linger.ms=10`: Small batching window for low latency.
    /// - Circuit breaker: 5 failures → open, 3s timeout, 30s reset
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let circuit_breaker = Arc::new(CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 5,
            timeout: Duration::from_secs(3),
            reset_timeout: Duration::from_secs(30),
        }));

        if !config.enabled {
            info!("Kafka producer disabled (KAFKA_ENABLED=false)");
            // No producer is created when disabled - avoid connection attempts entirely
            return Ok(Self {
                producer: None,
                circuit_breaker,
                enabled: false,
            });
        }

        info!("Initializing Kafka producer...");
        let mut client_config = create_client_config(config)?;

        let producer: FutureProducer = client_config
            .set("acks", &config.producer_acks)
            .set(
                "enable.idempotence",
                if config.producer_enable_idempotence {
                    "true"
                } else {
                    "false"
                },
            )
            .set("retries", config.producer_retries.to_string())
            .set("compression.type", &config.producer_compression)
            .set("linger.ms", config.producer_linger_ms.to_string())
            .set(
                "request.timeout.ms",
                config.producer_request_timeout_ms.to_string(),
            )
            .create()
            .context("Failed to create Kafka producer")?;

        info!("Kafka producer initialized with circuit breaker");

        Ok(Self {
            producer: Some(Arc::new(producer)),
            circuit_breaker,
            enabled: true,
        })
    }

    /// Send a redelivery record with circuit breaker protection
    ///
    /// # Returns
    /// * `Ok((partition, offset))` - Successfully written to Kafka
    /// * `Err(CircuitBreakerError::Open)` - Circuit is open, Kafka unavailable
    /// * `Err(CircuitBreakerError::Timeout)` - Request timed out
    /// * `Err(CircuitBreakerError::Inner)` - Kafka error
    pub async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &RetryHeaders,
    ) -> Result<(i32, i64), CircuitBreakerError<anyhow::Error>> {
        if !self.enabled {
            tracing::debug!(
                topic = %topic,
                key = %key,
                "Kafka disabled - redelivery NOT sent (dummy response)"
            );
            return Ok((-1, -1)); // Dummy partition/offset
        }

        self.circuit_breaker
            .call(self.send_internal(topic, key, payload, headers))
            .await
    }

    /// Internal send implementation (wrapped by circuit breaker)
    async fn send_internal(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &RetryHeaders,
    ) -> Result<(i32, i64)> {
        let producer = self
            .producer
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Kafka producer not initialized"))?;

        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload)
            .headers(headers.to_owned_headers());

        let start = std::time::Instant::now();

        match producer
            .send(record, Timeout::After(Duration::from_secs(2)))
            .await
        {
            Ok((partition, offset)) => {
                let latency = start.elapsed();

                metrics::KAFKA_PRODUCE_SUCCESS.inc();
                metrics::KAFKA_PRODUCE_LATENCY.observe(latency.as_secs_f64());

                info!(
                    partition = partition,
                    offset = offset,
                    topic = %topic,
                    key = %key,
                    retry_count = headers.retry_count,
                    latency_ms = latency.as_millis(),
                    "Redelivery persisted to Kafka"
                );

                Ok((partition, offset))
            }
            Err((kafka_err, _)) => {
                metrics::KAFKA_PRODUCE_FAILURE.inc();

                error!(
                    error = %kafka_err,
                    topic = %topic,
                    key = %key,
                    latency_ms = start.elapsed().as_millis(),
                    "Failed to send redelivery to Kafka"
                );

                Err(anyhow::anyhow!("Kafka send failed: {}", kafka_err))
            }
        }
    }

    /// Check if Kafka is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Flush pending messages (for graceful shutdown)
    ///
    /// This waits for all in-flight messages to be acknowledged.
    /// Should be called before application shutdown.
    pub async fn flush(&self, timeout: Duration) -> Result<()> {
        let producer = match &self.producer {
            Some(p) => p,
            None => return Ok(()), // Nothing to flush when disabled
        };

        info!("Flushing Kafka producer (timeout: {:?})", timeout);

        producer
            .flush(Timeout::After(timeout))
            .context("Failed to flush Kafka producer")?;

        Ok(())
    }
}

#[async_trait]
impl RedeliveryPublisher for RetryProducer {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &RetryHeaders,
    ) -> Result<()> {
        self.send(topic, key, payload, headers)
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("redelivery publish failed: {e}"))
    }
}

// Implement Clone manually to avoid cloning the producer (Arc handles it)
impl Clone for RetryProducer {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.as_ref().map(Arc::clone),
            circuit_breaker: Arc::clone(&self.circuit_breaker),
            enabled: self.enabled,
        }
    }
}
