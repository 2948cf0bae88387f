// Kafka boundary for the retry scheduler
//
// This module owns both directions of broker traffic: the consumer reading
// failure reports and the producer firing redeliveries. Both share one
// client configuration path (SSL/SASL included).

pub mod circuit_breaker;
pub mod config;
pub mod consumer;
pub mod metrics;
pub mod producer;
pub mod types;

// Re-export commonly used types
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
pub use config::create_client_config;
pub use consumer::FailureConsumer;
pub use producer::{RedeliveryPublisher, RetryProducer};
pub use types::{FailureRecord, RetryHeaders};
