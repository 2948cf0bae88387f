//! Prometheus metrics for the Kafka boundary

use once_cell::sync::Lazy;
use prometheus::{opts, register_histogram, register_int_counter, Histogram, IntCounter};

/// Redelivery records successfully acknowledged by the broker
pub static KAFKA_PRODUCE_SUCCESS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "redrive_kafka_produce_success_total",
        "Redelivery records successfully written to Kafka"
    ))
    .expect("Failed to register KAFKA_PRODUCE_SUCCESS metric")
});

/// Redelivery records that failed to publish
pub static KAFKA_PRODUCE_FAILURE: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "redrive_kafka_produce_failure_total",
        "Redelivery records that failed to write to Kafka"
    ))
    .expect("Failed to register KAFKA_PRODUCE_FAILURE metric")
});

/// Broker acknowledgment latency for redelivery records
pub static KAFKA_PRODUCE_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "redrive_kafka_produce_latency_seconds",
        "Broker acknowledgment latency for redelivery records"
    )
    .expect("Failed to register KAFKA_PRODUCE_LATENCY metric")
});
