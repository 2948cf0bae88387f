//! Prometheus metrics for the retry scheduler
//!
//! Kafka produce metrics live next to the producer in `kafka::metrics`.

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    opts, register_histogram, register_int_counter, Encoder, Histogram, IntCounter, TextEncoder,
};

/// Failure reports parked in a time bucket
pub static RETRIES_ENQUEUED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "redrive_retries_enqueued_total",
        "Failure reports parked in a time bucket"
    ))
    .expect("Failed to register RETRIES_ENQUEUED metric")
});

/// Redeliveries handed to the publisher and acknowledged
pub static REDELIVERIES_PUBLISHED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "redrive_redeliveries_published_total",
        "Redeliveries acknowledged by the event bus"
    ))
    .expect("Failed to register REDELIVERIES_PUBLISHED metric")
});

/// Claim races lost to a concurrent scheduler instance
pub static CLAIMS_LOST: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "redrive_claims_lost_total",
        "Claim races lost to another scheduler instance"
    ))
    .expect("Failed to register CLAIMS_LOST metric")
});

/// Entries escalated to the dead-letter sink
pub static ENTRIES_DEAD_LETTERED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "redrive_entries_dead_lettered_total",
        "Entries escalated to the dead-letter sink after exhausting retries"
    ))
    .expect("Failed to register ENTRIES_DEAD_LETTERED metric")
});

/// Bucket entries that failed to parse
pub static CORRUPT_ENTRIES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "redrive_corrupt_entries_total",
        "Bucket entries dropped because they failed to parse"
    ))
    .expect("Failed to register CORRUPT_ENTRIES metric")
});

/// Failure reports discarded by the intake loop (wrong key, malformed JSON)
pub static REPORTS_DISCARDED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "redrive_reports_discarded_total",
        "Failure reports discarded without enqueueing"
    ))
    .expect("Failed to register REPORTS_DISCARDED metric")
});

/// Wall-clock duration of one drain tick
pub static DRAIN_TICK_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "redrive_drain_tick_duration_seconds",
        "Wall-clock duration of one drain tick"
    )
    .expect("Failed to register DRAIN_TICK_DURATION metric")
});

/// Gather all registered metrics in Prometheus text exposition format.
pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
