// ============================================================================
// Failure Intake Loop
// ============================================================================
//
// Reads the failure topic and parks failure reports in the scheduler.
//
// A record is a failure report when its key equals the configured failure
// marker. The payload must be JSON; a `success: true` field means the
// consumer recovered on its own and there is nothing to retry. Everything
// else (including a missing `success` field) is enqueued.
//
// Offset management: the offset is committed after the report is enqueued
// or deliberately discarded. If the enqueue fails (Redis down), the offset
// stays uncommitted and Kafka redelivers the report to the group.
// Malformed JSON is a non-retriable parse failure: logged, dropped, and
// committed so it cannot wedge the partition.
//
// ============================================================================

use anyhow::Result;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::kafka::{FailureConsumer, FailureRecord};
use crate::metrics;
use crate::scheduler::RetryScheduler;

/// Consumes failure reports and feeds the scheduler.
pub struct FailureIntake {
    consumer: FailureConsumer,
    scheduler: Arc<RetryScheduler>,
    failure_key: String,
}

/// What happened to one polled record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntakeOutcome {
    Enqueued,
    Ignored,
}

impl FailureIntake {
    pub fn new(
        consumer: FailureConsumer,
        scheduler: Arc<RetryScheduler>,
        failure_key: impl Into<String>,
    ) -> Self {
        Self {
            consumer,
            scheduler,
            failure_key: failure_key.into(),
        }
    }

    /// Poll the failure topic until the shutdown flag is set.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        info!(
            topic = %self.consumer.topic(),
            failure_key = %self.failure_key,
            "Failure intake started"
        );

        let mut enqueued: u64 = 0;
        let mut ignored: u64 = 0;
        let mut last_tally_log = std::time::Instant::now();

        while !shutdown.load(Ordering::SeqCst) {
            match self.consumer.recv().await {
                Ok(record) => match self.handle_record(&record).await {
                    Ok(outcome) => {
                        match outcome {
                            IntakeOutcome::Enqueued => enqueued += 1,
                            IntakeOutcome::Ignored => ignored += 1,
                        }
                        if let Err(e) = self.consumer.commit() {
                            error!(error = %e, "Failed to commit offset after handling report");
                        }
                    }
                    Err(e) => {
                        // Enqueue failed - offset NOT committed, Kafka will
                        // redeliver this report
                        error!(
                            error = %e,
                            topic = %record.topic,
                            "Failed to enqueue failure report - offset not committed"
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                    }
                },
                Err(e) => {
                    error!(error = %e, "Kafka consumer error");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }

            // Periodic tallies (every 30 seconds)
            let now = std::time::Instant::now();
            if now.duration_since(last_tally_log).as_secs() >= 30 {
                info!(
                    enqueued = enqueued,
                    ignored = ignored,
                    "Intake tallies (last 30s)"
                );
                enqueued = 0;
                ignored = 0;
                last_tally_log = now;
            }
        }

        info!("Failure intake stopped");
    }

    /// Decide and act on one record. `Err` means the enqueue itself failed
    /// and the offset must not be committed.
    async fn handle_record(&self, record: &FailureRecord) -> Result<IntakeOutcome> {
        let Some(key) = record.key.as_deref() else {
            debug!(topic = %record.topic, "Record has no key - not a failure report");
            return Ok(IntakeOutcome::Ignored);
        };

        if key != self.failure_key {
            debug!(
                topic = %record.topic,
                key = %key,
                "Record key does not match failure marker - ignored"
            );
            return Ok(IntakeOutcome::Ignored);
        }

        let Some(value) = failure_payload(&record.payload) else {
            metrics::REPORTS_DISCARDED.inc();
            warn!(
                topic = %record.topic,
                partition = record.partition,
                "Malformed failure report payload - dropped"
            );
            return Ok(IntakeOutcome::Ignored);
        };

        if value.get("success").and_then(Value::as_bool) == Some(true) {
            debug!(topic = %record.topic, "Report marked success - nothing to retry");
            return Ok(IntakeOutcome::Ignored);
        }

        let bucket = self
            .scheduler
            .enqueue(&record.topic, key, value, &record.headers)
            .await?;

        debug!(
            topic = %record.topic,
            bucket = %bucket,
            retry_count = record.headers.retry_count + 1,
            "Failure report enqueued for redelivery"
        );

        Ok(IntakeOutcome::Enqueued)
    }
}

/// Parse a failure-report payload. `None` means malformed (not JSON).
fn failure_payload(payload: &[u8]) -> Option<Value> {
    serde_json::from_slice(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_payload_accepts_json() {
        let value = failure_payload(br#"{"msgId": "a-1", "success": false}"#).unwrap();
        assert_eq!(value["success"], serde_json::json!(false));
    }

    #[test]
    fn test_failure_payload_rejects_garbage() {
        assert!(failure_payload(b"not json at all").is_none());
        assert!(failure_payload(b"").is_none());
    }

    #[test]
    fn test_missing_success_field_counts_as_failed() {
        // A report without `success` is still a failure report; only an
        // explicit `success: true` skips the retry.
        let value = failure_payload(br#"{"msgId": "a-1"}"#).unwrap();
        assert_ne!(value.get("success").and_then(Value::as_bool), Some(true));
    }
}
