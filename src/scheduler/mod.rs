// ============================================================================
// Retry Scheduler
// ============================================================================
//
// The engine: failure reports are parked in minute-granular Redis buckets
// and republished once their bucket's minute arrives.
//
// Flow:
// 1. enqueue: compute the target minute (now + delay + 1), append the
//    envelope to that bucket list (RPUSH), refresh the bucket TTL, and
//    register a claim marker when the payload carries an identity token.
// 2. drain (once per interval): LPOP the current-minute bucket to empty.
//    - Within budget: claim the identity token (GETDEL). The claim winner
//      mints a fresh token, rewrites the payload and publishes; losers skip.
//    - Budget exhausted: escalate to the dead-letter sink.
//
// Bucket mutations are atomic list operations, so concurrent enqueues never
// lose updates and concurrent drains never hand the same list entry to two
// instances. The claim marker covers the remaining window: the same logical
// event enqueued more than once is still redelivered at most once per token.
//
// Per-entry failures (corrupt JSON, broker errors, dead-letter write
// errors) are contained to the entry; the tick always finishes the bucket
// and the loop keeps firing.
//
// ============================================================================

pub mod bucket;
pub mod types;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dedup::DedupGuard;
use crate::dlq::DeadLetterSink;
use crate::kafka::{RedeliveryPublisher, RetryHeaders};
use crate::metrics;
use redrive_store::RedisStore;
use types::{RetryEnvelope, RetryOptions};

/// Outcome tallies for one drained bucket.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainSummary {
    /// Entries popped from the bucket (including corrupt ones)
    pub found: u64,
    /// Redeliveries acknowledged by the publisher
    pub published: u64,
    /// Entries escalated to the dead-letter sink
    pub dead_lettered: u64,
    /// Claim races lost to another scheduler instance
    pub claims_lost: u64,
    /// Entries skipped (no identity token, or exhausted with no sink)
    pub skipped: u64,
    /// Entries that failed to parse
    pub corrupt: u64,
    /// Publish or dead-letter write failures (contained per entry)
    pub failures: u64,
}

/// The retry scheduling engine.
///
/// Holds injected handles to the backing store and the publisher; safe to
/// share behind an `Arc` between the intake loop and the drain loop.
pub struct RetryScheduler {
    store: RedisStore,
    dedup: DedupGuard,
    publisher: Arc<dyn RedeliveryPublisher>,
    dead_letter: Option<DeadLetterSink>,
    drain_interval: Duration,
}

impl RetryScheduler {
    pub fn new(
        store: RedisStore,
        publisher: Arc<dyn RedeliveryPublisher>,
        dead_letter: Option<DeadLetterSink>,
        drain_interval: Duration,
    ) -> Self {
        Self {
            dedup: DedupGuard::new(store.clone()),
            store,
            publisher,
            dead_letter,
            drain_interval,
        }
    }

    /// Park a failed event for future redelivery.
    ///
    /// After this returns the envelope is durably visible to any instance
    /// that later drains the target bucket. No uniqueness is enforced:
    /// enqueueing the same logical event twice stores two entries (the
    /// claim marker still bounds redelivery to once per token).
    pub async fn enqueue(
        &self,
        topic: &str,
        event: &str,
        value: Value,
        headers: &RetryHeaders,
    ) -> Result<String> {
        self.enqueue_at(Utc::now(), topic, event, value, headers)
            .await
    }

    /// [`enqueue`](Self::enqueue) with an explicit clock.
    ///
    /// Returns the bucket key the envelope landed in.
    pub async fn enqueue_at(
        &self,
        now: DateTime<Utc>,
        topic: &str,
        event: &str,
        value: Value,
        headers: &RetryHeaders,
    ) -> Result<String> {
        let target = bucket::target_minute(now, headers.delay);
        let key = bucket::bucket_key_at(target);

        let envelope = RetryEnvelope {
            topic: topic.to_string(),
            event: event.to_string(),
            value,
            options: RetryOptions {
                delay: headers.delay,
                max_retry: headers.max_retry,
                retry_count: headers.retry_count + 1,
                execute_at: bucket::execute_at_stamp(target),
            },
        };

        if let Some(token) = envelope.identity_token() {
            self.dedup
                .register(token)
                .await
                .context("Failed to register claim marker")?;
        }

        let entry =
            serde_json::to_string(&envelope).context("Failed to serialize retry envelope")?;

        let mut store = self.store.clone();
        store
            .rpush(&key, entry)
            .await
            .context("Failed to append retry to bucket")?;
        // TTL is refreshed on every append (not just the first): the clock
        // keeps running from the latest enqueue, which always covers the
        // target minute because the target is delay+1 minutes out.
        store
            .expire(&key, bucket::bucket_ttl_seconds(headers.delay))
            .await
            .context("Failed to set bucket TTL")?;

        metrics::RETRIES_ENQUEUED.inc();
        debug!(
            bucket = %key,
            topic = %topic,
            event = %event,
            retry_count = envelope.options.retry_count,
            execute_at = %envelope.options.execute_at,
            "Retry enqueued"
        );

        Ok(key)
    }

    /// Drain the bucket whose minute is now.
    pub async fn drain_tick(&self) -> Result<DrainSummary> {
        self.drain_bucket(&bucket::bucket_key_at(Utc::now())).await
    }

    /// Drain one bucket to empty, acting on each entry in FIFO order.
    pub async fn drain_bucket(&self, key: &str) -> Result<DrainSummary> {
        let timer = metrics::DRAIN_TICK_DURATION.start_timer();
        let mut summary = DrainSummary::default();
        let mut store = self.store.clone();

        // LPOP hands each entry to exactly one instance, so concurrent
        // drains of the same bucket split the list instead of replaying it.
        while let Some(raw) = store
            .lpop::<String>(key)
            .await
            .context("Failed to pop bucket entry")?
        {
            summary.found += 1;

            let envelope: RetryEnvelope = match serde_json::from_str(&raw) {
                Ok(envelope) => envelope,
                Err(e) => {
                    summary.corrupt += 1;
                    metrics::CORRUPT_ENTRIES.inc();
                    warn!(
                        bucket = %key,
                        error = %e,
                        "Corrupt bucket entry - skipping"
                    );
                    continue;
                }
            };

            if envelope.within_budget() {
                self.redeliver(key, envelope, &mut summary).await;
            } else {
                self.escalate(key, &envelope, &mut summary).await;
            }
        }

        timer.observe_duration();

        if summary.found > 0 {
            info!(
                bucket = %key,
                found = summary.found,
                published = summary.published,
                dead_lettered = summary.dead_lettered,
                claims_lost = summary.claims_lost,
                skipped = summary.skipped,
                corrupt = summary.corrupt,
                failures = summary.failures,
                "Bucket drained"
            );
        } else {
            // The common case: no failures were scheduled for this minute
            debug!(bucket = %key, "Bucket empty");
        }

        Ok(summary)
    }

    /// Claim and republish a single within-budget entry.
    async fn redeliver(&self, bucket: &str, mut envelope: RetryEnvelope, summary: &mut DrainSummary) {
        let Some(token) = envelope.identity_token().map(str::to_string) else {
            // No token means no claim marker was ever registered; without an
            // arbiter every instance would publish, so the entry is skipped.
            summary.skipped += 1;
            debug!(
                bucket = %bucket,
                event = %envelope.event,
                "Entry carries no identity token - skipping"
            );
            return;
        };

        match self.dedup.claim(&token).await {
            Ok(true) => {}
            Ok(false) => {
                summary.claims_lost += 1;
                metrics::CLAIMS_LOST.inc();
                debug!(
                    bucket = %bucket,
                    event = %envelope.event,
                    token = %token,
                    "Claim lost - another instance redelivers this entry"
                );
                return;
            }
            Err(e) => {
                summary.failures += 1;
                error!(
                    bucket = %bucket,
                    event = %envelope.event,
                    error = %e,
                    "Claim lookup failed - entry not redelivered"
                );
                return;
            }
        }

        // Fresh token, so the event is claimable again after its next failure
        envelope.set_identity_token(&Uuid::new_v4().to_string());

        let payload = match serde_json::to_vec(&envelope.value) {
            Ok(payload) => payload,
            Err(e) => {
                summary.failures += 1;
                error!(bucket = %bucket, error = %e, "Failed to serialize redelivery payload");
                return;
            }
        };

        match self
            .publisher
            .publish(&envelope.topic, &envelope.event, &payload, &envelope.headers())
            .await
        {
            Ok(()) => {
                summary.published += 1;
                metrics::REDELIVERIES_PUBLISHED.inc();
                info!(
                    bucket = %bucket,
                    topic = %envelope.topic,
                    event = %envelope.event,
                    retry_count = envelope.options.retry_count,
                    "Redelivery published"
                );
            }
            Err(e) => {
                // Contained to this entry; the rest of the bucket still drains
                summary.failures += 1;
                error!(
                    bucket = %bucket,
                    topic = %envelope.topic,
                    event = %envelope.event,
                    error = %e,
                    "Redelivery publish failed"
                );
            }
        }
    }

    /// Forward an exhausted entry to the dead-letter sink.
    async fn escalate(&self, bucket: &str, envelope: &RetryEnvelope, summary: &mut DrainSummary) {
        let Some(sink) = &self.dead_letter else {
            summary.skipped += 1;
            warn!(
                bucket = %bucket,
                event = %envelope.event,
                retry_count = envelope.options.retry_count,
                "Retry budget exhausted and no dead-letter sink configured - dropping entry"
            );
            return;
        };

        match sink.escalate(envelope).await {
            Ok(()) => {
                summary.dead_lettered += 1;
                metrics::ENTRIES_DEAD_LETTERED.inc();
            }
            Err(e) => {
                // Losing a dead-letter write is undesirable but not fatal
                summary.failures += 1;
                error!(
                    bucket = %bucket,
                    event = %envelope.event,
                    error = %e,
                    "Dead-letter write failed"
                );
            }
        }
    }

    /// Periodic drain loop. Runs until the shutdown flag is set.
    ///
    /// `MissedTickBehavior::Skip` is the overlap guard: a tick that takes
    /// longer than the interval delays the next firing instead of stacking
    /// a second drain on top of it, and missed firings are dropped.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        let mut ticker = interval(self.drain_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.drain_interval.as_secs(),
            "Drain loop started"
        );

        while !shutdown.load(Ordering::SeqCst) {
            ticker.tick().await;

            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.drain_tick().await {
                error!(error = %e, "Drain tick failed");
            }
        }

        info!("Drain loop stopped");
    }
}
