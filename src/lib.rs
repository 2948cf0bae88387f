//! # redrive
//!
//! Delayed-redelivery scheduler for failed Kafka events.
//!
//! Consumers that fail to process an event publish a failure report; this
//! service parks the report in a minute-granular Redis bucket and
//! republishes it after the requested delay, up to a retry budget. Entries
//! that exhaust the budget land in a dead-letter hash for manual
//! inspection.
//!
//! Multiple instances run concurrently against the same Redis: atomic
//! bucket list operations plus a GETDEL claim handshake guarantee each
//! retry attempt is redelivered at most once.

pub mod dedup;
pub mod dlq;
pub mod kafka;
pub mod metrics;
pub mod scheduler;
pub mod worker;

pub use dedup::DedupGuard;
pub use dlq::{DeadLetterEntry, DeadLetterSink};
pub use kafka::{FailureConsumer, RedeliveryPublisher, RetryHeaders, RetryProducer};
pub use scheduler::types::{RetryEnvelope, RetryOptions};
pub use scheduler::{DrainSummary, RetryScheduler};
pub use worker::FailureIntake;
