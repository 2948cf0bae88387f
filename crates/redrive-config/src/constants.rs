// ============================================================================
// Configuration Constants
// ============================================================================

// Default drain cadence (in seconds). One bucket covers one minute, so the
// drain loop fires once per minute; a shorter interval only re-reads an
// already-empty list.
pub(crate) const DEFAULT_DRAIN_INTERVAL_SECS: u64 = 60;

// Retry-header defaults applied when a failure report omits a header.
// These are wire-level protocol defaults, not tunables: producers that want
// different values send the headers.
pub const DEFAULT_DELAY_MINUTES: u32 = 2;
pub const DEFAULT_MAX_RETRY: u32 = 3;
pub const DEFAULT_RETRY_COUNT: u32 = 0;

// Time conversion constants
pub const SECONDS_PER_MINUTE: i64 = 60;

// Default Redis hash holding dead-lettered events (field = event name).
// Set DEAD_LETTER_KEY="" to disable escalation entirely.
pub(crate) const DEFAULT_DEAD_LETTER_KEY: &str = "redrive:dead-letter";

// Default Kafka message key marking a record as a failure report.
pub(crate) const DEFAULT_FAILURE_KEY: &str = "redrive-retry";
