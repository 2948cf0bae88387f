//! Time-bucket key arithmetic.
//!
//! Buckets are keyed by a minute-truncated UTC timestamp, `YYYYMMDD-HHmm`.
//! Both the enqueue and drain paths format through these helpers; mixing
//! timezones here would silently re-target redeliveries to a bucket nobody
//! drains.

use chrono::{DateTime, Duration, Utc};
use redrive_config::SECONDS_PER_MINUTE;

const BUCKET_KEY_FORMAT: &str = "%Y%m%d-%H%M";
const EXECUTE_AT_FORMAT: &str = "%Y-%m-%d %H:%M:00";

/// Bucket key for the minute containing `instant`.
pub fn bucket_key_at(instant: DateTime<Utc>) -> String {
    instant.format(BUCKET_KEY_FORMAT).to_string()
}

/// `executeAt` stamp for the minute containing `instant` (seconds zeroed).
pub fn execute_at_stamp(instant: DateTime<Utc>) -> String {
    instant.format(EXECUTE_AT_FORMAT).to_string()
}

/// The minute a retry enqueued now with `delay` lands in.
///
/// The target is `now + delay + 1` minutes: the extra minute also pads the
/// bucket TTL, so the bucket cannot expire before the drain tick for its
/// minute has fired, even with clock or polling skew between instances.
pub fn target_minute(now: DateTime<Utc>, delay_minutes: u32) -> DateTime<Utc> {
    now + Duration::minutes(i64::from(expire_minutes(delay_minutes)))
}

/// Bucket lifetime in minutes for a given delay.
pub fn expire_minutes(delay_minutes: u32) -> u32 {
    delay_minutes + 1
}

/// Bucket TTL in seconds for a given delay.
pub fn bucket_ttl_seconds(delay_minutes: u32) -> i64 {
    SECONDS_PER_MINUTE * i64::from(expire_minutes(delay_minutes))
}
