//! Snowflake id codec.
//!
//! A snowflake carries its creation time (milliseconds since the platform
//! epoch) in the bits above [`TIMESTAMP_SHIFT`]; the low bits hold worker,
//! process and sequence numbers.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::error::{Error, Result};

/// 2015-01-01T00:00:00Z in Unix milliseconds.
pub const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Number of low-order bits that do not encode time.
pub const TIMESTAMP_SHIFT: u32 = 22;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Smallest id whose encoded creation time is at or after `t`.
pub fn from_timestamp(t: DateTime<Utc>) -> Result<u64> {
    let since_epoch = t.timestamp_millis() - DISCORD_EPOCH_MS;
    if since_epoch < 0 {
        return Err(Error::InvalidInput(format!(
            "timestamp {} precedes the snowflake epoch",
            t.to_rfc3339()
        )));
    }
    let ms = since_epoch as u64;
    if ms >> (64 - TIMESTAMP_SHIFT) != 0 {
        return Err(Error::InvalidInput(format!(
            "timestamp {} does not fit in a snowflake",
            t.to_rfc3339()
        )));
    }
    Ok(ms << TIMESTAMP_SHIFT)
}

/// Creation time encoded in `id`, truncated to the millisecond.
pub fn to_timestamp(id: u64) -> DateTime<Utc> {
    let ms = (id >> TIMESTAMP_SHIFT) as i64 + DISCORD_EPOCH_MS;
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Id bound for messages `days` old relative to `now`.
pub fn from_age_days(days: f64, now: DateTime<Utc>) -> Result<u64> {
    if !days.is_finite() || days < 0.0 {
        return Err(Error::InvalidInput(format!(
            "age must be a non-negative number of days, got {}",
            days
        )));
    }
    let offset = Duration::milliseconds((days * MS_PER_DAY).round() as i64);
    let t = now
        .checked_sub_signed(offset)
        .ok_or_else(|| Error::InvalidInput(format!("age of {} days is out of range", days)))?;
    from_timestamp(t)
}

/// Parse a decimal snowflake string.
pub fn parse(id: &str) -> Result<u64> {
    id.trim()
        .parse::<u64>()
        .map_err(|_| Error::InvalidInput(format!("'{}' is not a valid snowflake", id)))
}
