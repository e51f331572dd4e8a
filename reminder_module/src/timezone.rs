//! Wall-clock arithmetic for per-user timezones.
//!
//! Users carry a whole-hour UTC offset instead of a named zone; the offset
//! is derived once from a self-reported local time and applied on every
//! scheduler tick.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};

pub const MIN_UTC_OFFSET_HOURS: i64 = -12;
pub const MAX_UTC_OFFSET_HOURS: i64 = 14;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimezoneError {
    #[error("invalid time format (expected HH:MM): {0}")]
    InvalidFormat(String),
    #[error("time out of range: {0}")]
    OutOfRange(String),
}

/// Resolve a user's local wall-clock time from a UTC instant and a
/// whole-hour UTC offset. Unset or out-of-range offsets resolve as UTC so a
/// bad profile value can never block delivery.
pub fn local_time(reference: DateTime<Utc>, utc_offset_hours: Option<i64>) -> NaiveDateTime {
    let offset = utc_offset_hours
        .filter(|value| (MIN_UTC_OFFSET_HOURS..=MAX_UTC_OFFSET_HOURS).contains(value))
        .unwrap_or(0);
    (reference + chrono::Duration::hours(offset)).naive_utc()
}

/// Derive a whole-hour UTC offset from the user's self-reported local time.
///
/// The difference is taken at minute granularity, wrapped across the day
/// boundary (a reported time more than 12 hours ahead means the user is
/// actually behind, on the previous day), rounded to whole hours and clamped
/// to the valid offset range.
pub fn offset_from_wall_clock(
    user_time: &str,
    now: DateTime<Utc>,
) -> Result<i64, TimezoneError> {
    let (user_hours, user_minutes) = parse_hhmm(user_time)?;
    let user_total = user_hours * 60 + user_minutes;
    let utc_total = i64::from(now.hour()) * 60 + i64::from(now.minute());

    let mut diff = user_total - utc_total;
    if diff > 12 * 60 {
        diff -= 24 * 60;
    } else if diff < -12 * 60 {
        diff += 24 * 60;
    }

    let offset = (diff as f64 / 60.0).round() as i64;
    Ok(offset.clamp(MIN_UTC_OFFSET_HOURS, MAX_UTC_OFFSET_HOURS))
}

pub fn validate_hhmm(value: &str) -> bool {
    parse_hhmm(value).is_ok()
}

/// Format a stored offset for display ("UTC+3", "UTC-5").
pub fn format_offset(utc_offset_hours: i64) -> String {
    if utc_offset_hours >= 0 {
        format!("UTC+{}", utc_offset_hours)
    } else {
        format!("UTC{}", utc_offset_hours)
    }
}

fn parse_hhmm(value: &str) -> Result<(i64, i64), TimezoneError> {
    let trimmed = value.trim();
    let (hours_raw, minutes_raw) = trimmed
        .split_once(':')
        .ok_or_else(|| TimezoneError::InvalidFormat(trimmed.to_string()))?;
    let hours: i64 = hours_raw
        .parse()
        .map_err(|_| TimezoneError::InvalidFormat(trimmed.to_string()))?;
    let minutes: i64 = minutes_raw
        .parse()
        .map_err(|_| TimezoneError::InvalidFormat(trimmed.to_string()))?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return Err(TimezoneError::OutOfRange(trimmed.to_string()));
    }
    Ok((hours, minutes))
}
