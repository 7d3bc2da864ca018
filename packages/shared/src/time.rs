//! Time-related utilities with clock abstraction for testability.
//!
//! The broker stamps messages either with an RFC 3339 string or with an
//! offset-less local date-time (`2024-05-01T12:30:00.123`). Offset-less
//! values are interpreted in the broker's zone, UTC+9.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};

/// Offset of the broker's local time (UTC+9), in seconds.
const BROKER_OFFSET_SECS: i32 = 9 * 3600;

/// Clock trait for dependency injection and testing
pub trait Clock: Send + Sync {
    /// Current time in the broker's zone
    fn now(&self) -> DateTime<FixedOffset>;
}

/// System clock implementation (uses actual system time)
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&broker_offset())
    }
}

/// Fixed clock implementation for testing (returns a fixed time)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    fixed_time: DateTime<FixedOffset>,
}

impl FixedClock {
    /// Create a new fixed clock from a Unix timestamp in milliseconds
    pub fn from_millis(fixed_time_millis: i64) -> Self {
        let fixed_time = broker_offset()
            .timestamp_millis_opt(fixed_time_millis)
            .single()
            .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH.with_timezone(&broker_offset()));
        Self { fixed_time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.fixed_time
    }
}

/// The broker's fixed UTC+9 offset.
pub fn broker_offset() -> FixedOffset {
    FixedOffset::east_opt(BROKER_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Parse a broker timestamp.
///
/// Accepts RFC 3339 (`2024-05-01T12:30:00+09:00`) and the offset-less
/// forms with or without fractional seconds. Returns `None` for anything else.
pub fn parse_broker_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .ok()?;
    broker_offset().from_local_datetime(&naive).single()
}

/// Render a date-time as RFC 3339 in the broker's zone
pub fn to_broker_rfc3339(dt: DateTime<FixedOffset>) -> String {
    dt.with_timezone(&broker_offset()).to_rfc3339()
}
