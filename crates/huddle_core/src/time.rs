//! Time zone resolution, timestamp parsing and duration parsing.
//!
//! # Responsibility
//! - Resolve IANA zone names (empty name means the process-local zone).
//! - Parse timestamps as RFC3339, falling back to zone-relative wall-clock
//!   layouts.
//! - Parse compact durations such as `30m`, `1h30m` or `1.5h`.
//!
//! # Invariants
//! - Every parsed instant is returned in UTC.
//! - Wall-clock times inside a DST gap are rejected; ambiguous ones resolve
//!   to the earlier instant.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Wall-clock layouts tried after RFC3339, in order.
const FALLBACK_LAYOUTS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

static DURATION_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:\d+(?:\.\d*)?|\.\d+)(?:ns|us|µs|ms|s|m|h))+$")
        .expect("duration shape regex must compile")
});

static DURATION_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d*)?|\.\d+)(ns|us|µs|ms|s|m|h)")
        .expect("duration part regex must compile")
});

/// Time resolution failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// Zone name is not a known IANA zone.
    InvalidTimezone(String),
    /// Text matched neither RFC3339 nor any fallback layout.
    UnsupportedTimeFormat(String),
    /// Wall-clock time skipped by a DST transition in the zone.
    NonexistentLocalTime { text: String, zone: String },
    InvalidDuration(String),
}

impl Display for TimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTimezone(name) => write!(f, "invalid time zone `{name}`"),
            Self::UnsupportedTimeFormat(text) => write!(f, "unsupported time format: {text:?}"),
            Self::NonexistentLocalTime { text, zone } => {
                write!(f, "local time {text:?} does not exist in zone {zone}")
            }
            Self::InvalidDuration(text) => write!(f, "invalid duration {text:?}"),
        }
    }
}

impl Error for TimeError {}

/// Zone used to interpret wall-clock timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// The process-local zone.
    Local,
    Named(Tz),
}

impl Zone {
    pub fn name(&self) -> String {
        match self {
            Self::Local => "Local".to_string(),
            Self::Named(tz) => tz.name().to_string(),
        }
    }

    fn resolve_wall_clock(&self, naive: &NaiveDateTime) -> LocalResult<DateTime<Utc>> {
        match self {
            Self::Local => chrono::Local
                .from_local_datetime(naive)
                .map(|value| value.with_timezone(&Utc)),
            Self::Named(tz) => tz
                .from_local_datetime(naive)
                .map(|value| value.with_timezone(&Utc)),
        }
    }
}

/// Resolves a zone name. Empty (or `local`) yields [`Zone::Local`].
pub fn resolve_zone(name: &str) -> Result<Zone, TimeError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("local") {
        return Ok(Zone::Local);
    }
    trimmed
        .parse::<Tz>()
        .map(Zone::Named)
        .map_err(|_| TimeError::InvalidTimezone(trimmed.to_string()))
}

/// Parses `text` as RFC3339 or, failing that, as wall-clock time in `zone`.
pub fn parse_time(text: &str, zone: &Zone) -> Result<DateTime<Utc>, TimeError> {
    let trimmed = text.trim();
    if let Ok(value) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(value.with_timezone(&Utc));
    }

    for layout in FALLBACK_LAYOUTS {
        let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, layout) else {
            continue;
        };
        return match zone.resolve_wall_clock(&naive) {
            LocalResult::Single(value) => Ok(value),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest),
            LocalResult::None => Err(TimeError::NonexistentLocalTime {
                text: trimmed.to_string(),
                zone: zone.name(),
            }),
        };
    }

    Err(TimeError::UnsupportedTimeFormat(text.to_string()))
}

/// Parses a duration such as `45m`, `1h30m`, `90s` or `1.5h`.
///
/// A bare `0` is accepted. Signs are not.
pub fn parse_duration(text: &str) -> Result<Duration, TimeError> {
    let trimmed = text.trim();
    if trimmed == "0" {
        return Ok(Duration::zero());
    }
    if !DURATION_SHAPE.is_match(trimmed) {
        return Err(TimeError::InvalidDuration(text.to_string()));
    }

    let mut total_nanos = 0f64;
    for part in DURATION_PART.captures_iter(trimmed) {
        let amount: f64 = part[1]
            .parse()
            .map_err(|_| TimeError::InvalidDuration(text.to_string()))?;
        total_nanos += amount * unit_nanos(&part[2]);
    }
    if !total_nanos.is_finite() || total_nanos > i64::MAX as f64 {
        return Err(TimeError::InvalidDuration(text.to_string()));
    }

    Ok(Duration::nanoseconds(total_nanos.round() as i64))
}

fn unit_nanos(unit: &str) -> f64 {
    match unit {
        "ns" => 1.0,
        "us" | "µs" => 1_000.0,
        "ms" => 1_000_000.0,
        "s" => 1_000_000_000.0,
        "m" => 60_000_000_000.0,
        _ => 3_600_000_000_000.0,
    }
}

/// Renders a duration compactly (`1h30m`, `45m`, `90s`) for summaries.
pub fn format_duration(value: Duration) -> String {
    let total = value.num_seconds();
    if total == 0 {
        return "0s".to_string();
    }
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 {
        out.push_str(&format!("{seconds}s"));
    }
    out
}
