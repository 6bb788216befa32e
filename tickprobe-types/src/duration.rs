//! Nanosecond values and compact duration literals.
//!
//! Timestamps in line protocol are nanoseconds since the Unix epoch, so
//! nanoseconds are the canonical unit for both "now" snapshots and the
//! `1h30m`-style literals that get substituted into `now()` expressions.

use core::fmt;
use core::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

const NANOS_PER_SEC: i64 = 1_000_000_000;
const NANOS_PER_MIN: i64 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MIN;

/// Signed count of nanoseconds.
///
/// Used both as a point in time (nanoseconds since the Unix epoch) and as a
/// span. A signed 64-bit value covers roughly 292 years either side of the
/// epoch, which is what line protocol timestamps allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Nanoseconds(pub i64);

impl Nanoseconds {
    /// Create from nanoseconds.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Create from seconds.
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * NANOS_PER_SEC)
    }

    /// Get the value in nanoseconds.
    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Snapshot of the wall clock as nanoseconds since the Unix epoch.
    ///
    /// A clock set before 1970 reads as zero.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX))
    }

    /// Convert to a standard Duration. Negative values clamp to zero.
    pub fn to_duration(&self) -> Duration {
        Duration::from_nanos(self.0.max(0) as u64)
    }
}

impl From<Duration> for Nanoseconds {
    fn from(d: Duration) -> Self {
        Self(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for Nanoseconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from [`parse_duration_literal`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("empty duration literal")]
    Empty,

    #[error("missing unit after {digits:?} in duration literal {literal:?}")]
    MissingUnit { literal: String, digits: String },

    #[error("unknown unit {unit:?} in duration literal {literal:?}")]
    UnknownUnit { literal: String, unit: char },

    #[error("expected digits at offset {offset} in duration literal {literal:?}")]
    ExpectedDigits { literal: String, offset: usize },

    #[error("duration literal {0:?} does not fit in 64-bit nanoseconds")]
    Overflow(String),
}

/// Parse a compact duration literal such as `"30s"`, `"5m"` or `"1h30m"`.
///
/// Only hours (`h`), minutes (`m`) and seconds (`s`) are accepted, units are
/// case-sensitive, and every number needs a unit. Segments are summed, so
/// `"1h90m"` is two and a half hours.
pub fn parse_duration_literal(s: &str) -> Result<Nanoseconds, DurationError> {
    if s.is_empty() {
        return Err(DurationError::Empty);
    }

    let mut total: i64 = 0;
    let mut chars = s.char_indices().peekable();

    while let Some(&(start, _)) = chars.peek() {
        let mut end = start;
        while let Some(&(i, c)) = chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            end = i + c.len_utf8();
            chars.next();
        }

        if end == start {
            return Err(DurationError::ExpectedDigits {
                literal: s.to_string(),
                offset: start,
            });
        }
        let digits = &s[start..end];

        let unit = match chars.next() {
            Some((_, c)) => c,
            None => {
                return Err(DurationError::MissingUnit {
                    literal: s.to_string(),
                    digits: digits.to_string(),
                })
            }
        };
        let scale = match unit {
            'h' => NANOS_PER_HOUR,
            'm' => NANOS_PER_MIN,
            's' => NANOS_PER_SEC,
            other => {
                return Err(DurationError::UnknownUnit {
                    literal: s.to_string(),
                    unit: other,
                })
            }
        };

        let overflow = || DurationError::Overflow(s.to_string());
        let value: i64 = digits.parse().map_err(|_| overflow())?;
        let nanos = value.checked_mul(scale).ok_or_else(overflow)?;
        total = total.checked_add(nanos).ok_or_else(overflow)?;
    }

    Ok(Nanoseconds(total))
}
