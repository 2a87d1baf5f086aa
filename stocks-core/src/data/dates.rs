//! Date expression resolution.
//!
//! Accepted forms:
//! - `now`
//! - relative `<sign><n><unit>` where sign is `_` (past) or `+` (future) and
//!   unit is `d` (days), `m` (30-day months) or `y` (365-day years)
//! - absolute `YYYY-MM-DD`, read as midnight US/Eastern
//!
//! All instants are anchored to US/Eastern. The fetcher works on the UTC
//! calendar dates of the resolved instants, as a closed-open [`DateRange`].

use super::provider::DataError;
use crate::domain::REFERENCE_TZ;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Current wall-clock instant in the reference zone.
pub fn now() -> DateTime<Tz> {
    Utc::now().with_timezone(&REFERENCE_TZ)
}

/// Resolve `expr` against the wall clock.
pub fn resolve_now(expr: &str) -> Result<DateTime<Tz>, DataError> {
    resolve(expr, now())
}

/// Resolve a date expression relative to `now`.
pub fn resolve(expr: &str, now: DateTime<Tz>) -> Result<DateTime<Tz>, DataError> {
    if expr == "now" {
        return Ok(now);
    }
    if let Some(body) = expr.strip_prefix('_') {
        return shift(expr, body, -1, now);
    }
    if let Some(body) = expr.strip_prefix('+') {
        return shift(expr, body, 1, now);
    }
    absolute(expr)
}

fn invalid(expr: &str, reason: impl Into<String>) -> DataError {
    DataError::InvalidDateExpression {
        expr: expr.to_string(),
        reason: reason.into(),
    }
}

fn shift(expr: &str, body: &str, sign: i64, now: DateTime<Tz>) -> Result<DateTime<Tz>, DataError> {
    let mut chars = body.chars();
    let unit = chars
        .next_back()
        .ok_or_else(|| invalid(expr, "missing value and unit"))?;
    let value_part = chars.as_str();

    if value_part.is_empty() || !value_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(expr, format!("relative value '{value_part}' is not an integer")));
    }
    let value: i64 = value_part
        .parse()
        .map_err(|e| invalid(expr, format!("relative value '{value_part}': {e}")))?;

    let unit_days = match unit {
        'd' => 1,
        'm' => 30,
        'y' => 365,
        other => return Err(invalid(expr, format!("unknown relative unit '{other}'"))),
    };

    let delta = value
        .checked_mul(unit_days)
        .and_then(|days| days.checked_mul(sign))
        .and_then(Duration::try_days)
        .ok_or_else(|| invalid(expr, "offset out of range"))?;

    now.checked_add_signed(delta)
        .ok_or_else(|| invalid(expr, "offset out of range"))
}

fn absolute(expr: &str) -> Result<DateTime<Tz>, DataError> {
    // Strict shape check: chrono alone would also accept unpadded fields.
    let bytes = expr.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shaped {
        return Err(invalid(expr, "expected now, _Nd/+Nd style offset, or YYYY-MM-DD"));
    }

    let date = NaiveDate::parse_from_str(expr, "%Y-%m-%d")
        .map_err(|e| invalid(expr, e.to_string()))?;
    REFERENCE_TZ
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .ok_or_else(|| invalid(expr, "midnight does not exist in US/Eastern"))
}

/// Closed-open calendar range `[start, end)` requested from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DataError> {
        if start >= end {
            return Err(DataError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Range between two resolved instants, using their UTC calendar dates.
    pub fn from_instants(start: &DateTime<Tz>, end: &DateTime<Tz>) -> Result<Self, DataError> {
        Self::new(
            start.with_timezone(&Utc).date_naive(),
            end.with_timezone(&Utc).date_naive(),
        )
    }

    /// Epoch seconds of UTC midnight at the start and end dates.
    pub fn epoch_bounds(&self) -> (i64, i64) {
        (
            self.start.and_time(NaiveTime::MIN).and_utc().timestamp(),
            self.end.and_time(NaiveTime::MIN).and_utc().timestamp(),
        )
    }
}
