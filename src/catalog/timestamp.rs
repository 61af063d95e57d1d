//! Timestamp patterns tried, in order, when ingesting raw events.
//!
//! A pattern is either one of the keywords [`RFC3339`], [`EPOCH_MILLIS`],
//! [`EPOCH_SECONDS`], or a `time` format description such as
//! `[year]-[month]-[day] [hour]:[minute]:[second]`. Descriptions without an
//! offset component are interpreted as UTC; date-only descriptions resolve to
//! midnight UTC.

use time::format_description::{self, well_known::Rfc3339};
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::types::{RegistryError, Result};

/// RFC 3339 timestamps, e.g. `2024-05-01T12:00:00Z`.
pub const RFC3339: &str = "rfc3339";
/// Integer milliseconds since the Unix epoch.
pub const EPOCH_MILLIS: &str = "epoch_millis";
/// Integer seconds since the Unix epoch.
pub const EPOCH_SECONDS: &str = "epoch_seconds";

/// Rejects patterns that can never parse anything.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.trim().is_empty() {
        return Err(RegistryError::invalid("timestamp pattern must not be empty"));
    }
    match pattern {
        RFC3339 | EPOCH_MILLIS | EPOCH_SECONDS => Ok(()),
        _ => format_description::parse(pattern).map(|_| ()).map_err(|err| {
            RegistryError::invalid(format!("timestamp pattern '{pattern}' is malformed: {err}"))
        }),
    }
}

/// Parses `raw` with a single pattern.
pub fn parse_with(pattern: &str, raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    match pattern {
        RFC3339 => OffsetDateTime::parse(raw, &Rfc3339).ok(),
        EPOCH_MILLIS => {
            let millis: i128 = raw.parse().ok()?;
            OffsetDateTime::from_unix_timestamp_nanos(millis.checked_mul(1_000_000)?).ok()
        }
        EPOCH_SECONDS => OffsetDateTime::from_unix_timestamp(raw.parse().ok()?).ok(),
        _ => {
            let items = format_description::parse(pattern).ok()?;
            let items = items.as_slice();
            OffsetDateTime::parse(raw, items)
                .ok()
                .or_else(|| {
                    PrimitiveDateTime::parse(raw, items)
                        .ok()
                        .map(PrimitiveDateTime::assume_utc)
                })
                .or_else(|| {
                    Date::parse(raw, items)
                        .ok()
                        .map(|date| date.midnight().assume_utc())
                })
        }
    }
}

/// Tries each pattern in order and returns the first successful parse.
pub fn parse_first<'a, I>(patterns: I, raw: &str) -> Option<OffsetDateTime>
where
    I: IntoIterator<Item = &'a String>,
{
    patterns
        .into_iter()
        .find_map(|pattern| parse_with(pattern, raw))
}
