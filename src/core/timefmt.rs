//! Absolute timestamps and their human-readable relative form
//!
//! Rules and audit entries are stored as UTC instants. Older state documents
//! carry free text instead ("Just now", "2 mins ago", or a local wall-clock
//! `YYYY-MM-DD HH:MM:SS`), which is normalized against the load time here.
//! The relative string shown to users is always computed at read time with
//! [`humanize`].

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

/// Wall-clock format older documents used for audit entries
pub const LEGACY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;

/// Parses relative free text into the age it describes.
///
/// Accepts "Just now", "now", "Recently" and `<n> <unit>[s] ago` where unit is
/// one of sec/second, min/minute, hr/hour, day, week. `n` may be "a"/"an".
///
/// ```
/// use panelguard::core::timefmt::parse_relative;
///
/// assert_eq!(parse_relative("2 mins ago").map(|d| d.num_seconds()), Some(120));
/// assert_eq!(parse_relative("Just now").map(|d| d.num_seconds()), Some(0));
/// assert!(parse_relative("yesterday-ish").is_none());
/// ```
pub fn parse_relative(text: &str) -> Option<Duration> {
    let lower = text.trim().to_ascii_lowercase();

    if matches!(lower.as_str(), "just now" | "now" | "recently") {
        return Some(Duration::zero());
    }

    let body = lower.strip_suffix("ago")?.trim_end();
    let mut parts = body.split_whitespace();
    let amount = parts.next()?;
    let unit = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let amount: i64 = match amount {
        "a" | "an" | "one" => 1,
        n => n.parse().ok()?,
    };
    if amount < 0 {
        return None;
    }

    let unit_secs = match unit.strip_suffix('s').unwrap_or(unit) {
        "sec" | "second" => 1,
        "min" | "minute" => MINUTE,
        "hr" | "hour" => HOUR,
        "day" => DAY,
        "week" => WEEK,
        _ => return None,
    };

    Duration::try_seconds(amount.checked_mul(unit_secs)?)
}

/// Parses any timestamp representation found in state documents.
///
/// Relative text is resolved against `now`.
pub fn parse_timestamp(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text.trim()) {
        return Some(parsed.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(text.trim(), LEGACY_FORMAT) {
        return Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc));
    }

    parse_relative(text).and_then(|age| now.checked_sub_signed(age))
}

/// Formats the age of `then` as seen from `now`, e.g. "5 mins ago".
///
/// Instants in the future (clock skew) read as "Just now".
pub fn humanize(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds();

    let (amount, unit) = if secs < MINUTE {
        return "Just now".to_string();
    } else if secs < HOUR {
        (secs / MINUTE, "min")
    } else if secs < DAY {
        (secs / HOUR, "hour")
    } else {
        (secs / DAY, "day")
    };

    if amount == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{amount} {unit}s ago")
    }
}

/// Serde adapter accepting RFC 3339, the legacy wall-clock format and relative text.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw, Utc::now())
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp '{raw}'")))
}
