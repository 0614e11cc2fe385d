//! Timestamp normalization for feed entries.
//!
//! Feeds publish dates in RFC 2822, RFC 3339 and a long tail of ad-hoc
//! formats, often with a zone abbreviation instead of a numeric offset.
//! Abbreviations are resolved through a fixed table before parsing so that
//! `JST` and `PST` land on the right instant.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use std::collections::HashMap;

use super::types::RawEntry;

const HOUR: i32 = 3600;

lazy_static! {
    /// Zone abbreviation -> offset east of UTC, in seconds.
    static ref TZ_OFFSETS: HashMap<&'static str, i32> = {
        let mut m = HashMap::new();
        for (abbr, offset) in [
            ("UTC", 0),
            ("UT", 0),
            ("GMT", 0),
            ("Z", 0),
            // North America; CST is US Central
            ("EST", -5 * HOUR),
            ("EDT", -4 * HOUR),
            ("CST", -6 * HOUR),
            ("CDT", -5 * HOUR),
            ("MST", -7 * HOUR),
            ("MDT", -6 * HOUR),
            ("PST", -8 * HOUR),
            ("PDT", -7 * HOUR),
            ("AKST", -9 * HOUR),
            ("AKDT", -8 * HOUR),
            ("HST", -10 * HOUR),
            // Europe
            ("WET", 0),
            ("WEST", HOUR),
            ("BST", HOUR),
            ("CET", HOUR),
            ("CEST", 2 * HOUR),
            ("EET", 2 * HOUR),
            ("EEST", 3 * HOUR),
            ("MSK", 3 * HOUR),
            // Asia / Pacific; IST is India
            ("IST", 5 * HOUR + 1800),
            ("SGT", 8 * HOUR),
            ("HKT", 8 * HOUR),
            ("AWST", 8 * HOUR),
            ("KST", 9 * HOUR),
            ("JST", 9 * HOUR),
            ("ACST", 9 * HOUR + 1800),
            ("AEST", 10 * HOUR),
            ("AEDT", 11 * HOUR),
            ("NZST", 12 * HOUR),
            ("NZDT", 13 * HOUR),
        ] {
            m.insert(abbr, offset);
        }
        m
    };
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M %z",
    "%a, %d %b %Y %H:%M:%S %z",
    "%a, %d %b %Y %H:%M %z",
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%a %b %d %H:%M:%S %z %Y",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%a, %d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%B %d, %Y", "%d %b %Y"];

/// Offset for a zone abbreviation, case-insensitive.
pub fn zone_offset_seconds(abbr: &str) -> Option<i32> {
    TZ_OFFSETS.get(abbr.to_ascii_uppercase().as_str()).copied()
}

fn format_offset(seconds: i32) -> String {
    let sign = if seconds < 0 { '-' } else { '+' };
    let abs = seconds.abs();
    format!("{}{:02}{:02}", sign, abs / HOUR, (abs % HOUR) / 60)
}

/// Swaps a trailing zone abbreviation for its numeric offset.
fn substitute_zone(input: &str) -> String {
    if let Some((head, last)) = input.rsplit_once(char::is_whitespace) {
        if last.chars().all(|c| c.is_ascii_alphabetic()) {
            if let Some(offset) = zone_offset_seconds(last) {
                return format!("{} {}", head.trim_end(), format_offset(offset));
            }
        }
    }
    input.to_string()
}

/// Parses a single timestamp string into UTC.
///
/// A leading day name that contradicts the date is ignored rather than
/// failing the whole timestamp.
pub fn parse_datetime(input: &str) -> Option<DateTime<Utc>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = substitute_zone(trimmed);
    parse_candidate(&candidate).or_else(|| strip_weekday(&candidate).and_then(parse_candidate))
}

/// `"Mon, 05 Mar 2024 ..."` -> `"05 Mar 2024 ..."`.
fn strip_weekday(s: &str) -> Option<&str> {
    let (day, rest) = s.split_once(',')?;
    let day = day.trim();
    (day.len() >= 3 && day.chars().all(|c| c.is_ascii_alphabetic())).then(|| rest.trim_start())
}

fn parse_candidate(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(s) {
        return Some(date.with_timezone(&Utc));
    }

    if let Ok(date) = DateTime::parse_from_rfc2822(s) {
        return Some(date.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(date) = DateTime::parse_from_str(s, format) {
            return Some(date.with_timezone(&Utc));
        }
    }

    // No zone information at all: assume UTC
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }

    None
}

/// First parseable of `published`, `updated`, `created`.
///
/// `None` means the caller should fall back to the ingestion instant.
pub fn resolve_published(entry: &RawEntry) -> Option<DateTime<Utc>> {
    [&entry.published, &entry.updated, &entry.created]
        .into_iter()
        .flatten()
        .find_map(|raw| parse_datetime(raw))
}
