//! Canonicalization of identifiers that arrive from the voice platform:
//! phone numbers and ISO-8601 timestamps.
//!
//! Everything here is pure. Callers decide whether a `None`/`Err` is fatal
//! (synchronous tool and booking requests) or ignorable (webhook enrichment).

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;

static NON_PHONE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9+]").expect("phone cleanup pattern must compile"));

/// Placeholder values the voice model emits when it has no number to give.
const PHONE_PLACEHOLDERS: &[&str] = &["unknown", "none", ""];

/// Normalize a phone number towards E.164.
///
/// This is a heuristic tuned for UK-first traffic, not a validated E.164
/// parse. Numbers that match none of the known shapes still get a leading
/// `+` and a warning is logged so odd inputs show up in observability.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if PHONE_PLACEHOLDERS
        .iter()
        .any(|placeholder| trimmed.eq_ignore_ascii_case(placeholder))
    {
        return None;
    }

    let cleaned = NON_PHONE_CHARS.replace_all(trimmed, "").into_owned();
    if cleaned.is_empty() {
        return None;
    }

    if cleaned.starts_with('+') {
        return Some(cleaned);
    }

    // UK heuristics
    if let Some(rest) = cleaned.strip_prefix('0') {
        return Some(format!("+44{rest}"));
    }
    if cleaned.starts_with("44") {
        return Some(format!("+{cleaned}"));
    }
    if (10..=11).contains(&cleaned.len()) && cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return Some(format!("+44{cleaned}"));
    }

    // North American numbers
    if cleaned.starts_with('1') {
        return Some(format!("+{cleaned}"));
    }

    tracing::warn!(
        raw = raw,
        cleaned = %cleaned,
        "phone number matched no known format, forcing leading '+'"
    );
    Some(format!("+{cleaned}"))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid ISO-8601 timestamp")]
pub struct InvalidTimestamp(pub String);

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 timestamp into UTC.
///
/// A literal `Z` suffix is read as `+00:00`. Datetimes without an offset,
/// and bare dates (as midnight), are taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, InvalidTimestamp> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InvalidTimestamp(raw.to_string()));
    }

    let candidate = match trimmed
        .strip_suffix('Z')
        .or_else(|| trimmed.strip_suffix('z'))
    {
        Some(rest) => format!("{rest}+00:00"),
        None => trimmed.to_string(),
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&candidate) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(&candidate, format) {
            return Ok(parsed.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(&candidate, format) {
            return Ok(parsed.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&candidate, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    Err(InvalidTimestamp(raw.to_string()))
}

/// Parse an optional timestamp, ignoring absent, empty and malformed values.
///
/// Used for webhook payloads where enrichment is best-effort.
pub fn parse_timestamp_lenient(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|value| parse_timestamp(value).ok())
}

/// Render a timestamp the way the calendar provider expects: UTC, trailing `Z`,
/// fractional seconds only when present.
pub fn render_utc_z(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
