//! Fallback date parsing for feed and registry adapters.
//!
//! Feeds in the wild emit a dozen shapes of RFC-2822 and ISO-8601
//! timestamps; this module tries each in turn rather than depending on a
//! general-purpose natural-language date parser.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

const FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S %z",  // RFC 2822 with numeric offset
    "%a, %d %b %Y %H:%M:%S GMT", // RFC 2822 with literal GMT
    "%Y-%m-%dT%H:%M:%S%z",       // ISO 8601 with offset
    "%Y-%m-%dT%H:%M:%SZ",        // ISO 8601 UTC
    "%Y-%m-%dT%H:%M:%S%.f%z",    // ISO 8601 with fractional seconds + offset
    "%Y-%m-%dT%H:%M:%S%.fZ",     // ISO 8601 with fractional seconds UTC
    "%d %b %Y %H:%M:%S",         // Day Month Year with time, no zone
    "%Y-%m-%d %H:%M:%S",         // SQL-ish timestamp
];

const DATE_ONLY_FORMATS: &[&str] = &["%Y-%m-%d", "%d %b %Y", "%d/%m/%Y", "%m/%d/%Y"];

/// Parse a feed/registry timestamp against the documented format ladder.
/// Returns `None` rather than erroring — callers skip the item and move
/// on; a malformed date on one item is a per-item parsing failure, not
/// a reason to abort the whole run.
pub fn parse_feed_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for fmt in FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in DATE_ONLY_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                return Some(Utc.from_utc_datetime(&dt));
            }
        }
    }
    // chrono's own RFC2822/RFC3339 parsers cover shapes the explicit
    // ladder above misses (e.g. non-padded days).
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}

/// Build a publication date from a DOI-registry `date-parts` array
/// (`[year]`, `[year, month]`, or `[year, month, day]`), defaulting
/// missing month/day to 1. Rejects years before 1900 or more than one
/// year in the future, since those are reliably registry data-entry
/// errors rather than real publication dates.
pub fn date_from_parts(parts: &[i32], now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let year = *parts.first()?;
    if year < 1900 || year > now.year() + 1 {
        return None;
    }
    let month = parts.get(1).copied().unwrap_or(1).clamp(1, 12) as u32;
    let day = parts.get(2).copied().unwrap_or(1).clamp(1, 31) as u32;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let dt = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&dt))
}

use chrono::Datelike;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc2822_with_offset() {
        let d = parse_feed_date("Mon, 12 Feb 2024 09:30:00 +0000").unwrap();
        assert_eq!(d.format("%Y-%m-%d").to_string(), "2024-02-12");
    }

    #[test]
    fn parses_iso8601_utc() {
        let d = parse_feed_date("2024-02-12T09:30:00Z").unwrap();
        assert_eq!(d.format("%Y-%m-%d").to_string(), "2024-02-12");
    }

    #[test]
    fn parses_date_only() {
        let d = parse_feed_date("2024-02-12").unwrap();
        assert_eq!(d.format("%Y-%m-%d").to_string(), "2024-02-12");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_feed_date("not a date").is_none());
    }

    #[test]
    fn date_parts_year_only_defaults() {
        let now = Utc::now();
        let d = date_from_parts(&[2022], now).unwrap();
        assert_eq!(d.format("%Y-%m-%d").to_string(), "2022-01-01");
    }

    #[test]
    fn date_parts_rejects_pre_1900() {
        let now = Utc::now();
        assert!(date_from_parts(&[1899], now).is_none());
    }

    #[test]
    fn date_parts_rejects_far_future() {
        let now = Utc::now();
        assert!(date_from_parts(&[now.year() + 2], now).is_none());
    }
}
