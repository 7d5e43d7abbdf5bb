// src/ingest/timestamp.rs
//! Timestamp normalization: reconcile the date encodings feeds use into one
//! UTC instant, and render it in canonical UTC and local display forms.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::ingest::types::{FeedEntry, TimeStruct};

pub const DEFAULT_DISPLAY_TIMEZONE: &str = "America/New_York";

/// Offset used when the display zone name cannot be resolved (EST, no DST).
const FALLBACK_OFFSET_SECS: i32 = -5 * 3600;

// RFC 2822 shapes (weekday already removed) without a zone; read as UTC.
const ZONELESS_FORMATS: &[&str] = &["%d %b %Y %H:%M:%S", "%d %b %Y %H:%M"];

/// Source of "now". The assembly layer reads wall-clock time only through this.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Parse an RFC 2822/822 date. A missing or unrecognised zone is read as UTC.
///
/// The leading weekday is ignored, so a day name that does not match the
/// date still parses. Leap seconds (`:60`) are rejected.
pub fn parse_rfc2822(raw: &str) -> Option<DateTime<Utc>> {
    let s = strip_weekday(raw.trim());
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return without_leap_second(dt.with_timezone(&Utc));
    }
    let body = strip_unknown_zone(s);
    ZONELESS_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(body, fmt).ok())
        .and_then(|naive| without_leap_second(naive.and_utc()))
}

/// `"Tue, 15 Jan 2024 ..."` -> `"15 Jan 2024 ..."`.
fn strip_weekday(s: &str) -> &str {
    match s.split_once(',') {
        Some((day, rest)) if !day.is_empty() && day.chars().all(|c| c.is_ascii_alphabetic()) => {
            rest.trim_start()
        }
        _ => s,
    }
}

/// Drop a trailing alphabetic zone name (`CEST`, `AEDT`) chrono does not know.
fn strip_unknown_zone(s: &str) -> &str {
    match s.rsplit_once(char::is_whitespace) {
        Some((head, zone)) if zone.chars().all(|c| c.is_ascii_alphabetic()) => head.trim_end(),
        _ => s,
    }
}

/// chrono represents `:60` as a leap second; feeds never mean one.
pub(crate) fn without_leap_second(dt: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (dt.nanosecond() < 1_000_000_000).then_some(dt)
}

/// Resolve the source instant of an entry, or `None` if nothing parses.
///
/// Order: the string fields `published`, `updated`, `dc:date`, `date` as
/// RFC 2822; then the pre-parsed structs `published`, `updated`, `created`,
/// `expired`, `date` read as UTC. First success wins.
pub fn parse_timestamp(entry: &FeedEntry) -> Option<DateTime<Utc>> {
    let strings = [
        entry.published.as_deref(),
        entry.updated.as_deref(),
        entry.dc_date.as_deref(),
        entry.date.as_deref(),
    ];
    if let Some(dt) = strings.into_iter().flatten().find_map(parse_rfc2822) {
        return Some(dt);
    }

    let structs: [Option<TimeStruct>; 5] = [
        entry.published_parsed,
        entry.updated_parsed,
        entry.created_parsed,
        entry.expired_parsed,
        entry.date_parsed,
    ];
    structs.into_iter().flatten().find_map(TimeStruct::to_utc)
}

/// Second-precision ISO-8601 with a literal `Z`.
pub fn to_canonical_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Fixed display timezone, resolved once at start-up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayZone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl DisplayZone {
    /// Look up an IANA zone name; unknown names fall back to a fixed UTC-5.
    pub fn resolve(name: &str) -> Self {
        match name.trim().parse::<Tz>() {
            Ok(tz) => Self::Named(tz),
            Err(_) => {
                tracing::warn!(
                    target: "ingest",
                    zone = name,
                    "display timezone not found, using fixed UTC-05:00"
                );
                Self::fallback()
            }
        }
    }

    pub fn fallback() -> Self {
        match FixedOffset::east_opt(FALLBACK_OFFSET_SECS) {
            Some(off) => Self::Fixed(off),
            None => Self::Named(Tz::UTC),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }

    /// Second-precision ISO-8601 in this zone, with its offset for that instant.
    pub fn render(&self, dt: DateTime<Utc>) -> String {
        const FMT: &str = "%Y-%m-%dT%H:%M:%S%:z";
        match self {
            Self::Named(tz) => dt.with_timezone(tz).format(FMT).to_string(),
            Self::Fixed(off) => dt.with_timezone(off).format(FMT).to_string(),
        }
    }
}

impl Default for DisplayZone {
    fn default() -> Self {
        Self::resolve(DEFAULT_DISPLAY_TIMEZONE)
    }
}

pub fn to_local_display(dt: DateTime<Utc>, zone: &DisplayZone) -> String {
    zone.render(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rfc2822_with_named_zone() {
        let dt = parse_rfc2822("Tue, 10 Jun 2003 04:00:00 GMT").unwrap();
        assert_eq!(to_canonical_utc(dt), "2003-06-10T04:00:00Z");
    }

    #[test]
    fn rfc2822_with_numeric_offset_is_converted() {
        let dt = parse_rfc2822("Mon, 15 Jan 2024 10:30:00 +0200").unwrap();
        assert_eq!(to_canonical_utc(dt), "2024-01-15T08:30:00Z");
    }

    #[test]
    fn zoneless_date_is_utc() {
        let dt = parse_rfc2822("Mon, 15 Jan 2024 10:30:00").unwrap();
        assert_eq!(to_canonical_utc(dt), "2024-01-15T10:30:00Z");
    }

    #[test]
    fn mismatched_weekday_is_ignored() {
        // 15 Jan 2024 was a Monday
        let dt = parse_rfc2822("Tue, 15 Jan 2024 10:30:00 +0000").unwrap();
        assert_eq!(to_canonical_utc(dt), "2024-01-15T10:30:00Z");
        let dt = parse_rfc2822("Fri, 15 Jan 2024 10:30:00").unwrap();
        assert_eq!(to_canonical_utc(dt), "2024-01-15T10:30:00Z");
    }

    #[test]
    fn unknown_zone_abbreviation_is_utc() {
        let dt = parse_rfc2822("Mon, 15 Jan 2024 10:30:00 CEST").unwrap();
        assert_eq!(to_canonical_utc(dt), "2024-01-15T10:30:00Z");
        let dt = parse_rfc2822("15 Jan 2024 10:30 AEDT").unwrap();
        assert_eq!(to_canonical_utc(dt), "2024-01-15T10:30:00Z");
        // known names keep their offset
        let dt = parse_rfc2822("Mon, 15 Jan 2024 10:30:00 EST").unwrap();
        assert_eq!(to_canonical_utc(dt), "2024-01-15T15:30:00Z");
    }

    #[test]
    fn leap_second_is_rejected() {
        assert!(parse_rfc2822("Mon, 15 Jan 2024 10:30:60 +0000").is_none());
        assert!(parse_rfc2822("15 Jan 2024 10:30:60").is_none());
    }

    #[test]
    fn garbage_and_empty_do_not_parse() {
        assert!(parse_rfc2822("").is_none());
        assert!(parse_rfc2822("   ").is_none());
        assert!(parse_rfc2822("yesterday-ish").is_none());
    }

    #[test]
    fn later_string_field_used_when_earlier_fails() {
        let e = FeedEntry {
            published: Some("not a date".into()),
            updated: Some("Wed, 01 May 2024 12:00:00 +0000".into()),
            ..Default::default()
        };
        let dt = parse_timestamp(&e).unwrap();
        assert_eq!(to_canonical_utc(dt), "2024-05-01T12:00:00Z");
    }

    #[test]
    fn fixed_fallback_has_no_dst() {
        let z = DisplayZone::fallback();
        assert!(z.is_fallback());
        let summer = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        assert_eq!(z.render(summer), "2024-07-01T07:00:00-05:00");
    }

    #[test]
    fn unknown_zone_name_falls_back() {
        assert!(DisplayZone::resolve("Mars/Olympus_Mons").is_fallback());
        assert!(!DisplayZone::resolve("America/New_York").is_fallback());
    }
}
