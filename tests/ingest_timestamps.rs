// tests/ingest_timestamps.rs
// Timestamp fallback chain, display-zone rendering around DST transitions,
// and latency as seen through an injected clock.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Mutex;

use osint_ingest::ingest::process_feed;
use osint_ingest::ingest::timestamp::{parse_timestamp, to_canonical_utc, to_local_display};
use osint_ingest::{
    Clock, DisplayZone, FeedEntry, IngestContext, ParsedFeed, RelevanceEngine, RunIdentitySet,
    SqliteEventStore, TimeStruct,
};

/// Advances one second on every read.
struct StepClock(Mutex<DateTime<Utc>>);

impl StepClock {
    fn starting_at(t: DateTime<Utc>) -> Self {
        Self(Mutex::new(t))
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        let mut t = self.0.lock().unwrap();
        let now = *t;
        *t = now + Duration::seconds(1);
        now
    }
}

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

fn entry(title: &str, link: &str) -> FeedEntry {
    FeedEntry {
        title: Some(title.into()),
        link: Some(link.into()),
        summary: Some("NATO and military observers monitor the truce.".into()),
        ..Default::default()
    }
}

#[test]
fn malformed_string_falls_through_to_struct() {
    let e = FeedEntry {
        published: Some("32 Foo 2024 99:99:99".into()),
        published_parsed: Some(TimeStruct {
            year: 2024,
            month: 5,
            day: 17,
            hour: 14,
            minute: 5,
            second: 9,
        }),
        ..Default::default()
    };
    let dt = parse_timestamp(&e).unwrap();
    assert_eq!(to_canonical_utc(dt), "2024-05-17T14:05:09Z");
}

#[test]
fn loose_rfc2822_strings_still_resolve() {
    // wrong weekday; unknown zone read as UTC; leap second skipped for the next field
    let wrong_day = FeedEntry {
        published: Some("Sat, 10 Mar 2024 06:59:59 GMT".into()),
        ..Default::default()
    };
    assert_eq!(parse_timestamp(&wrong_day), Some(utc(2024, 3, 10, 6, 59, 59)));

    let odd_zone = FeedEntry {
        updated: Some("Sun, 10 Mar 2024 06:59:59 CEST".into()),
        ..Default::default()
    };
    assert_eq!(parse_timestamp(&odd_zone), Some(utc(2024, 3, 10, 6, 59, 59)));

    let leap = FeedEntry {
        published: Some("Sun, 10 Mar 2024 06:59:60 +0000".into()),
        date: Some("Sun, 10 Mar 2024 07:00:00 +0000".into()),
        ..Default::default()
    };
    assert_eq!(parse_timestamp(&leap), Some(utc(2024, 3, 10, 7, 0, 0)));
}

#[test]
fn strings_win_over_structs() {
    let e = FeedEntry {
        date: Some("Fri, 17 May 2024 09:00:00 -0400".into()),
        published_parsed: Some(TimeStruct::from_datetime(utc(2020, 1, 1, 0, 0, 0))),
        ..Default::default()
    };
    assert_eq!(parse_timestamp(&e), Some(utc(2024, 5, 17, 13, 0, 0)));
}

#[test]
fn struct_order_is_published_updated_created_expired_date() {
    let e = FeedEntry {
        date_parsed: Some(TimeStruct::from_datetime(utc(2024, 1, 5, 0, 0, 0))),
        expired_parsed: Some(TimeStruct::from_datetime(utc(2024, 1, 4, 0, 0, 0))),
        created_parsed: Some(TimeStruct::from_datetime(utc(2024, 1, 3, 0, 0, 0))),
        ..Default::default()
    };
    assert_eq!(parse_timestamp(&e), Some(utc(2024, 1, 3, 0, 0, 0)));
}

#[test]
fn invalid_struct_components_are_skipped() {
    let e = FeedEntry {
        published_parsed: Some(TimeStruct {
            year: 2024,
            month: 2,
            day: 30,
            hour: 0,
            minute: 0,
            second: 0,
        }),
        updated_parsed: Some(TimeStruct::from_datetime(utc(2024, 3, 1, 12, 0, 0))),
        ..Default::default()
    };
    assert_eq!(parse_timestamp(&e), Some(utc(2024, 3, 1, 12, 0, 0)));
    assert_eq!(parse_timestamp(&FeedEntry::default()), None);
}

#[test]
fn new_york_spring_forward_boundary() {
    let ny = DisplayZone::resolve("America/New_York");
    assert_eq!(
        to_local_display(utc(2024, 3, 10, 6, 59, 59), &ny),
        "2024-03-10T01:59:59-05:00"
    );
    assert_eq!(
        to_local_display(utc(2024, 3, 10, 7, 0, 0), &ny),
        "2024-03-10T03:00:00-04:00"
    );
}

#[test]
fn new_york_fall_back_boundary() {
    let ny = DisplayZone::resolve("America/New_York");
    assert_eq!(
        to_local_display(utc(2024, 11, 3, 5, 59, 59), &ny),
        "2024-11-03T01:59:59-04:00"
    );
    assert_eq!(
        to_local_display(utc(2024, 11, 3, 6, 0, 0), &ny),
        "2024-11-03T01:00:00-05:00"
    );
}

#[test]
fn canonical_utc_always_ends_in_z() {
    for dt in [utc(1999, 12, 31, 23, 59, 59), utc(2024, 3, 10, 7, 0, 0)] {
        let s = to_canonical_utc(dt);
        assert!(s.ends_with('Z'), "{s}");
        assert!(!s.contains("+00:00"));
    }
}

#[tokio::test]
async fn latency_follows_injected_clock() {
    let engine = RelevanceEngine::builtin().unwrap();
    let zone = DisplayZone::resolve("America/New_York");
    let store = SqliteEventStore::in_memory().await.unwrap();
    let clock = StepClock::starting_at(utc(2024, 1, 15, 10, 31, 40));
    let ctx = IngestContext {
        engine: &engine,
        zone: &zone,
        clock: &clock,
        store: &store,
    };

    let mut backdated = entry("Truce talks resume", "https://wire.test/1");
    backdated.published = Some("Mon, 15 Jan 2024 10:30:00 +0000".into());

    // published after ingestion: latency stays negative
    let mut future = entry("Truce talks stall", "https://wire.test/2");
    future.published = Some("Mon, 15 Jan 2024 10:35:00 +0000".into());

    let mut undated = entry("Truce talks adjourn", "https://wire.test/3");
    undated.published = Some("soon".into());

    let feed = ParsedFeed {
        title: Some("Wire".into()),
        entries: vec![backdated, future, undated],
    };

    let mut seen = RunIdentitySet::new();
    let events = process_feed(&ctx, &feed, "https://wire.test/rss", &mut seen).await;
    assert_eq!(events.len(), 3);

    // one clock read per dated entry, two for the undated one
    assert_eq!(events[0].ingested_utc, "2024-01-15T10:31:40Z");
    assert_eq!(events[0].latency_sec, 100);

    assert_eq!(events[1].ingested_utc, "2024-01-15T10:31:41Z");
    assert_eq!(events[1].latency_sec, -199);

    assert_eq!(events[2].published_utc, "2024-01-15T10:31:42Z");
    assert_eq!(events[2].ingested_utc, "2024-01-15T10:31:43Z");
    assert_eq!(events[2].latency_sec, 1);

    assert_eq!(seen.len(), 3);
}
