// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Broken-down UTC time as pre-parsed by the feed reader
/// (year, month, day, hour, minute, second).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeStruct {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl TimeStruct {
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        use chrono::{Datelike, Timelike};
        Self {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
        }
    }

    /// Interpret the components as UTC. Out-of-range components yield `None`.
    pub fn to_utc(self) -> Option<DateTime<Utc>> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?
            .and_hms_opt(self.hour, self.minute, self.second)
            .map(|naive| naive.and_utc())
    }
}

/// One raw item from a parsed feed. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,

    // raw date strings, in the order they are tried
    pub published: Option<String>,
    pub updated: Option<String>,
    pub dc_date: Option<String>,
    pub date: Option<String>,

    // pre-parsed variants
    pub published_parsed: Option<TimeStruct>,
    pub updated_parsed: Option<TimeStruct>,
    pub created_parsed: Option<TimeStruct>,
    pub expired_parsed: Option<TimeStruct>,
    pub date_parsed: Option<TimeStruct>,
}

impl FeedEntry {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    pub fn link(&self) -> &str {
        self.link.as_deref().unwrap_or_default()
    }

    /// `summary`, or `description` when the summary is missing or empty.
    pub fn summary_or_description(&self) -> &str {
        match self.summary.as_deref() {
            Some(s) if !s.is_empty() => s,
            _ => self.description.as_deref().unwrap_or_default(),
        }
    }
}

/// A fetched feed: optional channel title plus entries in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<FeedEntry>,
}

/// Canonical accepted record. Field names are the JSON/DB column names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub title: String,
    pub link: String,
    pub published_utc: String,
    pub published_local: String,
    pub ingested_utc: String,
    pub latency_sec: i64,
    pub summary: String,
    pub source: String,
}

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ParsedFeed>;
    fn name(&self) -> &'static str;
}
