// src/ingest/mod.rs
pub mod config;
pub mod providers;
pub mod timestamp;
pub mod types;

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::ingest::timestamp::{parse_timestamp, to_canonical_utc, Clock, DisplayZone};
use crate::ingest::types::{Event, FeedSource, ParsedFeed};
use crate::relevance::RelevanceEngine;
use crate::storage::EventStore;

/// Remove `<...>` tags and trim. Entities are left as the feed delivered them.
pub fn strip_markup(s: &str) -> String {
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?s)<[^>]*>").unwrap());
    re_tags.replace_all(s, "").trim().to_string()
}

/// Host part of a feed URL, lowercased; empty when the URL does not parse.
pub fn source_host(feed_url: &str) -> String {
    url::Url::parse(feed_url.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .unwrap_or_default()
}

/// `(lower(title), lower(link))` pairs seen during one run, across all feeds.
#[derive(Debug, Default)]
pub struct RunIdentitySet {
    seen: HashSet<(String, String)>,
}

impl RunIdentitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the pair was already present.
    pub fn insert(&mut self, title: &str, link: &str) -> bool {
        self.seen.insert((title.to_lowercase(), link.to_lowercase()))
    }

    pub fn contains(&self, title: &str, link: &str) -> bool {
        self.seen
            .contains(&(title.to_lowercase(), link.to_lowercase()))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Read-only collaborators shared by every feed in a run.
pub struct IngestContext<'a> {
    pub engine: &'a RelevanceEngine,
    pub zone: &'a DisplayZone,
    pub clock: &'a dyn Clock,
    pub store: &'a dyn EventStore,
}

/// Classify, normalize and dedup one feed's entries, persisting each accepted
/// event. Events are returned whether or not storage kept them.
pub async fn process_feed(
    ctx: &IngestContext<'_>,
    feed: &ParsedFeed,
    feed_url: &str,
    seen: &mut RunIdentitySet,
) -> Vec<Event> {
    let host = source_host(feed_url);
    let source = match feed.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => host.clone(),
    };

    let mut out = Vec::new();
    let (mut irrelevant, mut malformed, mut duplicate) = (0usize, 0usize, 0usize);
    let (mut inserted, mut already_stored, mut store_errors) = (0usize, 0usize, 0usize);

    for entry in &feed.entries {
        if !ctx.engine.is_relevant(entry, &host) {
            irrelevant += 1;
            continue;
        }

        let title = entry.title().trim();
        let link = entry.link().trim();
        if title.is_empty() || link.is_empty() {
            malformed += 1;
            continue;
        }

        if !seen.insert(title, link) {
            duplicate += 1;
            continue;
        }

        // Unparsable dates take "now", so their latency reads as ~0.
        let source_at = parse_timestamp(entry).unwrap_or_else(|| {
            debug!(target: "ingest", link, "no parsable timestamp, using now");
            ctx.clock.now()
        });
        let ingested_at = ctx.clock.now();

        let event = Event {
            title: title.to_string(),
            link: link.to_string(),
            published_utc: to_canonical_utc(source_at),
            published_local: ctx.zone.render(source_at),
            ingested_utc: to_canonical_utc(ingested_at),
            latency_sec: (ingested_at - source_at).num_seconds(),
            summary: strip_markup(entry.summary_or_description()),
            source: source.clone(),
        };

        match ctx.store.insert_if_absent(&event).await {
            Ok(true) => inserted += 1,
            Ok(false) => already_stored += 1,
            Err(e) => {
                store_errors += 1;
                warn!(target: "ingest", error = ?e, link = %event.link, "storage insert failed");
            }
        }

        out.push(event);
    }

    info!(
        target: "ingest",
        feed = feed_url,
        entries = feed.entries.len(),
        accepted = out.len(),
        irrelevant,
        malformed,
        duplicate,
        inserted,
        already_stored,
        store_errors,
        "feed processed"
    );

    out
}

/// Outcome for one feed URL.
#[derive(Debug, Clone, Default)]
pub struct FeedReport {
    pub url: String,
    pub entries: usize,
    pub events: Vec<Event>,
    pub error: Option<String>,
}

impl FeedReport {
    pub fn accepted(&self) -> usize {
        self.events.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub feeds: Vec<FeedReport>,
}

impl RunSummary {
    /// All accepted events in feed order.
    pub fn events(&self) -> Vec<Event> {
        self.feeds.iter().flat_map(|f| f.events.clone()).collect()
    }

    /// At most `per_feed` events from each feed, in feed order.
    pub fn sample(&self, per_feed: usize) -> Vec<Event> {
        self.feeds
            .iter()
            .flat_map(|f| f.events.iter().take(per_feed).cloned())
            .collect()
    }

    pub fn total_accepted(&self) -> usize {
        self.feeds.iter().map(FeedReport::accepted).sum()
    }

    pub fn feeds_processed(&self) -> usize {
        self.feeds.len()
    }

    /// True when at least one feed was attempted and none could be fetched.
    pub fn all_failed(&self) -> bool {
        !self.feeds.is_empty() && self.feeds.iter().all(|f| f.error.is_some())
    }
}

/// Run the pipeline once over `urls`, sequentially, sharing one identity set.
/// Fails only when storage cannot be initialised.
pub async fn run_once(
    ctx: &IngestContext<'_>,
    source: &dyn FeedSource,
    urls: &[String],
) -> Result<RunSummary> {
    ctx.store
        .ensure_schema()
        .await
        .context("initialising event storage")?;

    let mut seen = RunIdentitySet::new();
    let mut summary = RunSummary::default();

    for url in urls {
        match source.fetch(url).await {
            Ok(feed) => {
                let events = process_feed(ctx, &feed, url, &mut seen).await;
                summary.feeds.push(FeedReport {
                    url: url.clone(),
                    entries: feed.entries.len(),
                    events,
                    error: None,
                });
            }
            Err(e) => {
                warn!(target: "ingest", error = ?e, provider = source.name(), feed = %url, "feed fetch failed");
                summary.feeds.push(FeedReport {
                    url: url.clone(),
                    error: Some(format!("{e:#}")),
                    ..FeedReport::default()
                });
            }
        }
    }

    info!(
        target: "ingest",
        feeds = summary.feeds_processed(),
        accepted = summary.total_accepted(),
        "run finished"
    );
    Ok(summary)
}

/// Write events as a 4-space indented UTF-8 JSON array (non-ASCII kept as is).
pub fn write_json(path: &Path, events: &[Event]) -> Result<()> {
    let mut buf = Vec::new();
    let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
    events
        .serialize(&mut ser)
        .context("serialising events")?;
    std::fs::write(path, buf).with_context(|| format!("writing {}", path.display()))
}
