// src/ingest/providers/rss.rs
//! RSS 2.0 / Atom reader producing [`ParsedFeed`]s, plus HTTP and fixture sources.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::time::Duration;

use crate::ingest::timestamp::{parse_rfc2822, without_leap_second};
use crate::ingest::types::{FeedEntry, FeedSource, ParsedFeed, TimeStruct};

const USER_AGENT: &str = concat!("osint-ingest/", env!("CARGO_PKG_VERSION"));
const FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    FeedTitle,
    Title,
    Link,
    Description,
    Summary,
    Content,
    Published,
    Updated,
    DcDate,
    Date,
    Created,
    Expired,
}

fn entry_field(name: &str) -> Option<Field> {
    let f = match name {
        "title" => Field::Title,
        "link" => Field::Link,
        "description" => Field::Description,
        "summary" => Field::Summary,
        "content:encoded" | "content" => Field::Content,
        "pubDate" | "published" => Field::Published,
        "updated" => Field::Updated,
        "dc:date" => Field::DcDate,
        "date" => Field::Date,
        "dc:created" | "dcterms:created" | "created" => Field::Created,
        "expirationDate" | "expired" => Field::Expired,
        _ => return None,
    };
    Some(f)
}

/// Pre-parse a date the way feed libraries do: RFC 2822 or RFC 3339/W3C-DTF, as UTC.
pub fn parse_date_struct(raw: &str) -> Option<TimeStruct> {
    let s = raw.trim();
    let dt = parse_rfc2822(s)
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc)))
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|n| n.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|n| n.and_utc())
        })?;
    without_leap_second(dt).map(TimeStruct::from_datetime)
}

fn set_once(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}

fn set_struct_once(slot: &mut Option<TimeStruct>, raw: &str) {
    if slot.is_none() {
        *slot = parse_date_struct(raw);
    }
}

/// Atom links carry `href`; only alternate (or unqualified) links count.
fn atom_href(e: &BytesStart<'_>) -> Option<String> {
    let href = e.try_get_attribute("href").ok().flatten()?;
    let rel = e
        .try_get_attribute("rel")
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));
    if matches!(rel.as_deref(), Some(r) if r != "alternate") {
        return None;
    }
    href.unescape_value().ok().map(|v| v.trim().to_string())
}

#[derive(Default)]
struct Draft {
    entry: FeedEntry,
    content: Option<String>,
}

impl Draft {
    fn commit(&mut self, field: Field, value: &str) {
        let e = &mut self.entry;
        match field {
            Field::Title => set_once(&mut e.title, value),
            Field::Link => set_once(&mut e.link, value),
            Field::Description => set_once(&mut e.description, value),
            Field::Summary => set_once(&mut e.summary, value),
            Field::Content => set_once(&mut self.content, value),
            Field::Published => {
                set_once(&mut e.published, value);
                set_struct_once(&mut e.published_parsed, value);
            }
            Field::Updated => {
                set_once(&mut e.updated, value);
                set_struct_once(&mut e.updated_parsed, value);
            }
            Field::DcDate => {
                set_once(&mut e.dc_date, value);
                set_struct_once(&mut e.date_parsed, value);
            }
            Field::Date => {
                set_once(&mut e.date, value);
                set_struct_once(&mut e.date_parsed, value);
            }
            Field::Created => set_struct_once(&mut e.created_parsed, value),
            Field::Expired => set_struct_once(&mut e.expired_parsed, value),
            Field::FeedTitle => {}
        }
    }

    fn finish(mut self) -> FeedEntry {
        if self.entry.description.is_none() {
            self.entry.description = self.content.take();
        }
        self.entry
    }
}

/// An element whose text is being collected; nested tags only add their text.
struct OpenField {
    field: Field,
    nested: usize,
    buf: String,
}

impl OpenField {
    /// Text and CDATA pieces are joined by a single space.
    fn push(&mut self, piece: &str) {
        if piece.is_empty() {
            return;
        }
        if !self.buf.is_empty() {
            self.buf.push(' ');
        }
        self.buf.push_str(piece);
    }
}

/// Parse an RSS 2.0 or Atom document. Markup inside summaries is kept.
pub fn parse_feed_xml(xml: &str) -> Result<ParsedFeed> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut feed = ParsedFeed::default();
    let mut draft: Option<Draft> = None;
    let mut open: Option<OpenField> = None;

    loop {
        let event = match reader.read_event() {
            Ok(ev) => ev,
            Err(e) => {
                let pos = reader.buffer_position();
                return Err(e).with_context(|| format!("malformed feed XML near byte {pos}"));
            }
        };

        match event {
            Event::Start(e) => {
                if let Some(of) = open.as_mut() {
                    of.nested += 1;
                    continue;
                }
                let name_buf = e.name().as_ref().to_vec();
                let name = std::str::from_utf8(&name_buf).unwrap_or("");
                match (name, draft.as_mut()) {
                    ("item" | "entry", _) => draft = Some(Draft::default()),
                    ("link", Some(d)) => match atom_href(&e) {
                        Some(href) => set_once(&mut d.entry.link, &href),
                        None if e.try_get_attribute("href").ok().flatten().is_none() => {
                            open = Some(OpenField {
                                field: Field::Link,
                                nested: 0,
                                buf: String::new(),
                            });
                        }
                        None => {}
                    },
                    (_, Some(_)) => {
                        if let Some(field) = entry_field(name) {
                            open = Some(OpenField {
                                field,
                                nested: 0,
                                buf: String::new(),
                            });
                        }
                    }
                    ("title", None) if feed.title.is_none() => {
                        open = Some(OpenField {
                            field: Field::FeedTitle,
                            nested: 0,
                            buf: String::new(),
                        });
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if open.is_some() {
                    continue;
                }
                if let Some(d) = draft.as_mut() {
                    if e.name().as_ref() == b"link" {
                        if let Some(href) = atom_href(&e) {
                            set_once(&mut d.entry.link, &href);
                        }
                    }
                }
            }
            Event::Text(t) => {
                if let Some(of) = open.as_mut() {
                    let text = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    of.push(&text);
                }
            }
            Event::CData(c) => {
                if let Some(of) = open.as_mut() {
                    of.push(&String::from_utf8_lossy(c.as_ref()));
                }
            }
            Event::End(e) => {
                if let Some(of) = open.as_mut() {
                    if of.nested > 0 {
                        of.nested -= 1;
                        continue;
                    }
                    let done = open.take().map(|of| (of.field, of.buf));
                    if let Some((field, buf)) = done {
                        let value = buf.trim();
                        match (field, draft.as_mut()) {
                            (Field::FeedTitle, _) => feed.title = Some(value.to_string()),
                            (f, Some(d)) => d.commit(f, value),
                            (_, None) => {}
                        }
                    }
                    continue;
                }
                let name = e.name();
                if matches!(name.as_ref(), b"item" | b"entry") {
                    if let Some(d) = draft.take() {
                        feed.entries.push(d.finish());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(feed)
}

/// Fetches feeds over HTTP(S).
pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .context("building http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<ParsedFeed> {
        let body = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?
            .text()
            .await
            .context("feed http .text()")?;
        parse_feed_xml(&body).with_context(|| format!("parsing feed {url}"))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Serves XML documents from memory, keyed by URL.
#[derive(Debug, Clone, Default)]
pub struct FixtureFeedSource {
    docs: HashMap<String, String>,
}

impl FixtureFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fixture(mut self, url: &str, xml: &str) -> Self {
        self.docs.insert(url.to_string(), xml.to_string());
        self
    }
}

#[async_trait]
impl FeedSource for FixtureFeedSource {
    async fn fetch(&self, url: &str) -> Result<ParsedFeed> {
        let xml = self
            .docs
            .get(url)
            .ok_or_else(|| anyhow!("no fixture registered for {url}"))?;
        parse_feed_xml(xml).with_context(|| format!("parsing fixture {url}"))
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
