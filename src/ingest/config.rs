// src/ingest/config.rs
//! Which feed URLs a run ingests when none are given on the command line.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

pub const ENV_FEEDS_PATH: &str = "INGEST_FEEDS_PATH";

pub const DEFAULT_FEED_URL: &str = "https://news.un.org/feed/subscribe/en/news/all/rss.xml";

/// Looked up relative to the working directory, in this order.
const FALLBACK_PATHS: &[&str] = &["config/feeds.toml", "config/feeds.json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListFormat {
    /// `feeds = ["https://...", ...]`
    Toml,
    /// `["https://...", ...]`
    Json,
}

impl ListFormat {
    fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => bail!(
                "feed list {} must have a .toml or .json extension",
                path.display()
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeedsFile {
    feeds: Vec<String>,
}

/// Load a feed list; the format follows the file extension.
pub fn load_feeds_from(path: &Path) -> Result<Vec<String>> {
    let format = ListFormat::from_path(path)?;
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed list from {}", path.display()))?;

    let raw = match format {
        ListFormat::Toml => {
            toml::from_str::<FeedsFile>(&content)
                .with_context(|| format!("parsing TOML feed list {}", path.display()))?
                .feeds
        }
        ListFormat::Json => serde_json::from_str::<Vec<String>>(&content)
            .with_context(|| format!("parsing JSON feed list {}", path.display()))?,
    };

    let feeds = normalize_feed_urls(raw).with_context(|| format!("feed list {}", path.display()))?;
    if feeds.is_empty() {
        bail!("feed list {} has no feeds", path.display());
    }
    Ok(feeds)
}

/// `$INGEST_FEEDS_PATH` (must exist), then `config/feeds.toml`,
/// `config/feeds.json`, then the UN News feed alone.
pub fn load_feeds_default() -> Result<Vec<String>> {
    if let Some(p) = std::env::var_os(ENV_FEEDS_PATH) {
        let path = PathBuf::from(p);
        if !path.is_file() {
            bail!("{ENV_FEEDS_PATH} points to {}, which does not exist", path.display());
        }
        return load_feeds_from(&path);
    }

    match FALLBACK_PATHS.iter().map(Path::new).find(|p| p.is_file()) {
        Some(path) => load_feeds_from(path),
        None => Ok(vec![DEFAULT_FEED_URL.to_string()]),
    }
}

/// Trim, skip blanks, require absolute http(s) URLs, drop repeats (first wins).
/// URLs are kept as written, not re-serialised.
pub fn normalize_feed_urls(raw: Vec<String>) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for item in raw {
        let candidate = item.trim();
        if candidate.is_empty() {
            continue;
        }
        let parsed = Url::parse(candidate)
            .with_context(|| format!("`{candidate}` is not a valid feed URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            bail!("`{candidate}` is not an http(s) feed URL");
        }
        if seen.insert(candidate.to_string()) {
            out.push(candidate.to_string());
        }
    }
    Ok(out)
}
