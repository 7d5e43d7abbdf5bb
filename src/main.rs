//! osint-ingest — command-line entrypoint.
//! Fetches feeds, keeps geopolitically relevant items, stores them in SQLite
//! and optionally writes them to a JSON file.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use osint_ingest::ingest::config::{load_feeds_default, normalize_feed_urls};
use osint_ingest::ingest::providers::HttpFeedSource;
use osint_ingest::ingest::timestamp::DEFAULT_DISPLAY_TIMEZONE;
use osint_ingest::ingest::{run_once, write_json, IngestContext};
use osint_ingest::storage::DEFAULT_DB_PATH;
use osint_ingest::{DisplayZone, EventStore, RelevanceEngine, SqliteEventStore, SystemClock};

#[derive(Debug, Parser)]
#[command(name = "osint-ingest", version, about = "OSINT Dashboard: RSS Ingestor")]
struct Cli {
    /// Feed URLs to ingest (default: config/feeds.toml, else UN News)
    feeds: Vec<String>,

    /// Write accepted events as a JSON array (`--json` alone writes events.json)
    #[arg(
        long,
        value_name = "PATH",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "events.json"
    )]
    json: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "EVENTS_DB_PATH", default_value = DEFAULT_DB_PATH)]
    db: String,

    /// Keyword corpus / threshold rules (TOML)
    #[arg(long, env = "RELEVANCE_CONFIG_PATH")]
    relevance_config: Option<PathBuf>,

    /// IANA zone used for `published_local`
    #[arg(long, env = "DISPLAY_TIMEZONE", default_value = DEFAULT_DISPLAY_TIMEZONE)]
    timezone: String,

    /// Only put the first N events of each feed into the JSON output
    #[arg(long, value_name = "N")]
    sample_per_feed: Option<usize>,

    /// Print the N newest stored events after the run
    #[arg(long, value_name = "N")]
    latest: Option<u32>,
}

/// Logs go to stderr so stdout carries only the run report.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ingest=info,relevance=info,storage=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env if present; no-op otherwise.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    let engine = RelevanceEngine::load(cli.relevance_config.clone())?;
    let zone = DisplayZone::resolve(&cli.timezone);
    let urls = if cli.feeds.is_empty() {
        load_feeds_default()?
    } else {
        normalize_feed_urls(cli.feeds.clone())?
    };

    let store = SqliteEventStore::connect(&cli.db).await?;
    let source = HttpFeedSource::new()?;
    let clock = SystemClock;
    let ctx = IngestContext {
        engine: &engine,
        zone: &zone,
        clock: &clock,
        store: &store,
    };

    let summary = run_once(&ctx, &source, &urls).await?;

    for feed in &summary.feeds {
        match &feed.error {
            None => println!("Ingested {} events from {}", feed.accepted(), feed.url),
            Some(err) => println!("Failed to ingest {}: {}", feed.url, err),
        }
    }

    if let Some(path) = &cli.json {
        let events = match cli.sample_per_feed {
            Some(n) => summary.sample(n),
            None => summary.events(),
        };
        write_json(path, &events)?;
        println!("Wrote {} events to {}", events.len(), path.display());
    }

    println!(
        "\nIngested {} total events from {} feed(s).",
        summary.total_accepted(),
        summary.feeds_processed()
    );

    if let Some(n) = cli.latest {
        println!("\nLatest {n} stored events:");
        for ev in store.query_latest(n).await? {
            println!("{}  {}  {}", ev.published_utc, ev.source, ev.title);
        }
    }

    if summary.all_failed() {
        bail!("none of the {} feed(s) could be fetched", urls.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_forms() {
        let bare = Cli::parse_from(["osint-ingest", "--json"]);
        assert_eq!(bare.json, Some(PathBuf::from("events.json")));

        let explicit = Cli::parse_from(["osint-ingest", "--json=out/x.json", "https://a.test/rss"]);
        assert_eq!(explicit.json, Some(PathBuf::from("out/x.json")));
        assert_eq!(explicit.feeds, vec!["https://a.test/rss".to_string()]);

        let none = Cli::parse_from(["osint-ingest"]);
        assert!(none.json.is_none());
        assert!(none.feeds.is_empty());
    }
}
