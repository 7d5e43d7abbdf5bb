// src/storage.rs
//! Event persistence. Uniqueness is enforced on `link` by the schema, so
//! "insert if absent" is a single atomic statement.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::ingest::types::Event;

pub const DEFAULT_DB_PATH: &str = "events.db";

#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Create tables if missing. Safe to call repeatedly.
    async fn ensure_schema(&self) -> Result<()>;
    /// Returns `true` if a row was written, `false` if the link already existed.
    async fn insert_if_absent(&self, event: &Event) -> Result<bool>;
    /// Newest first.
    async fn query_latest(&self, limit: u32) -> Result<Vec<Event>>;
}

#[derive(Debug, FromRow)]
struct EventRow {
    title: String,
    link: String,
    published_utc: String,
    published_local: String,
    ingested_utc: String,
    latency_sec: i64,
    summary: String,
    source: String,
}

impl From<EventRow> for Event {
    fn from(r: EventRow) -> Self {
        Self {
            title: r.title,
            link: r.link,
            published_utc: r.published_utc,
            published_local: r.published_local,
            ingested_utc: r.ingested_utc,
            latency_sec: r.latency_sec,
            summary: r.summary,
            source: r.source,
        }
    }
}

pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Open (creating if missing) a database file.
    pub async fn connect(database_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{database_path}"))
            .context("Invalid database path")?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database {database_path}"))?;

        info!(target: "storage", path = database_path, "database opened");
        Ok(Self { pool })
    }

    /// Private in-memory database; one connection so every query sees the same data.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl EventStore for SqliteEventStore {
    async fn ensure_schema(&self) -> Result<()> {
        let migration_sql = include_str!("../migrations/001_events.sql");
        // sqlx runs one statement per call
        for statement in migration_sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("Failed to execute migration: {trimmed}"))?;
            }
        }
        Ok(())
    }

    async fn insert_if_absent(&self, event: &Event) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO events (title, link, published_utc, published_local, ingested_utc, latency_sec, summary, source)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(link) DO NOTHING",
        )
        .bind(&event.title)
        .bind(&event.link)
        .bind(&event.published_utc)
        .bind(&event.published_local)
        .bind(&event.ingested_utc)
        .bind(event.latency_sec)
        .bind(&event.summary)
        .bind(&event.source)
        .execute(&self.pool)
        .await
        .context("Failed to insert event")?;

        let inserted = result.rows_affected() == 1;
        if !inserted {
            debug!(target: "storage", link = %event.link, "link already stored");
        }
        Ok(inserted)
    }

    async fn query_latest(&self, limit: u32) -> Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT title, link, published_utc, published_local, ingested_utc, latency_sec, summary, source
             FROM events ORDER BY id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch latest events")?;

        Ok(rows.into_iter().map(Event::from).collect())
    }
}
