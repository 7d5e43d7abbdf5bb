// src/lib.rs
//! Geopolitical news ingest: relevance gate, timestamp normalization,
//! per-run dedup and idempotent persistence of canonical events.

pub mod ingest;
pub mod relevance;
pub mod storage;

// ---- Re-exports for stable public API ----
pub use crate::ingest::timestamp::{Clock, DisplayZone, SystemClock};
pub use crate::ingest::types::{Event, FeedEntry, FeedSource, ParsedFeed, TimeStruct};
pub use crate::ingest::{process_feed, run_once, IngestContext, RunIdentitySet, RunSummary};
pub use crate::relevance::{Relevance, RelevanceEngine, ThresholdPolicy, ThresholdRule};
pub use crate::storage::{EventStore, SqliteEventStore};
