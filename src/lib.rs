//! decant: a multi-source feed aggregator.
//!
//! Fetches recent posts from a fixed set of upstream sources in parallel,
//! merges them into one deduplicated newest-first timeline, and tracks
//! which posts were already surfaced so each refresh can report only what
//! is genuinely new.

pub mod aggregator;
pub mod config;
pub mod ledger;
pub mod merge;
pub mod model;
pub mod source;
pub mod storage;

pub use aggregator::{fetch_all, Aggregator, RefreshOutcome, SourceCounts};
pub use config::{Config, ConfigError};
pub use ledger::{LedgerError, Partition, SeenLedger};
pub use model::{Embed, Post, SeenStrategy, Source, SourceConfig, SourceOptions};
pub use source::{FetchError, SourceAdapter, SourceRegistry};
