//! Incremental seen-state tracking.
//!
//! The ledger records which items have already been surfaced per source
//! and partitions each merged batch into new vs. seen. The canonical
//! strategy is a bounded set of recently acknowledged native identifiers;
//! a timestamp watermark survives only as an opt-in fallback for sources
//! without stable ids, because it silently drops anything an upstream
//! resurfaces with an old timestamp.
//!
//! State is read from SQLite once at load, mutated in memory, and flushed
//! per source on every acknowledge. A read failure degrades to an empty
//! ledger (everything new); a flush failure keeps the in-memory effect and
//! is reconciled by the next successful flush.

use crate::model::{Post, SeenStrategy, Source};
use crate::storage::{Database, PersistedSource};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Identifier-set capacity per source.
pub const SEEN_ID_CAP: usize = 1000;
/// On overflow, truncate to this many newest identifiers. Kept well below
/// the cap so truncation doesn't fire on every subsequent insert.
pub const SEEN_ID_TRUNCATE_TO: usize = 500;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Flushing to the durable store failed. The in-memory acknowledgement
    /// already took effect and the next successful flush reconciles.
    #[error("Failed to persist seen state: {0}")]
    Flush(String),
}

// ============================================================================
// Partition result
// ============================================================================

/// Outcome of partitioning a batch into new vs. seen.
///
/// The flags are pure projections of the per-item partition, never stored
/// independently.
#[derive(Debug, Clone)]
pub struct Partition {
    /// Posts not yet acknowledged, in the order they were given.
    pub new_posts: Vec<Post>,
    pub new_by_source: HashMap<Source, usize>,
    /// Sources that contributed at least one new post, name-ordered.
    pub sources_with_new: Vec<Source>,
    pub has_new_content: bool,
}

/// Per-source summary for the status surface.
#[derive(Debug, Clone)]
pub struct LedgerSourceStats {
    pub source: Source,
    pub strategy: SeenStrategy,
    /// Identifiers currently held (0 for watermark sources).
    pub seen_count: usize,
    pub last_updated_ms: i64,
}

// ============================================================================
// In-memory state
// ============================================================================

/// Ordered identifier set: oldest at the front, newest at the back.
#[derive(Debug, Default)]
struct SeenIds {
    order: VecDeque<String>,
    index: HashSet<String>,
}

impl SeenIds {
    fn from_ids(ids: Vec<String>) -> Self {
        let mut set = Self::default();
        for id in ids {
            set.insert(id);
        }
        set
    }

    fn contains(&self, native_id: &str) -> bool {
        self.index.contains(native_id)
    }

    /// Insert as newest; a re-acknowledged id is not duplicated.
    fn insert(&mut self, native_id: String) {
        if self.index.insert(native_id.clone()) {
            self.order.push_back(native_id);
        }
    }

    /// Keep-newest eviction, run after each insertion batch.
    fn enforce_cap(&mut self) {
        if self.order.len() > SEEN_ID_CAP {
            while self.order.len() > SEEN_ID_TRUNCATE_TO {
                if let Some(evicted) = self.order.pop_front() {
                    self.index.remove(&evicted);
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Debug)]
enum SeenEntry {
    Ids(SeenIds),
    Watermark {
        last_seen_ts: i64,
        last_seen_id: Option<String>,
    },
}

impl SeenEntry {
    fn strategy(&self) -> SeenStrategy {
        match self {
            SeenEntry::Ids(_) => SeenStrategy::Ids,
            SeenEntry::Watermark { .. } => SeenStrategy::Watermark,
        }
    }
}

#[derive(Debug)]
struct SourceState {
    entry: SeenEntry,
    updated_at_ms: i64,
}

fn strategy_tag(strategy: SeenStrategy) -> &'static str {
    match strategy {
        SeenStrategy::Ids => "ids",
        SeenStrategy::Watermark => "watermark",
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// SeenLedger
// ============================================================================

/// Handle to the seen-state ledger. Cheap to clone; all clones share one
/// in-memory state behind a single writer lock, so overlapping acknowledge
/// calls serialize instead of losing updates to a stale snapshot.
#[derive(Clone)]
pub struct SeenLedger {
    state: Arc<Mutex<HashMap<Source, SourceState>>>,
    strategies: Arc<HashMap<Source, SeenStrategy>>,
    db: Database,
}

impl SeenLedger {
    /// Load the ledger from the store, once per process.
    ///
    /// `strategies` declares the seen strategy for sources that have no
    /// persisted entry yet (a persisted entry keeps its own strategy).
    /// A read failure degrades to an empty ledger rather than failing the
    /// caller — the worst case is re-surfacing already seen items.
    pub async fn load(db: Database, strategies: HashMap<Source, SeenStrategy>) -> Self {
        let mut state = HashMap::new();
        match db.load_ledger().await {
            Ok(entries) => {
                for persisted in entries {
                    let source: Source = match persisted.source.parse() {
                        Ok(s) => s,
                        Err(_) => {
                            tracing::warn!(
                                source = %persisted.source,
                                "Ignoring ledger entry for unknown source"
                            );
                            continue;
                        }
                    };
                    let entry = match persisted.strategy.as_str() {
                        "watermark" => SeenEntry::Watermark {
                            last_seen_ts: persisted.last_seen_ts.unwrap_or(0),
                            last_seen_id: persisted.last_seen_id,
                        },
                        _ => SeenEntry::Ids(SeenIds::from_ids(persisted.ids)),
                    };
                    state.insert(
                        source,
                        SourceState {
                            entry,
                            updated_at_ms: persisted.updated_at_ms,
                        },
                    );
                }
                tracing::debug!(sources = state.len(), "Loaded seen ledger");
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to read seen ledger, starting empty (all items will appear new)"
                );
            }
        }

        Self {
            state: Arc::new(Mutex::new(state)),
            strategies: Arc::new(strategies),
            db,
        }
    }

    /// Partition a batch into new vs. seen.
    ///
    /// Order-preserving: `new_posts` keeps the input order, so callers can
    /// hand in a merged batch and get a merged new-list back. The lock is
    /// held only for the scan; a concurrent acknowledge is observed either
    /// fully or not at all.
    pub async fn partition(&self, posts: &[Post]) -> Partition {
        let state = self.state.lock().await;

        let mut new_posts = Vec::new();
        let mut new_by_source: HashMap<Source, usize> = HashMap::new();

        for post in posts {
            let is_new = match state.get(&post.source) {
                None => true,
                Some(SourceState {
                    entry: SeenEntry::Ids(ids),
                    ..
                }) => !ids.contains(post.native_id()),
                Some(SourceState {
                    entry: SeenEntry::Watermark { last_seen_ts, .. },
                    ..
                }) => post.timestamp_ms > *last_seen_ts,
            };
            if is_new {
                *new_by_source.entry(post.source).or_insert(0) += 1;
                new_posts.push(post.clone());
            }
        }

        let mut sources_with_new: Vec<Source> = new_by_source.keys().copied().collect();
        sources_with_new.sort_by_key(|s| s.as_str());
        let has_new_content = !new_posts.is_empty();

        Partition {
            new_posts,
            new_by_source,
            sources_with_new,
            has_new_content,
        }
    }

    /// Record a batch as seen and flush the affected sources.
    ///
    /// The writer lock is held across mutate-and-flush, so two overlapping
    /// refresh cycles cannot overwrite each other's insertions with a stale
    /// snapshot. On flush failure the in-memory effect is kept (the durable
    /// copy lags until the next successful write) and the error is returned
    /// so callers can surface it.
    pub async fn acknowledge(&self, posts: &[Post]) -> Result<(), LedgerError> {
        if posts.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        let stamp = now_ms();
        let mut touched: Vec<Source> = Vec::new();

        for post in posts {
            let source_state = state.entry(post.source).or_insert_with(|| {
                let strategy = self
                    .strategies
                    .get(&post.source)
                    .copied()
                    .unwrap_or_default();
                let entry = match strategy {
                    SeenStrategy::Ids => SeenEntry::Ids(SeenIds::default()),
                    SeenStrategy::Watermark => SeenEntry::Watermark {
                        last_seen_ts: 0,
                        last_seen_id: None,
                    },
                };
                SourceState {
                    entry,
                    updated_at_ms: stamp,
                }
            });

            match &mut source_state.entry {
                SeenEntry::Ids(ids) => {
                    ids.insert(post.native_id().to_string());
                }
                SeenEntry::Watermark {
                    last_seen_ts,
                    last_seen_id,
                } => {
                    if post.timestamp_ms > *last_seen_ts {
                        *last_seen_ts = post.timestamp_ms;
                        *last_seen_id = Some(post.id.clone());
                    }
                }
            }
            source_state.updated_at_ms = stamp;
            if !touched.contains(&post.source) {
                touched.push(post.source);
            }
        }

        // Eviction runs once per insertion batch, not per insert.
        for source in &touched {
            if let Some(SourceState {
                entry: SeenEntry::Ids(ids),
                ..
            }) = state.get_mut(source)
            {
                ids.enforce_cap();
            }
        }

        let mut flush_errors = Vec::new();
        for source in &touched {
            let Some(source_state) = state.get(source) else {
                continue;
            };
            let persisted = to_persisted(*source, source_state);
            if let Err(e) = self.db.replace_source(&persisted).await {
                tracing::warn!(
                    source = %source,
                    error = %e,
                    "Failed to flush seen state, keeping in-memory effect"
                );
                flush_errors.push(format!("{}: {}", source, e));
            }
        }

        if flush_errors.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::Flush(flush_errors.join("; ")))
        }
    }

    /// Whether a native identifier is already in a source's seen-set.
    ///
    /// Watermark sources have no identifier set, so this reports false for
    /// them — the quota probe then falls through to the full fetch.
    pub async fn contains(&self, source: Source, native_id: &str) -> bool {
        let state = self.state.lock().await;
        match state.get(&source) {
            Some(SourceState {
                entry: SeenEntry::Ids(ids),
                ..
            }) => ids.contains(native_id),
            _ => false,
        }
    }

    /// Per-source counts for the status surface, name-ordered.
    pub async fn stats(&self) -> Vec<LedgerSourceStats> {
        let state = self.state.lock().await;
        let mut stats: Vec<LedgerSourceStats> = state
            .iter()
            .map(|(source, source_state)| LedgerSourceStats {
                source: *source,
                strategy: source_state.entry.strategy(),
                seen_count: match &source_state.entry {
                    SeenEntry::Ids(ids) => ids.len(),
                    SeenEntry::Watermark { .. } => 0,
                },
                last_updated_ms: source_state.updated_at_ms,
            })
            .collect();
        stats.sort_by_key(|s| s.source.as_str());
        stats
    }

    /// Clear all seen state, in memory and in the store.
    pub async fn reset(&self) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        state.clear();
        self.db
            .clear_ledger()
            .await
            .map_err(|e| LedgerError::Flush(e.to_string()))
    }
}

fn to_persisted(source: Source, state: &SourceState) -> PersistedSource {
    match &state.entry {
        SeenEntry::Ids(ids) => PersistedSource {
            source: source.as_str().to_string(),
            strategy: strategy_tag(SeenStrategy::Ids).to_string(),
            last_seen_ts: None,
            last_seen_id: None,
            updated_at_ms: state.updated_at_ms,
            ids: ids.order.iter().cloned().collect(),
        },
        SeenEntry::Watermark {
            last_seen_ts,
            last_seen_id,
        } => PersistedSource {
            source: source.as_str().to_string(),
            strategy: strategy_tag(SeenStrategy::Watermark).to_string(),
            last_seen_ts: Some(*last_seen_ts),
            last_seen_id: last_seen_id.clone(),
            updated_at_ms: state.updated_at_ms,
            ids: Vec::new(),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
