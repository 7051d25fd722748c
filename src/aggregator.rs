//! Fan-out orchestration and the refresh cycle.
//!
//! A refresh fetches every enabled source concurrently with settle-all
//! semantics (one failing source costs only its own posts), merges the
//! results into a single deduplicated timeline, and partitions that
//! timeline against the seen ledger. Acknowledgement is a separate step
//! so callers decide when "delivered" actually happened.

use crate::ledger::{LedgerError, SeenLedger};
use crate::merge;
use crate::model::{Post, Source, SourceConfig};
use crate::source::SourceRegistry;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-source totals for one refresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceCounts {
    /// Posts the source contributed to the merged timeline.
    pub total: usize,
    /// How many of those were not yet seen.
    pub new: usize,
}

/// Result of one refresh cycle.
#[derive(Debug)]
pub struct RefreshOutcome {
    /// Unseen posts, merged order (newest first).
    pub new_posts: Vec<Post>,
    /// Size of the merged timeline, duplicates already dropped.
    pub total_fetched: usize,
    pub by_source: HashMap<Source, SourceCounts>,
    /// Sources that contributed at least one new post, name-ordered.
    pub sources_with_new: Vec<Source>,
    pub has_new_content: bool,
}

/// Fetch every enabled, registered source concurrently.
///
/// Settle-all: each adapter error is logged and contributes an empty
/// batch instead of failing the whole fan-out. Results concatenate in
/// config order so downstream dedup is deterministic.
pub async fn fetch_all(registry: &SourceRegistry, configs: &[SourceConfig]) -> Vec<Post> {
    let jobs: Vec<_> = configs
        .iter()
        .filter(|c| c.enabled)
        .filter_map(|config| {
            let Some(adapter) = registry.resolve(config.source) else {
                tracing::warn!(source = %config.source, "No adapter registered, skipping");
                return None;
            };
            Some((adapter, config.clone()))
        })
        .collect();

    let batches = join_all(jobs.into_iter().map(|(adapter, config)| async move {
        let source = adapter.source();
        match adapter.fetch_posts(&config).await {
            Ok(posts) => {
                tracing::debug!(source = %source, count = posts.len(), "Source fetched");
                posts
            }
            Err(e) => {
                tracing::warn!(source = %source, error = %e, "Source fetch failed, continuing without it");
                Vec::new()
            }
        }
    }))
    .await;

    batches.into_iter().flatten().collect()
}

/// The aggregate read-side: registry plus seen ledger.
///
/// Clones share the same ledger; the registry is immutable after setup.
#[derive(Clone)]
pub struct Aggregator {
    registry: Arc<SourceRegistry>,
    ledger: SeenLedger,
}

impl Aggregator {
    pub fn new(registry: Arc<SourceRegistry>, ledger: SeenLedger) -> Self {
        Self { registry, ledger }
    }

    pub fn ledger(&self) -> &SeenLedger {
        &self.ledger
    }

    /// Run one refresh cycle: fan out, merge, partition.
    ///
    /// Pure read; nothing is marked seen until [`Aggregator::acknowledge`].
    /// Running refresh twice without acknowledging reports the same posts
    /// as new both times.
    pub async fn refresh(&self, configs: &[SourceConfig]) -> RefreshOutcome {
        let fetched = fetch_all(&self.registry, configs).await;
        let merged = merge::merge(fetched);
        let totals = merge::stats_by_source(&merged);
        let partition = self.ledger.partition(&merged).await;

        let mut by_source: HashMap<Source, SourceCounts> = HashMap::new();
        for (source, stats) in &totals {
            by_source.insert(
                *source,
                SourceCounts {
                    total: stats.count,
                    new: partition.new_by_source.get(source).copied().unwrap_or(0),
                },
            );
        }

        tracing::info!(
            total = merged.len(),
            new = partition.new_posts.len(),
            sources = by_source.len(),
            "Refresh complete"
        );

        RefreshOutcome {
            new_posts: partition.new_posts,
            total_fetched: merged.len(),
            by_source,
            sources_with_new: partition.sources_with_new,
            has_new_content: partition.has_new_content,
        }
    }

    /// Mark delivered posts as seen and flush.
    pub async fn acknowledge(&self, posts: &[Post]) -> Result<(), LedgerError> {
        self.ledger.acknowledge(posts).await
    }
}
