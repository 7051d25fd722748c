//! Integration tests for the full aggregate cycle: fan-out, merge,
//! partition, acknowledge, and ledger persistence across restarts.
//!
//! Upstream HTTP is mocked with wiremock where a real adapter is under
//! test; orchestration-level behavior uses fake adapters. On-disk ledger
//! tests get their own temp directory per test.

use async_trait::async_trait;
use decant::aggregator::Aggregator;
use decant::ledger::SeenLedger;
use decant::model::{Post, Source, SourceConfig};
use decant::source::{
    FetchError, HackerNewsAdapter, QuotaProbe, SourceAdapter, SourceRegistry,
};
use decant::storage::Database;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct FakeAdapter {
    source: Source,
    posts: Vec<Post>,
}

#[async_trait]
impl SourceAdapter for FakeAdapter {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch_posts(&self, _config: &SourceConfig) -> Result<Vec<Post>, FetchError> {
        Ok(self.posts.clone())
    }
}

fn post(source: Source, native: &str, ts: i64) -> Post {
    Post {
        id: Post::make_id(source, native),
        source,
        title: format!("post {}", native),
        url: None,
        content: None,
        author: "author".into(),
        timestamp_ms: ts,
        score: None,
        comments_count: None,
        comments_url: None,
        thumbnail: None,
        embed: None,
    }
}

async fn ledger_at(path: &std::path::Path) -> SeenLedger {
    let db = Database::open(path.to_str().unwrap()).await.unwrap();
    SeenLedger::load(db, HashMap::new()).await
}

fn all_enabled() -> Vec<SourceConfig> {
    vec![
        SourceConfig::enabled(Source::HackerNews),
        SourceConfig::enabled(Source::Reddit),
        SourceConfig::enabled(Source::Twitter),
    ]
}

#[tokio::test]
async fn test_seen_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("seen.db");

    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(FakeAdapter {
        source: Source::Reddit,
        posts: vec![post(Source::Reddit, "r1", 100), post(Source::Reddit, "r2", 200)],
    }));
    let registry = Arc::new(registry);

    // First run: everything new, acknowledge it all.
    {
        let aggregator = Aggregator::new(registry.clone(), ledger_at(&db_path).await);
        let outcome = aggregator.refresh(&all_enabled()).await;
        assert_eq!(outcome.new_posts.len(), 2);
        aggregator.acknowledge(&outcome.new_posts).await.unwrap();
    }

    // Second run with a fresh ledger loaded from the same store.
    {
        let aggregator = Aggregator::new(registry.clone(), ledger_at(&db_path).await);
        let outcome = aggregator.refresh(&all_enabled()).await;
        assert!(!outcome.has_new_content);
        assert_eq!(outcome.total_fetched, 2);
    }
}

#[tokio::test]
async fn test_corrupt_store_still_refreshes_everything_new() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("seen.db");
    std::fs::write(&db_path, b"garbage, not sqlite").unwrap();

    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(FakeAdapter {
        source: Source::Reddit,
        posts: vec![post(Source::Reddit, "r1", 100)],
    }));

    let db = Database::open_or_ephemeral(db_path.to_str().unwrap())
        .await
        .unwrap();
    let ledger = SeenLedger::load(db, HashMap::new()).await;
    let aggregator = Aggregator::new(Arc::new(registry), ledger);

    let outcome = aggregator.refresh(&all_enabled()).await;
    assert!(outcome.has_new_content);
    assert_eq!(outcome.new_posts.len(), 1);
}

#[tokio::test]
async fn test_reset_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("seen.db");

    let ledger = ledger_at(&db_path).await;
    ledger
        .acknowledge(&[post(Source::Reddit, "r1", 100)])
        .await
        .unwrap();
    ledger.reset().await.unwrap();
    drop(ledger);

    let reloaded = ledger_at(&db_path).await;
    assert!(reloaded.stats().await.is_empty());
}

#[tokio::test]
async fn test_hackernews_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topstories.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([10, 20])))
        .mount(&server)
        .await;
    for (id, title, time) in [(10u64, "Older", 1_000i64), (20, "Newer", 2_000)] {
        Mock::given(method("GET"))
            .and(path(format!("/item/{}.json", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": id,
                "title": title,
                "url": format!("https://example.com/{}", id),
                "by": "pg",
                "time": time,
                "score": 1,
                "descendants": 0,
                "type": "story",
            })))
            .mount(&server)
            .await;
    }

    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(HackerNewsAdapter::with_base_url(
        reqwest::Client::new(),
        server.uri(),
    )));

    let db = Database::open(":memory:").await.unwrap();
    let ledger = SeenLedger::load(db, HashMap::new()).await;
    let aggregator = Aggregator::new(Arc::new(registry), ledger);

    let outcome = aggregator.refresh(&all_enabled()).await;
    assert_eq!(outcome.total_fetched, 2);
    // Merge order is newest first regardless of upstream ranking order.
    assert_eq!(outcome.new_posts[0].id, "hackernews:20");
    assert_eq!(outcome.new_posts[1].id, "hackernews:10");

    aggregator.acknowledge(&outcome.new_posts).await.unwrap();
    let second = aggregator.refresh(&all_enabled()).await;
    assert!(second.new_posts.is_empty());
    assert_eq!(second.total_fetched, 2);
}

#[tokio::test]
async fn test_duplicate_ids_across_cycles_deduplicated_in_batch() {
    // Two adapters racing to report overlapping batches within one cycle:
    // the merged timeline keeps the first occurrence only.
    struct DupAdapter(Source);

    #[async_trait]
    impl SourceAdapter for DupAdapter {
        fn source(&self) -> Source {
            self.0
        }

        async fn fetch_posts(&self, _config: &SourceConfig) -> Result<Vec<Post>, FetchError> {
            Ok(vec![
                post(self.0, "same", 500),
                post(self.0, "same", 500),
                post(self.0, "other", 100),
            ])
        }
    }

    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(DupAdapter(Source::HackerNews)));

    let db = Database::open(":memory:").await.unwrap();
    let ledger = SeenLedger::load(db, HashMap::new()).await;
    let aggregator = Aggregator::new(Arc::new(registry), ledger);

    let outcome = aggregator.refresh(&all_enabled()).await;
    assert_eq!(outcome.total_fetched, 2);
    assert_eq!(outcome.new_posts.len(), 2);
}

#[tokio::test]
async fn test_probe_skips_quota_source_after_ack() {
    struct CountingAdapter {
        full_fetches: AtomicUsize,
    }

    #[async_trait]
    impl SourceAdapter for CountingAdapter {
        fn source(&self) -> Source {
            Source::Twitter
        }

        async fn fetch_posts(&self, _config: &SourceConfig) -> Result<Vec<Post>, FetchError> {
            self.full_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![post(Source::Twitter, "t1", 100)])
        }

        async fn fetch_latest(&self, _config: &SourceConfig) -> Result<Option<Post>, FetchError> {
            Ok(Some(post(Source::Twitter, "t1", 100)))
        }
    }

    let inner = Arc::new(CountingAdapter {
        full_fetches: AtomicUsize::new(0),
    });

    let db = Database::open(":memory:").await.unwrap();
    let ledger = SeenLedger::load(db, HashMap::new()).await;

    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(QuotaProbe::new(inner.clone(), ledger.clone())));
    let aggregator = Aggregator::new(Arc::new(registry), ledger);

    let first = aggregator.refresh(&all_enabled()).await;
    assert_eq!(first.new_posts.len(), 1);
    assert_eq!(inner.full_fetches.load(Ordering::SeqCst), 1);
    aggregator.acknowledge(&first.new_posts).await.unwrap();

    // Latest item is now seen: the probe answers and the full fetch never runs.
    let second = aggregator.refresh(&all_enabled()).await;
    assert!(!second.has_new_content);
    assert_eq!(inner.full_fetches.load(Ordering::SeqCst), 1);
}
