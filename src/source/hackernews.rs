use super::{send_checked, FetchError, SourceAdapter};
use crate::model::{Embed, Post, Source, SourceConfig};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0";
/// Max in-flight item requests during hydration.
const ITEM_CONCURRENCY: usize = 10;

/// Hacker News adapter.
///
/// The Firebase API has no "top stories with bodies" endpoint, so a fetch
/// is two-phase: pull the top-story id list, then hydrate each id with an
/// individual item request. A single failed item is skipped, not fatal.
pub struct HackerNewsAdapter {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct HnItem {
    id: u64,
    title: Option<String>,
    url: Option<String>,
    by: Option<String>,
    time: Option<i64>,
    score: Option<i64>,
    descendants: Option<u32>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl HackerNewsAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the adapter at a different API root (tests).
    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn fetch_item(&self, id: u64) -> Result<HnItem, FetchError> {
        let url = format!("{}/item/{}.json", self.base_url, id);
        let response = send_checked(self.client.get(&url)).await?;
        response
            .json::<HnItem>()
            .await
            .map_err(|e| FetchError::Malformed(format!("item {}: {}", id, e)))
    }

    fn convert(item: HnItem) -> Option<Post> {
        // Only hydrated stories become posts; jobs, polls, and deleted
        // items (which come back without a title) are dropped.
        if item.kind.as_deref() != Some("story") {
            return None;
        }
        let title = item.title?;
        let native_id = item.id.to_string();

        Some(Post {
            id: Post::make_id(Source::HackerNews, &native_id),
            source: Source::HackerNews,
            title,
            url: item.url,
            content: None,
            author: item.by.unwrap_or_default(),
            timestamp_ms: item.time.unwrap_or(0) * 1000,
            score: item.score,
            comments_count: item.descendants,
            comments_url: Some(format!("https://news.ycombinator.com/item?id={}", item.id)),
            thumbnail: None,
            embed: Some(Embed::HackerNews {
                story_id: native_id,
            }),
        })
    }
}

#[async_trait]
impl SourceAdapter for HackerNewsAdapter {
    fn source(&self) -> Source {
        Source::HackerNews
    }

    async fn fetch_posts(&self, config: &SourceConfig) -> Result<Vec<Post>, FetchError> {
        let url = format!("{}/topstories.json", self.base_url);
        let response = send_checked(self.client.get(&url)).await?;
        let ids: Vec<u64> = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("topstories: {}", e)))?;

        let page: Vec<u64> = ids
            .into_iter()
            .take(config.options.page_size as usize)
            .collect();

        // buffered (not buffer_unordered) keeps the ranking order the id
        // list came in.
        let items: Vec<Option<HnItem>> = stream::iter(page)
            .map(|id| async move {
                match self.fetch_item(id).await {
                    Ok(item) => Some(item),
                    Err(e) => {
                        tracing::warn!(story_id = id, error = %e, "Skipping unhydratable story");
                        None
                    }
                }
            })
            .buffered(ITEM_CONCURRENCY)
            .collect()
            .await;

        let posts: Vec<Post> = items
            .into_iter()
            .flatten()
            .filter_map(Self::convert)
            .collect();

        tracing::debug!(count = posts.len(), "Fetched Hacker News stories");
        Ok(posts)
    }

    async fn fetch_latest(&self, _config: &SourceConfig) -> Result<Option<Post>, FetchError> {
        // One id, one item request.
        let url = format!("{}/topstories.json", self.base_url);
        let response = send_checked(self.client.get(&url)).await?;
        let ids: Vec<u64> = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("topstories: {}", e)))?;

        let Some(id) = ids.first() else {
            return Ok(None);
        };
        let item = self.fetch_item(*id).await?;
        Ok(Self::convert(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn story_json(id: u64, title: &str, time: i64) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "title": title,
            "url": format!("https://example.com/{}", id),
            "by": "pg",
            "time": time,
            "score": 42,
            "descendants": 7,
            "type": "story",
        })
    }

    async fn adapter_for(server: &MockServer) -> HackerNewsAdapter {
        HackerNewsAdapter::with_base_url(reqwest::Client::new(), server.uri())
    }

    #[tokio::test]
    async fn test_fetch_hydrates_and_converts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/topstories.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([1, 2])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/item/1.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(story_json(1, "First", 1000)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/item/2.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(story_json(2, "Second", 2000)))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server).await;
        let posts = adapter
            .fetch_posts(&SourceConfig::enabled(Source::HackerNews))
            .await
            .unwrap();

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "hackernews:1");
        assert_eq!(posts[0].title, "First");
        assert_eq!(posts[0].timestamp_ms, 1_000_000); // seconds to millis
        assert_eq!(posts[0].author, "pg");
        assert_eq!(
            posts[0].comments_url.as_deref(),
            Some("https://news.ycombinator.com/item?id=1")
        );
        assert_eq!(posts[1].id, "hackernews:2");
    }

    #[tokio::test]
    async fn test_non_story_items_filtered() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/topstories.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([1, 2])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/item/1.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1, "type": "job", "title": "Hiring", "time": 1000,
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/item/2.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(story_json(2, "Real", 2000)))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server).await;
        let posts = adapter
            .fetch_posts(&SourceConfig::enabled(Source::HackerNews))
            .await
            .unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Real");
    }

    #[tokio::test]
    async fn test_failed_item_is_skipped_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/topstories.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([1, 2])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/item/1.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/item/2.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(story_json(2, "Alive", 2000)))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server).await;
        let posts = adapter
            .fetch_posts(&SourceConfig::enabled(Source::HackerNews))
            .await
            .unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "hackernews:2");
    }

    #[tokio::test]
    async fn test_topstories_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/topstories.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server).await;
        let err = adapter
            .fetch_posts(&SourceConfig::enabled(Source::HackerNews))
            .await
            .unwrap_err();
        match err {
            FetchError::HttpStatus(503) => {}
            e => panic!("Expected HttpStatus(503), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_page_size_limits_hydration() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/topstories.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([1, 2, 3])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/item/1.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(story_json(1, "Only", 1000)))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = SourceConfig::enabled(Source::HackerNews);
        config.options.page_size = 1;

        let adapter = adapter_for(&server).await;
        let posts = adapter.fetch_posts(&config).await.unwrap();
        assert_eq!(posts.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_latest_requests_single_item() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/topstories.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([7, 8, 9])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/item/7.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(story_json(7, "Top", 1000)))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = adapter_for(&server).await;
        let latest = adapter
            .fetch_latest(&SourceConfig::enabled(Source::HackerNews))
            .await
            .unwrap();
        assert_eq!(latest.unwrap().id, "hackernews:7");
    }
}
