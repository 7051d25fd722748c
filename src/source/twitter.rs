use super::{send_checked, FetchError, SourceAdapter};
use crate::model::{Embed, Post, Source, SourceConfig};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

const DEFAULT_BASE_URL: &str = "https://api.twitter.com/2";
/// Tweets have no title; the first chunk of the text stands in for one.
const TITLE_MAX_CHARS: usize = 100;

/// Twitter adapter, reading configured list timelines with a bearer token.
///
/// This is the upstream whose monthly read quota makes the probe matter:
/// `fetch_latest` is overridden to request exactly one tweet instead of a
/// full page.
pub struct TwitterAdapter {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    data: Option<Vec<Tweet>>,
    includes: Option<Includes>,
}

#[derive(Debug, Deserialize)]
struct Includes {
    users: Option<Vec<TwitterUser>>,
}

#[derive(Debug, Deserialize)]
struct TwitterUser {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    author_id: Option<String>,
    created_at: Option<String>,
    public_metrics: Option<PublicMetrics>,
}

#[derive(Debug, Deserialize)]
struct PublicMetrics {
    like_count: Option<i64>,
    reply_count: Option<u32>,
}

impl TwitterAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            bearer_token: std::env::var("TWITTER_BEARER_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
        }
    }

    /// Explicit endpoint and token (tests).
    pub fn with_base_url(
        client: reqwest::Client,
        base_url: impl Into<String>,
        bearer_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            bearer_token: Some(bearer_token.into()),
        }
    }

    fn token(&self) -> Result<&str, FetchError> {
        self.bearer_token.as_deref().ok_or_else(|| {
            FetchError::Auth("Twitter bearer token not configured (TWITTER_BEARER_TOKEN)".into())
        })
    }

    async fn fetch_list(
        &self,
        list_id: &str,
        max_results: u32,
        token: &str,
    ) -> Result<Vec<Post>, FetchError> {
        let url = format!("{}/lists/{}/tweets", self.base_url, list_id);
        let max_results = max_results.to_string();
        let response = send_checked(
            self.client
                .get(&url)
                .bearer_auth(token)
                .query(&[
                    ("tweet.fields", "created_at,author_id,public_metrics"),
                    ("expansions", "author_id"),
                    ("user.fields", "username"),
                    ("max_results", max_results.as_str()),
                ]),
        )
        .await?;

        let timeline: TimelineResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("list {}: {}", list_id, e)))?;

        let users: HashMap<String, String> = timeline
            .includes
            .and_then(|i| i.users)
            .unwrap_or_default()
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect();

        Ok(timeline
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|tweet| Self::convert(tweet, &users))
            .collect())
    }

    fn convert(tweet: Tweet, users: &HashMap<String, String>) -> Post {
        let author = tweet
            .author_id
            .as_ref()
            .and_then(|id| users.get(id))
            .map(|username| format!("@{}", username))
            .or(tweet.author_id)
            .unwrap_or_default();

        let timestamp_ms = tweet
            .created_at
            .as_deref()
            .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.timestamp_millis())
            .unwrap_or(0);

        let (score, comments_count) = match &tweet.public_metrics {
            Some(m) => (m.like_count, m.reply_count),
            None => (None, None),
        };

        Post {
            id: Post::make_id(Source::Twitter, &tweet.id),
            source: Source::Twitter,
            title: truncate_title(&tweet.text),
            url: None,
            content: Some(tweet.text),
            author,
            timestamp_ms,
            score,
            comments_count,
            comments_url: Some(format!("https://twitter.com/i/status/{}", tweet.id)),
            thumbnail: None,
            embed: Some(Embed::Tweet { tweet_id: tweet.id }),
        }
    }
}

/// Char-boundary-safe truncation with an ellipsis marker.
fn truncate_title(text: &str) -> String {
    if text.chars().count() <= TITLE_MAX_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(TITLE_MAX_CHARS - 3).collect();
    format!("{}...", head)
}

#[async_trait]
impl SourceAdapter for TwitterAdapter {
    fn source(&self) -> Source {
        Source::Twitter
    }

    async fn fetch_posts(&self, config: &SourceConfig) -> Result<Vec<Post>, FetchError> {
        let token = self.token()?.to_string();
        if config.options.list_ids.is_empty() {
            tracing::warn!("No Twitter lists configured, nothing to fetch");
            return Ok(Vec::new());
        }

        let mut posts = Vec::new();
        for list_id in &config.options.list_ids {
            match self
                .fetch_list(list_id, config.options.page_size, &token)
                .await
            {
                Ok(batch) => posts.extend(batch),
                Err(e) => {
                    tracing::warn!(list_id = %list_id, error = %e, "Skipping Twitter list");
                }
            }
        }

        tracing::debug!(count = posts.len(), "Fetched tweets");
        Ok(posts)
    }

    async fn fetch_latest(&self, config: &SourceConfig) -> Result<Option<Post>, FetchError> {
        let token = self.token()?.to_string();
        let Some(list_id) = config.options.list_ids.first() else {
            return Ok(None);
        };
        let mut posts = self.fetch_list(list_id, 1, &token).await?;
        if posts.is_empty() {
            Ok(None)
        } else {
            Ok(Some(posts.swap_remove(0)))
        }
    }
}
