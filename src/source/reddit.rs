use super::{send_checked, FetchError, SourceAdapter};
use crate::model::{Embed, Post, Source, SourceConfig};
use async_trait::async_trait;
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://www.reddit.com";
const USER_AGENT: &str = "decant/0.1";

/// Script-app credentials for the password grant.
///
/// Read from the environment only; they are never logged and never
/// written to any config file.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl RedditCredentials {
    /// Returns `None` unless all four variables are set and non-empty.
    pub fn from_env() -> Option<Self> {
        let get = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Some(Self {
            client_id: get("REDDIT_CLIENT_ID")?,
            client_secret: get("REDDIT_CLIENT_SECRET")?,
            username: get("REDDIT_USERNAME")?,
            password: get("REDDIT_PASSWORD")?,
        })
    }
}

/// Reddit adapter.
///
/// Authenticates with the password grant, then reads either the account's
/// home feed or each configured subreddit's new-listing. A fresh token is
/// requested per fetch; refresh cycles are minutes apart, so caching the
/// hour-long token buys nothing.
pub struct RedditAdapter {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<RedditCredentials>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: RedditItem,
}

#[derive(Debug, Deserialize)]
struct RedditItem {
    id: String,
    title: String,
    url: Option<String>,
    author: String,
    created_utc: f64,
    score: Option<i64>,
    num_comments: Option<u32>,
    subreddit: String,
    permalink: String,
    thumbnail: Option<String>,
    #[serde(default)]
    is_self: bool,
    selftext: Option<String>,
}

impl RedditAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials: RedditCredentials::from_env(),
        }
    }

    /// Explicit endpoint and credentials (tests).
    pub fn with_base_url(
        client: reqwest::Client,
        base_url: impl Into<String>,
        credentials: RedditCredentials,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            credentials: Some(credentials),
        }
    }

    async fn access_token(&self, creds: &RedditCredentials) -> Result<String, FetchError> {
        let url = format!("{}/api/v1/access_token", self.base_url);
        let response = send_checked(
            self.client
                .post(&url)
                .basic_auth(&creds.client_id, Some(&creds.client_secret))
                .header("User-Agent", USER_AGENT)
                .form(&[
                    ("grant_type", "password"),
                    ("username", creds.username.as_str()),
                    ("password", creds.password.as_str()),
                ]),
        )
        .await?;

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("token response: {}", e)))?;
        token
            .access_token
            .ok_or_else(|| FetchError::Auth("token response had no access_token".to_string()))
    }

    async fn fetch_listing(&self, endpoint: &str, token: &str) -> Result<Vec<Post>, FetchError> {
        let response = send_checked(
            self.client
                .get(endpoint)
                .bearer_auth(token)
                .header("User-Agent", USER_AGENT),
        )
        .await?;

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("listing: {}", e)))?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| Self::convert(child.data))
            .collect())
    }

    fn convert(item: RedditItem) -> Post {
        // Placeholder thumbnail values are keywords, not URLs.
        let thumbnail = item.thumbnail.filter(|t| {
            !t.is_empty() && !matches!(t.as_str(), "self" | "default" | "nsfw" | "spoiler")
        });
        let (url, content) = if item.is_self {
            (None, item.selftext.filter(|s| !s.is_empty()))
        } else {
            (item.url, None)
        };

        Post {
            id: Post::make_id(Source::Reddit, &item.id),
            source: Source::Reddit,
            title: item.title,
            url,
            content,
            author: item.author,
            timestamp_ms: (item.created_utc * 1000.0) as i64,
            score: item.score,
            comments_count: item.num_comments,
            comments_url: Some(format!("{}{}", DEFAULT_BASE_URL, item.permalink)),
            thumbnail,
            embed: Some(Embed::Reddit {
                post_id: item.id,
                subreddit: item.subreddit,
            }),
        }
    }
}

#[async_trait]
impl SourceAdapter for RedditAdapter {
    fn source(&self) -> Source {
        Source::Reddit
    }

    async fn fetch_posts(&self, config: &SourceConfig) -> Result<Vec<Post>, FetchError> {
        let Some(creds) = &self.credentials else {
            return Err(FetchError::Auth(
                "Reddit credentials not configured (REDDIT_CLIENT_ID et al.)".to_string(),
            ));
        };
        let token = self.access_token(creds).await?;
        let limit = config.options.page_size;

        let mut posts = Vec::new();
        if config.options.subreddits.is_empty() {
            let endpoint = format!("{}/.json?limit={}", self.base_url, limit);
            posts.extend(self.fetch_listing(&endpoint, &token).await?);
        } else {
            for subreddit in &config.options.subreddits {
                let endpoint = format!("{}/r/{}/new.json?limit={}", self.base_url, subreddit, limit);
                match self.fetch_listing(&endpoint, &token).await {
                    Ok(batch) => posts.extend(batch),
                    Err(e) => {
                        // One bad subreddit should not sink the others.
                        tracing::warn!(subreddit = %subreddit, error = %e, "Skipping subreddit");
                    }
                }
            }
        }

        tracing::debug!(count = posts.len(), "Fetched Reddit posts");
        Ok(posts)
    }
}
