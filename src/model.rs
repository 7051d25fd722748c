//! Canonical data model shared by adapters, the merger, and the ledger.
//!
//! A [`Post`] is created fresh on every fetch and never mutated after an
//! adapter produces it. Identity lives entirely in the `id` string, which
//! is namespaced as `"<source>:<native-id>"` so items from different
//! upstreams can never collide.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Source
// ============================================================================

/// The fixed set of upstream content sources.
///
/// Adding a source means adding a variant here plus an adapter that
/// reports it; nothing else in the core needs to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    HackerNews,
    Reddit,
    Twitter,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::HackerNews => "hackernews",
            Source::Reddit => "reddit",
            Source::Twitter => "twitter",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown source: {0}")]
pub struct UnknownSource(String);

impl FromStr for Source {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hackernews" => Ok(Source::HackerNews),
            "reddit" => Ok(Source::Reddit),
            "twitter" => Ok(Source::Twitter),
            other => Err(UnknownSource(other.to_string())),
        }
    }
}

// ============================================================================
// Post
// ============================================================================

/// Structured embed descriptor, tagged by kind.
///
/// Each variant carries only the fields its renderer needs; the core
/// passes these through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Embed {
    Reddit { post_id: String, subreddit: String },
    Tweet { tweet_id: String },
    HackerNews { story_id: String },
}

/// A canonical, source-tagged content record produced by an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Globally unique identifier, namespaced as `"<source>:<native-id>"`.
    pub id: String,
    pub source: Source,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub author: String,
    /// Milliseconds since the Unix epoch. Required; drives the merge order.
    pub timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
}

impl Post {
    /// Build the namespaced identifier for a native upstream id.
    pub fn make_id(source: Source, native_id: &str) -> String {
        format!("{}:{}", source.as_str(), native_id)
    }

    /// The upstream-native identifier, with the source namespace stripped.
    ///
    /// Ids that were never namespaced are returned whole, so ledger
    /// lookups still behave sensibly on malformed input.
    pub fn native_id(&self) -> &str {
        match self
            .id
            .strip_prefix(self.source.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
        {
            Some(native) if !native.is_empty() => native,
            _ => &self.id,
        }
    }
}

// ============================================================================
// Source configuration
// ============================================================================

/// How the ledger tracks seen state for a source.
///
/// `Ids` is canonical: it keeps a bounded set of recently surfaced
/// native identifiers and survives upstream resurfacing older items.
/// `Watermark` compares timestamps only and silently drops anything an
/// upstream re-promotes with an old timestamp — use it only for sources
/// without stable identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeenStrategy {
    #[default]
    Ids,
    Watermark,
}

/// Per-source options, opaque to the core and consumed only by adapters
/// (and the ledger, for the seen strategy).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceOptions {
    /// Subreddit names for the Reddit adapter (no `r/` prefix).
    pub subreddits: Vec<String>,
    /// List ids for the Twitter adapter.
    pub list_ids: Vec<String>,
    /// Items requested per page on a full fetch.
    pub page_size: u32,
    pub seen_strategy: SeenStrategy,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            subreddits: Vec::new(),
            list_ids: Vec::new(),
            page_size: 25,
            seen_strategy: SeenStrategy::Ids,
        }
    }
}

/// One enabled (or disabled) source in the aggregate request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source: Source,
    /// Listing a source implies enabling it unless said otherwise.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub options: SourceOptions,
}

fn default_enabled() -> bool {
    true
}

impl SourceConfig {
    pub fn enabled(source: Source) -> Self {
        Self {
            source,
            enabled: true,
            options: SourceOptions::default(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
