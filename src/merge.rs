//! Merge and deduplication of fanned-in fetch results.
//!
//! Dedup is order-preserving with first-seen-wins semantics: identical
//! items can legitimately arrive twice when differently-configured probes
//! hit the same adapter, and the first occurrence is the one we keep.
//! The sort is stable so posts with equal (often coarse) upstream
//! timestamps keep their relative input order.

use crate::model::{Post, Source};
use std::collections::{HashMap, HashSet};

/// Per-source summary used for UI counts, not correctness-critical logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceStats {
    pub count: usize,
    /// Max timestamp (ms) among this source's posts.
    pub latest_ms: i64,
}

/// Collapse a raw batch to unique posts, newest first.
///
/// Duplicate ids keep the first occurrence; the result is sorted by
/// `timestamp_ms` descending with a stable tie-break.
pub fn merge(posts: Vec<Post>) -> Vec<Post> {
    let mut seen = HashSet::with_capacity(posts.len());
    let mut unique: Vec<Post> = posts
        .into_iter()
        .filter(|post| seen.insert(post.id.clone()))
        .collect();
    unique.sort_by_key(|post| std::cmp::Reverse(post.timestamp_ms));
    unique
}

/// Group posts by source, reporting cardinality and max timestamp.
pub fn stats_by_source(posts: &[Post]) -> HashMap<Source, SourceStats> {
    let mut stats: HashMap<Source, SourceStats> = HashMap::new();
    for post in posts {
        let entry = stats.entry(post.source).or_insert(SourceStats {
            count: 0,
            latest_ms: 0,
        });
        entry.count += 1;
        entry.latest_ms = entry.latest_ms.max(post.timestamp_ms);
    }
    stats
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn post(id: &str, source: Source, ts: i64) -> Post {
        Post {
            id: id.to_string(),
            source,
            title: format!("title {}", id),
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

    #[test]
    fn test_merge_collapses_duplicates_first_wins() {
        let mut first = post("reddit:1", Source::Reddit, 100);
        first.title = "kept".into();
        let mut dup = post("reddit:1", Source::Reddit, 100);
        dup.title = "dropped".into();

        let merged = merge(vec![first, dup]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "kept");
    }

    #[test]
    fn test_merge_sorts_newest_first() {
        let merged = merge(vec![
            post("hackernews:1", Source::HackerNews, 100),
            post("reddit:2", Source::Reddit, 300),
            post("twitter:3", Source::Twitter, 200),
        ]);
        let timestamps: Vec<i64> = merged.iter().map(|p| p.timestamp_ms).collect();
        assert_eq!(timestamps, vec![300, 200, 100]);
    }

    #[test]
    fn test_merge_equal_timestamps_keep_input_order() {
        let merged = merge(vec![
            post("reddit:a", Source::Reddit, 500),
            post("reddit:b", Source::Reddit, 500),
            post("reddit:c", Source::Reddit, 500),
        ]);
        let ids: Vec<&str> = merged.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["reddit:a", "reddit:b", "reddit:c"]);
    }

    #[test]
    fn test_merge_worked_example() {
        // A contributes one item, C contributes a duplicated pair; the
        // merged result collapses the duplicate and sorts newest first.
        let merged = merge(vec![
            post("a:1", Source::HackerNews, 100),
            post("c:1", Source::Reddit, 200),
            post("c:1", Source::Reddit, 200),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, "c:1");
        assert_eq!(merged[1].id, "a:1");
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge(Vec::new()).is_empty());
    }

    #[test]
    fn test_stats_by_source() {
        let posts = vec![
            post("hackernews:1", Source::HackerNews, 100),
            post("hackernews:2", Source::HackerNews, 400),
            post("reddit:3", Source::Reddit, 250),
        ];
        let stats = stats_by_source(&posts);
        assert_eq!(stats.len(), 2);
        assert_eq!(
            stats[&Source::HackerNews],
            SourceStats {
                count: 2,
                latest_ms: 400
            }
        );
        assert_eq!(
            stats[&Source::Reddit],
            SourceStats {
                count: 1,
                latest_ms: 250
            }
        );
    }

    #[test]
    fn test_stats_empty() {
        assert!(stats_by_source(&[]).is_empty());
    }

    proptest! {
        #[test]
        fn prop_merge_output_has_unique_ids(
            ids in proptest::collection::vec(0u8..20, 0..40),
            timestamps in proptest::collection::vec(0i64..1000, 0..40),
        ) {
            let posts: Vec<Post> = ids
                .iter()
                .zip(timestamps.iter().cycle())
                .map(|(id, ts)| post(&format!("reddit:{}", id), Source::Reddit, *ts))
                .collect();
            let merged = merge(posts);

            let mut seen = HashSet::new();
            for p in &merged {
                prop_assert!(seen.insert(p.id.clone()), "duplicate id {}", p.id);
            }
        }

        #[test]
        fn prop_merge_output_sorted_non_increasing(
            timestamps in proptest::collection::vec(0i64..1_000_000, 0..40),
        ) {
            let posts: Vec<Post> = timestamps
                .iter()
                .enumerate()
                .map(|(i, ts)| post(&format!("reddit:{}", i), Source::Reddit, *ts))
                .collect();
            let merged = merge(posts);

            for pair in merged.windows(2) {
                prop_assert!(pair[0].timestamp_ms >= pair[1].timestamp_ms);
            }
        }

        #[test]
        fn prop_merge_ties_stay_stable(
            count in 1usize..30,
        ) {
            // All posts share one timestamp; dedup + stable sort must not
            // reorder anything.
            let posts: Vec<Post> = (0..count)
                .map(|i| post(&format!("reddit:{}", i), Source::Reddit, 42))
                .collect();
            let expected: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
            let merged = merge(posts);
            let got: Vec<String> = merged.iter().map(|p| p.id.clone()).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
