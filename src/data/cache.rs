//! Tag-indexed follow cache
//!
//! Cache-aside layer for status, list, and suggestion lookups. Entries are
//! volatile and cleared on restart. Uses Moka for high-performance concurrent
//! caching, with an explicit tag → key-set index for bulk invalidation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use tokio::sync::RwLock;

use super::models::{Account, FollowerEntry, FollowingEntry, Page};

/// Typed cached values
///
/// One enum instead of per-lookup caches: every entry shares the tag index,
/// so a single tag invalidation sweeps status, list, and suggestion entries
/// together.
#[derive(Debug, Clone)]
pub enum CachedValue {
    /// Result of an is-following lookup
    FollowStatus(bool),
    /// Computed suggestion list
    Suggestions(Vec<Account>),
    /// Page of a following listing
    FollowingPage(Page<FollowingEntry>),
    /// Page of a followers listing
    FollowersPage(Page<FollowerEntry>),
}

impl CachedValue {
    /// Metric label for hit/miss accounting
    fn cache_name(&self) -> &'static str {
        match self {
            Self::FollowStatus(_) => "status",
            Self::Suggestions(_) => "suggestions",
            Self::FollowingPage(_) | Self::FollowersPage(_) => "list",
        }
    }
}

#[derive(Clone)]
struct CacheEntry {
    value: Arc<CachedValue>,
    ttl: Duration,
}

/// Per-entry TTL policy: each entry expires `entry.ttl` after insertion.
struct EntryTtl;

impl Expiry<String, CacheEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Tag-indexed cache-aside store
///
/// `set` indexes the key under each tag; `invalidate_tags` removes every key
/// indexed under any given tag. Once invalidation for a tag returns, a get
/// never serves the invalidated value again.
pub struct FollowCache {
    /// Query signature -> entry
    entries: Cache<String, CacheEntry>,
    /// Tag -> keys indexed under it
    tag_index: RwLock<HashMap<String, HashSet<String>>>,
}

impl FollowCache {
    /// Create a new follow cache
    ///
    /// # Arguments
    /// * `max_entries` - Maximum number of cached values (LRU beyond that)
    pub fn new(max_entries: usize) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries as u64)
            .expire_after(EntryTtl)
            .build();

        Self {
            entries,
            tag_index: RwLock::new(HashMap::new()),
        }
    }

    /// Get a cached value by key
    pub async fn get(&self, key: &str) -> Option<Arc<CachedValue>> {
        let result = self.entries.get(key).await.map(|entry| entry.value);

        use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};
        match &result {
            Some(value) => CACHE_HITS_TOTAL
                .with_label_values(&[value.cache_name()])
                .inc(),
            None => CACHE_MISSES_TOTAL.with_label_values(&["all"]).inc(),
        }

        result
    }

    /// Insert a value and index its key under each tag
    pub async fn set(&self, key: &str, value: CachedValue, ttl: Duration, tags: &[String]) {
        let entry = CacheEntry {
            value: Arc::new(value),
            ttl,
        };
        self.entries.insert(key.to_string(), entry).await;

        let mut index = self.tag_index.write().await;
        for tag in tags {
            index
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        drop(index);

        use crate::metrics::CACHE_SIZE;
        CACHE_SIZE.set(self.entries.entry_count() as i64);
    }

    /// Remove every key indexed under any of the given tags
    pub async fn invalidate_tags(&self, tags: &[String]) {
        let keys: Vec<String> = {
            let mut index = self.tag_index.write().await;
            let mut keys = HashSet::new();
            for tag in tags {
                if let Some(tagged) = index.remove(tag) {
                    keys.extend(tagged);
                }
            }
            keys.into_iter().collect()
        };

        for key in &keys {
            self.entries.invalidate(key).await;
        }

        use crate::metrics::CACHE_INVALIDATIONS_TOTAL;
        CACHE_INVALIDATIONS_TOTAL.inc_by(keys.len() as u64);

        if !keys.is_empty() {
            tracing::debug!(tags = ?tags, invalidated = keys.len(), "cache tags invalidated");
        }
    }

    /// Drop tag-index entries whose keys have expired from the cache
    ///
    /// Should be called periodically: TTL expiry evicts entries without
    /// touching the index, so the index is the only unbounded side.
    pub async fn maintain(&self) {
        self.entries.run_pending_tasks().await;

        let mut index = self.tag_index.write().await;
        let before: usize = index.values().map(HashSet::len).sum();
        for keys in index.values_mut() {
            keys.retain(|key| self.entries.contains_key(key));
        }
        index.retain(|_, keys| !keys.is_empty());
        let after: usize = index.values().map(HashSet::len).sum();
        drop(index);

        use crate::metrics::CACHE_SIZE;
        CACHE_SIZE.set(self.entries.entry_count() as i64);

        if before > after {
            tracing::debug!("Pruned {} stale tag index entries", before - after);
        }
    }

    /// Get cache statistics
    pub async fn stats(&self) -> FollowCacheStats {
        let index = self.tag_index.read().await;
        FollowCacheStats {
            entry_count: self.entries.entry_count(),
            tag_count: index.len(),
        }
    }
}

/// Follow cache statistics
#[derive(Debug, Clone)]
pub struct FollowCacheStats {
    /// Approximate number of cached values
    pub entry_count: u64,
    /// Number of distinct tags in the index
    pub tag_count: usize,
}

// =============================================================================
// Key and tag derivation
// =============================================================================

/// Key for an is-following lookup
pub fn status_key(follower_id: &str, following_id: &str) -> String {
    format!("follow:status:{follower_id}:{following_id}")
}

/// Key for a suggestion list
pub fn suggestions_key(user_id: &str) -> String {
    format!("follow:suggestions:{user_id}")
}

/// Key for one page of a relationship listing; every parameter that shapes
/// the result participates in the signature.
pub fn list_key(
    direction: &str,
    user_id: &str,
    viewer_id: Option<&str>,
    page: usize,
    limit: usize,
    sort_by: &str,
    sort_order: &str,
    search: Option<&str>,
) -> String {
    format!(
        "follow:list:{direction}:{user_id}:{}:{page}:{limit}:{sort_by}:{sort_order}:{}",
        viewer_id.unwrap_or("-"),
        search.unwrap_or("-"),
    )
}

/// Tag covering everything about an account
pub fn user_tag(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// Tag covering an account's outgoing-edge views
pub fn following_tag(user_id: &str) -> String {
    format!("user:{user_id}:following")
}

/// Tag covering an account's incoming-edge views
pub fn followers_tag(user_id: &str) -> String {
    format!("user:{user_id}:followers")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = FollowCache::new(100);

        let key = status_key("a", "b");
        cache
            .set(
                &key,
                CachedValue::FollowStatus(true),
                Duration::from_secs(60),
                &[user_tag("a"), user_tag("b")],
            )
            .await;

        let value = cache.get(&key).await.expect("entry should be cached");
        assert!(matches!(*value, CachedValue::FollowStatus(true)));
    }

    #[tokio::test]
    async fn test_invalidate_by_tag_removes_all_tagged_keys() {
        let cache = FollowCache::new(100);
        let ttl = Duration::from_secs(60);

        cache
            .set(
                &status_key("a", "b"),
                CachedValue::FollowStatus(false),
                ttl,
                &[user_tag("a"), following_tag("a")],
            )
            .await;
        cache
            .set(
                &suggestions_key("a"),
                CachedValue::Suggestions(Vec::new()),
                ttl,
                &[user_tag("a"), following_tag("a")],
            )
            .await;
        cache
            .set(
                &status_key("c", "d"),
                CachedValue::FollowStatus(true),
                ttl,
                &[user_tag("c")],
            )
            .await;

        cache.invalidate_tags(&[following_tag("a")]).await;

        assert!(cache.get(&status_key("a", "b")).await.is_none());
        assert!(cache.get(&suggestions_key("a")).await.is_none());
        // Unrelated tag untouched
        assert!(cache.get(&status_key("c", "d")).await.is_some());
    }

    #[tokio::test]
    async fn test_per_entry_ttl_expires() {
        let cache = FollowCache::new(100);

        cache
            .set(
                &status_key("a", "b"),
                CachedValue::FollowStatus(true),
                Duration::from_millis(50),
                &[user_tag("a")],
            )
            .await;
        cache
            .set(
                &status_key("a", "c"),
                CachedValue::FollowStatus(true),
                Duration::from_secs(60),
                &[user_tag("a")],
            )
            .await;

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cache.get(&status_key("a", "b")).await.is_none());
        assert!(cache.get(&status_key("a", "c")).await.is_some());
    }

    #[tokio::test]
    async fn test_maintain_prunes_stale_index_entries() {
        let cache = FollowCache::new(100);

        cache
            .set(
                &status_key("a", "b"),
                CachedValue::FollowStatus(true),
                Duration::from_millis(10),
                &[user_tag("a")],
            )
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.maintain().await;

        let stats = cache.stats().await;
        assert_eq!(stats.tag_count, 0);
    }
}
