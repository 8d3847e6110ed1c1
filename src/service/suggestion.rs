//! Follow suggestions
//!
//! Mutual-connection ranking over the graph: candidates are accounts
//! followed by the user's followees, ranked by how many followees follow
//! them. Users following nobody get a popularity fallback.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::data::{
    Account, CachedValue, EntityId, FollowCache, FollowStore, following_tag, suggestions_key,
    user_tag,
};
use crate::error::AppError;

/// Hard cap on requested suggestion counts
pub const MAX_SUGGESTIONS: usize = 50;
/// How many followees the candidate scan walks at most
const FOLLOWING_SCAN_CAP: usize = 100;
/// TTL for cached suggestion lists
const SUGGESTION_CACHE_TTL: Duration = Duration::from_secs(300);

/// Suggestion engine
pub struct SuggestionEngine {
    store: Arc<FollowStore>,
    cache: Arc<FollowCache>,
}

impl SuggestionEngine {
    /// Create new suggestion engine
    pub fn new(store: Arc<FollowStore>, cache: Arc<FollowCache>) -> Self {
        Self { store, cache }
    }

    /// Compute follow suggestions for a user
    ///
    /// `limit` is clamped to [`MAX_SUGGESTIONS`]. Results are cached under
    /// the user's following tag, so any follow/unfollow by the user drops
    /// them.
    ///
    /// Ties in the mutual-connection ranking break by first-discovered
    /// order: stable within one candidate scan, not guaranteed identical
    /// across scans.
    pub async fn suggestions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Account>, AppError> {
        EntityId::validate(user_id)?;
        let limit = limit.min(MAX_SUGGESTIONS);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let key = suggestions_key(user_id);
        if let Some(value) = self.cache.get(&key).await {
            if let CachedValue::Suggestions(cached) = value.as_ref() {
                if !cached.is_empty() {
                    return Ok(cached.iter().take(limit).cloned().collect());
                }
            }
        }

        let following = self
            .store
            .following_ids(user_id, Some(FOLLOWING_SCAN_CAP))
            .await?;

        let suggestions = if following.is_empty() {
            self.store.top_public_accounts(user_id, limit).await?
        } else {
            self.ranked_by_mutual_connections(user_id, &following, limit)
                .await?
        };

        self.cache
            .set(
                &key,
                CachedValue::Suggestions(suggestions.clone()),
                SUGGESTION_CACHE_TTL,
                &[user_tag(user_id), following_tag(user_id)],
            )
            .await;

        use crate::metrics::SUGGESTIONS_COMPUTED_TOTAL;
        SUGGESTIONS_COMPUTED_TOTAL.inc();

        Ok(suggestions)
    }

    /// One scan over the followees' edges, counted per candidate.
    async fn ranked_by_mutual_connections(
        &self,
        user_id: &str,
        following: &[String],
        limit: usize,
    ) -> Result<Vec<Account>, AppError> {
        let scanned = self.store.followed_by_any(following, user_id).await?;

        let excluded: HashSet<&str> = following.iter().map(String::as_str).collect();

        // Count connections per candidate, remembering discovery order for
        // stable tie-breaking.
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (index, candidate) in scanned.iter().enumerate() {
            if excluded.contains(candidate.as_str()) {
                continue;
            }
            let entry = counts.entry(candidate.as_str()).or_insert((0, index));
            entry.0 += 1;
        }

        let mut ranked: Vec<(&str, usize, usize)> = counts
            .into_iter()
            .map(|(id, (count, first_seen))| (id, count, first_seen))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        let winner_ids: Vec<String> = ranked
            .into_iter()
            .take(limit)
            .map(|(id, _, _)| id.to_string())
            .collect();
        if winner_ids.is_empty() {
            return Ok(Vec::new());
        }

        // Fetch rows and restore rank order
        let rank: HashMap<&str, usize> = winner_ids
            .iter()
            .enumerate()
            .map(|(position, id)| (id.as_str(), position))
            .collect();
        let mut accounts = self.store.accounts_by_ids(&winner_ids).await?;
        accounts.sort_by_key(|account| rank.get(account.id.as_str()).copied().unwrap_or(usize::MAX));

        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    async fn create_test_engine() -> (SuggestionEngine, Arc<FollowStore>, Arc<FollowCache>, TempDir)
    {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("service-suggestion.db");
        let store = Arc::new(FollowStore::connect(&db_path).await.unwrap());
        let cache = Arc::new(FollowCache::new(1000));
        let engine = SuggestionEngine::new(store.clone(), cache.clone());
        (engine, store, cache, temp_dir)
    }

    fn account(username: &str, followers_count: i64, is_public: bool) -> Account {
        Account {
            id: EntityId::new().0,
            username: username.to_string(),
            display_name: Some(username.to_string()),
            is_public,
            allow_friend_requests: true,
            followers_count,
            following_count: 0,
            created_at: Utc::now(),
        }
    }

    async fn seed(store: &FollowStore, accounts: &[Account]) {
        for account in accounts {
            store.insert_account(account).await.unwrap();
        }
    }

    #[tokio::test]
    async fn mutual_connection_count_drives_ranking() {
        let (engine, store, _cache, _temp_dir) = create_test_engine().await;

        let a = account("alice", 0, true);
        let x = account("xavier", 0, true);
        let y = account("yann", 0, true);
        let z = account("zoe", 0, true);
        let w = account("walt", 0, true);
        seed(&store, &[a.clone(), x.clone(), y.clone(), z.clone(), w.clone()]).await;

        store.insert_edge(&a.id, &x.id).await.unwrap();
        store.insert_edge(&a.id, &y.id).await.unwrap();
        // Both followees follow Z, only one follows W
        store.insert_edge(&x.id, &z.id).await.unwrap();
        store.insert_edge(&y.id, &z.id).await.unwrap();
        store.insert_edge(&x.id, &w.id).await.unwrap();

        let suggestions = engine.suggestions(&a.id, 10).await.unwrap();
        let ids: Vec<&str> = suggestions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![z.id.as_str(), w.id.as_str()]);
    }

    #[tokio::test]
    async fn suggestions_exclude_self_and_already_followed() {
        let (engine, store, _cache, _temp_dir) = create_test_engine().await;

        let a = account("alice", 0, true);
        let x = account("xavier", 0, true);
        let y = account("yann", 0, true);
        seed(&store, &[a.clone(), x.clone(), y.clone()]).await;

        store.insert_edge(&a.id, &x.id).await.unwrap();
        store.insert_edge(&a.id, &y.id).await.unwrap();
        // X follows A (self candidate) and Y (already followed)
        store.insert_edge(&x.id, &a.id).await.unwrap();
        store.insert_edge(&x.id, &y.id).await.unwrap();

        let suggestions = engine.suggestions(&a.id, 10).await.unwrap();
        assert!(suggestions.is_empty());
    }

    #[tokio::test]
    async fn empty_following_falls_back_to_popular_accounts() {
        let (engine, store, _cache, _temp_dir) = create_test_engine().await;

        let a = account("alice", 100, true);
        let b = account("bob", 5, true);
        let c = account("carol", 3, true);
        let d = account("dave", 1, true);
        let hidden = account("hidden", 50, false);
        seed(
            &store,
            &[a.clone(), b.clone(), c.clone(), d.clone(), hidden.clone()],
        )
        .await;

        let suggestions = engine.suggestions(&a.id, 5).await.unwrap();
        let ids: Vec<&str> = suggestions.iter().map(|s| s.id.as_str()).collect();
        // Popularity order, private accounts and self excluded
        assert_eq!(ids, vec![b.id.as_str(), c.id.as_str(), d.id.as_str()]);
    }

    #[tokio::test]
    async fn limit_is_clamped() {
        let (engine, store, _cache, _temp_dir) = create_test_engine().await;

        let user = account("alice", 0, true);
        let mut seeded = vec![user.clone()];
        for index in 0..60 {
            seeded.push(account(&format!("acct{index}"), index, true));
        }
        seed(&store, &seeded).await;

        let suggestions = engine.suggestions(&user.id, 200).await.unwrap();
        assert_eq!(suggestions.len(), MAX_SUGGESTIONS);
    }

    #[tokio::test]
    async fn suggestions_are_cached_until_tag_invalidation() {
        let (engine, store, cache, _temp_dir) = create_test_engine().await;

        let a = account("alice", 0, true);
        let b = account("bob", 5, true);
        let c = account("carol", 9, true);
        seed(&store, &[a.clone(), b.clone(), c.clone()]).await;

        let first = engine.suggestions(&a.id, 10).await.unwrap();
        assert_eq!(first[0].id, c.id);

        // A new edge changes the graph, but the cached list still serves
        store.insert_edge(&a.id, &c.id).await.unwrap();
        let cached = engine.suggestions(&a.id, 10).await.unwrap();
        assert_eq!(cached[0].id, c.id);

        // Tag invalidation (what follow() performs) drops the stale list
        cache.invalidate_tags(&[following_tag(&a.id)]).await;
        let fresh = engine.suggestions(&a.id, 10).await.unwrap();
        assert!(fresh.iter().all(|s| s.id != c.id));
    }
}
