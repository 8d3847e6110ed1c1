//! Follow analytics
//!
//! Combines the denormalized counters, edge timestamps, and the audit trail
//! into per-account statistics. Unfollow counts come from audit entries:
//! edges are hard-deleted, so nothing else records them.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::data::{
    ACTION_UNFOLLOW, AuditLog, AuditQuery, CATEGORY_USER_MANAGEMENT, EntityId, FollowAnalytics,
    FollowStats, FollowStore, MAX_QUERY_LIMIT,
};
use crate::error::AppError;

/// How many top followers the analytics report lists
const TOP_FOLLOWERS_LIMIT: usize = 10;

/// Analytics aggregator
pub struct AnalyticsAggregator {
    store: Arc<FollowStore>,
    audit: Arc<AuditLog>,
}

impl AnalyticsAggregator {
    /// Create new analytics aggregator
    pub fn new(store: Arc<FollowStore>, audit: Arc<AuditLog>) -> Self {
        Self { store, audit }
    }

    /// O(1) counter read
    ///
    /// # Errors
    /// `NotFound` for a missing account.
    pub async fn stats(&self, user_id: &str) -> Result<FollowStats, AppError> {
        EntityId::validate(user_id)?;

        let account = self
            .store
            .get_account(user_id)
            .await?
            .ok_or(AppError::NotFound)?;

        Ok(FollowStats {
            followers_count: account.followers_count,
            following_count: account.following_count,
        })
    }

    /// Time-windowed analytics report
    ///
    /// New-follower counts come from edge timestamps; unfollow counts from
    /// the audit trail, classified into the 7/30-day buckets client-side.
    pub async fn analytics(&self, user_id: &str) -> Result<FollowAnalytics, AppError> {
        EntityId::validate(user_id)?;

        let account = self
            .store
            .get_account(user_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let now = Utc::now();
        let seven_days_ago = now - Duration::days(7);
        let thirty_days_ago = now - Duration::days(30);

        let new_followers_7d = self
            .store
            .count_new_followers_since(user_id, seven_days_ago)
            .await?;
        let new_followers_30d = self
            .store
            .count_new_followers_since(user_id, thirty_days_ago)
            .await?;

        let unfollow_entries = self
            .audit
            .query(&AuditQuery {
                actor_id: Some(user_id.to_string()),
                category: Some(CATEGORY_USER_MANAGEMENT.to_string()),
                action: Some(ACTION_UNFOLLOW.to_string()),
                since: Some(thirty_days_ago),
                limit: MAX_QUERY_LIMIT,
            })
            .await?;

        let mut unfollows_7d = 0;
        let mut unfollows_30d = 0;
        for entry in &unfollow_entries {
            if entry.created_at >= seven_days_ago {
                unfollows_7d += 1;
            }
            if entry.created_at >= thirty_days_ago {
                unfollows_30d += 1;
            }
        }

        let top_followers = self.store.top_followers(user_id, TOP_FOLLOWERS_LIMIT).await?;

        Ok(FollowAnalytics {
            followers_count: account.followers_count,
            following_count: account.following_count,
            new_followers_7d,
            new_followers_30d,
            unfollows_7d,
            unfollows_30d,
            top_followers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Account;
    use tempfile::TempDir;

    async fn create_test_aggregator() -> (AnalyticsAggregator, Arc<FollowStore>, Arc<AuditLog>, TempDir)
    {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("service-analytics.db");
        let store = Arc::new(FollowStore::connect(&db_path).await.unwrap());
        let audit = Arc::new(AuditLog::new(store.pool().clone()));
        let aggregator = AnalyticsAggregator::new(store.clone(), audit.clone());
        (aggregator, store, audit, temp_dir)
    }

    fn account(username: &str, followers_count: i64) -> Account {
        Account {
            id: EntityId::new().0,
            username: username.to_string(),
            display_name: Some(username.to_string()),
            is_public: true,
            allow_friend_requests: true,
            followers_count,
            following_count: 0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn stats_reads_denormalized_counters() {
        let (aggregator, store, _audit, _temp_dir) = create_test_aggregator().await;

        let a = account("alice", 0);
        let b = account("bob", 0);
        store.insert_account(&a).await.unwrap();
        store.insert_account(&b).await.unwrap();
        store.insert_edge(&a.id, &b.id).await.unwrap();

        let stats = aggregator.stats(&b.id).await.unwrap();
        assert_eq!(stats.followers_count, 1);
        assert_eq!(stats.following_count, 0);
    }

    #[tokio::test]
    async fn stats_missing_account_fails() {
        let (aggregator, _store, _audit, _temp_dir) = create_test_aggregator().await;

        let error = aggregator.stats(&EntityId::new().0).await.unwrap_err();
        assert!(matches!(error, AppError::NotFound));
    }

    #[tokio::test]
    async fn new_follower_windows_respect_edge_age() {
        let (aggregator, store, _audit, _temp_dir) = create_test_aggregator().await;

        let a = account("alice", 0);
        let b = account("bob", 0);
        let c = account("carol", 0);
        store.insert_account(&a).await.unwrap();
        store.insert_account(&b).await.unwrap();
        store.insert_account(&c).await.unwrap();

        store.insert_edge(&b.id, &a.id).await.unwrap();
        store.insert_edge(&c.id, &a.id).await.unwrap();

        // Backdate one edge to 10 days ago: outside 7d, inside 30d
        let ten_days_ago = Utc::now() - Duration::days(10);
        sqlx::query(
            "UPDATE follow_edges SET created_at = ? WHERE follower_id = ? AND following_id = ?",
        )
        .bind(ten_days_ago)
        .bind(&c.id)
        .bind(&a.id)
        .execute(store.pool())
        .await
        .unwrap();

        let analytics = aggregator.analytics(&a.id).await.unwrap();
        assert_eq!(analytics.new_followers_7d, 1);
        assert_eq!(analytics.new_followers_30d, 2);
    }

    #[tokio::test]
    async fn unfollow_counts_come_from_audit_trail() {
        let (aggregator, store, audit, _temp_dir) = create_test_aggregator().await;

        let a = account("alice", 0);
        store.insert_account(&a).await.unwrap();

        audit
            .record(&a.id, ACTION_UNFOLLOW, serde_json::json!({"following_id": "x"}))
            .await
            .unwrap();
        audit
            .record(&a.id, ACTION_UNFOLLOW, serde_json::json!({"following_id": "y"}))
            .await
            .unwrap();
        // A different action must not count
        audit
            .record(&a.id, "follow", serde_json::json!({"following_id": "z"}))
            .await
            .unwrap();

        // Backdate one unfollow to 10 days ago
        let ten_days_ago = Utc::now() - Duration::days(10);
        sqlx::query(
            "UPDATE audit_entries SET created_at = ? WHERE actor_id = ? AND action = ? \
             AND metadata LIKE '%\"y\"%'",
        )
        .bind(ten_days_ago)
        .bind(&a.id)
        .bind(ACTION_UNFOLLOW)
        .execute(store.pool())
        .await
        .unwrap();

        let analytics = aggregator.analytics(&a.id).await.unwrap();
        assert_eq!(analytics.unfollows_7d, 1);
        assert_eq!(analytics.unfollows_30d, 2);
    }

    #[tokio::test]
    async fn top_followers_ranked_by_their_own_reach() {
        let (aggregator, store, _audit, _temp_dir) = create_test_aggregator().await;

        let a = account("alice", 0);
        let big = account("big", 500);
        let small = account("small", 2);
        store.insert_account(&a).await.unwrap();
        store.insert_account(&big).await.unwrap();
        store.insert_account(&small).await.unwrap();

        store.insert_edge(&big.id, &a.id).await.unwrap();
        store.insert_edge(&small.id, &a.id).await.unwrap();

        let analytics = aggregator.analytics(&a.id).await.unwrap();
        let ids: Vec<&str> = analytics
            .top_followers
            .iter()
            .map(|f| f.id.as_str())
            .collect();
        assert_eq!(ids, vec![big.id.as_str(), small.id.as_str()]);
    }
}
