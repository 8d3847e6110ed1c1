//! SQLite follow store
//!
//! All relationship persistence goes through this module. Edge mutation and
//! counter deltas execute inside one transaction; the unique constraint on
//! (follower_id, following_id) is the serialization point for concurrent
//! follow attempts.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};

use super::models::*;
use crate::error::AppError;

/// Maximum ids accepted by batched edge lookups; excess is silently truncated.
pub const MAX_BATCH_IDS: usize = 100;

/// Follow relationship store backed by a SQLite connection pool.
pub struct FollowStore {
    pool: Pool<Sqlite>,
}

impl FollowStore {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to the SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            tracing::error!("Migration failed: {}", e);
            AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
        })?;

        tracing::info!("Follow store connected and migrated successfully");

        Ok(Self { pool })
    }

    /// Shared connection pool, for sibling stores living in the same file.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Get an account by id
    pub async fn get_account(&self, id: &str) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    /// Check account existence without loading the row
    pub async fn account_exists(&self, id: &str) -> Result<bool, AppError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM accounts WHERE id = ?)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    /// Insert an account row (seeding and tests; lifecycle lives elsewhere)
    pub async fn insert_account(&self, account: &Account) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, username, display_name, is_public, allow_friend_requests,
                followers_count, following_count, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.username)
        .bind(&account.display_name)
        .bind(account.is_public)
        .bind(account.allow_friend_requests)
        .bind(account.followers_count)
        .bind(account.following_count)
        .bind(account.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load account rows for a set of ids; result order is unspecified.
    pub async fn accounts_by_ids(&self, ids: &[String]) -> Result<Vec<Account>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder =
            QueryBuilder::<Sqlite>::new("SELECT * FROM accounts WHERE id IN (");
        {
            let mut separated = query_builder.separated(", ");
            for id in ids {
                separated.push_bind(id);
            }
        }
        query_builder.push(")");

        let accounts = query_builder
            .build_query_as::<Account>()
            .fetch_all(&self.pool)
            .await?;

        Ok(accounts)
    }

    // =========================================================================
    // Edge mutation (edge + counters, one transaction)
    // =========================================================================

    /// Create a follow edge and apply both counter increments atomically.
    ///
    /// The losing side of a concurrent duplicate insert hits the unique
    /// constraint and is translated to `Conflict`.
    ///
    /// # Errors
    /// `Validation` on self-follow, `NotFound` if either account row is
    /// absent, `Conflict` if the edge already exists.
    pub async fn insert_edge(
        &self,
        follower_id: &str,
        following_id: &str,
    ) -> Result<FollowEdge, AppError> {
        if follower_id == following_id {
            return Err(AppError::Validation(
                "cannot follow yourself".to_string(),
            ));
        }

        let edge = FollowEdge {
            id: EntityId::new().0,
            follower_id: follower_id.to_string(),
            following_id: following_id.to_string(),
            created_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;

        for id in [follower_id, following_id] {
            let exists =
                sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM accounts WHERE id = ?)")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
            if !exists {
                return Err(AppError::NotFound);
            }
        }

        let inserted = sqlx::query(
            "INSERT INTO follow_edges (id, follower_id, following_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&edge.id)
        .bind(&edge.follower_id)
        .bind(&edge.following_id)
        .bind(edge.created_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                // Dropping the transaction rolls back; no counter was touched.
                return Err(AppError::Conflict(
                    "already following this account".to_string(),
                ));
            }
            Err(error) => return Err(error.into()),
        }

        sqlx::query("UPDATE accounts SET following_count = following_count + 1 WHERE id = ?")
            .bind(follower_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE accounts SET followers_count = followers_count + 1 WHERE id = ?")
            .bind(following_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(edge)
    }

    /// Delete a follow edge and apply both counter decrements atomically.
    ///
    /// # Returns
    /// The deleted edge's creation timestamp (audited for analytics
    /// reconstruction).
    ///
    /// # Errors
    /// `NotFound` if the edge does not exist.
    pub async fn delete_edge(
        &self,
        follower_id: &str,
        following_id: &str,
    ) -> Result<DateTime<Utc>, AppError> {
        let mut tx = self.pool.begin().await?;

        let created_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT created_at FROM follow_edges WHERE follower_id = ? AND following_id = ?",
        )
        .bind(follower_id)
        .bind(following_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;

        sqlx::query("DELETE FROM follow_edges WHERE follower_id = ? AND following_id = ?")
            .bind(follower_id)
            .bind(following_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE accounts SET following_count = following_count - 1 WHERE id = ?")
            .bind(follower_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE accounts SET followers_count = followers_count - 1 WHERE id = ?")
            .bind(following_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(created_at)
    }

    // =========================================================================
    // Edge queries
    // =========================================================================

    /// Check whether a follow edge exists
    pub async fn edge_exists(
        &self,
        follower_id: &str,
        following_id: &str,
    ) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM follow_edges WHERE follower_id = ? AND following_id = ?)",
        )
        .bind(follower_id)
        .bind(following_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Batched edge lookup: which of `ids` does `follower_id` follow.
    ///
    /// Input is capped at [`MAX_BATCH_IDS`]; excess ids are silently
    /// truncated. One IN-list query regardless of batch size.
    pub async fn edges_batch(
        &self,
        follower_id: &str,
        ids: &[String],
    ) -> Result<HashMap<String, bool>, AppError> {
        let ids = &ids[..ids.len().min(MAX_BATCH_IDS)];
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let followed = self.followed_among(follower_id, ids).await?;

        Ok(ids
            .iter()
            .map(|id| (id.clone(), followed.contains(id)))
            .collect())
    }

    /// Which of `candidate_ids` does `viewer_id` follow (unbounded IN-list).
    pub async fn followed_among(
        &self,
        viewer_id: &str,
        candidate_ids: &[String],
    ) -> Result<HashSet<String>, AppError> {
        if candidate_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT following_id FROM follow_edges WHERE follower_id = ",
        );
        query_builder.push_bind(viewer_id);
        query_builder.push(" AND following_id IN (");
        {
            let mut separated = query_builder.separated(", ");
            for id in candidate_ids {
                separated.push_bind(id);
            }
        }
        query_builder.push(")");

        let followed = query_builder
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await?;

        Ok(followed.into_iter().collect())
    }

    /// Which of `candidate_ids` follow `user_id` back.
    pub async fn followers_of_among(
        &self,
        user_id: &str,
        candidate_ids: &[String],
    ) -> Result<HashSet<String>, AppError> {
        if candidate_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT follower_id FROM follow_edges WHERE following_id = ",
        );
        query_builder.push_bind(user_id);
        query_builder.push(" AND follower_id IN (");
        {
            let mut separated = query_builder.separated(", ");
            for id in candidate_ids {
                separated.push_bind(id);
            }
        }
        query_builder.push(")");

        let followers = query_builder
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await?;

        Ok(followers.into_iter().collect())
    }

    /// Ids the user follows, optionally capped.
    pub async fn following_ids(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<String>, AppError> {
        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT following_id FROM follow_edges WHERE follower_id = ",
        );
        query_builder.push_bind(user_id);
        if let Some(limit) = limit {
            query_builder.push(" LIMIT ");
            query_builder.push_bind(limit as i64);
        }

        let ids = query_builder
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    /// Following ids of every member of `follower_ids`, excluding
    /// `exclude_id`, in store iteration order. Duplicates are preserved:
    /// one row per edge, so the caller can count connections.
    pub async fn followed_by_any(
        &self,
        follower_ids: &[String],
        exclude_id: &str,
    ) -> Result<Vec<String>, AppError> {
        if follower_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder =
            QueryBuilder::<Sqlite>::new("SELECT following_id FROM follow_edges WHERE follower_id IN (");
        {
            let mut separated = query_builder.separated(", ");
            for id in follower_ids {
                separated.push_bind(id);
            }
        }
        query_builder.push(") AND following_id <> ");
        query_builder.push_bind(exclude_id);

        let ids = query_builder
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    /// Mutual-connection counts: for each target, how many members of
    /// `viewer_following_ids` follow it. One batched query across both id
    /// sets, never per-candidate queries.
    pub async fn mutual_follow_counts(
        &self,
        viewer_following_ids: &[String],
        target_ids: &[String],
    ) -> Result<HashMap<String, i64>, AppError> {
        if viewer_following_ids.is_empty() || target_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT following_id, COUNT(*) AS mutual_count FROM follow_edges WHERE follower_id IN (",
        );
        {
            let mut separated = query_builder.separated(", ");
            for id in viewer_following_ids {
                separated.push_bind(id);
            }
        }
        query_builder.push(") AND following_id IN (");
        {
            let mut separated = query_builder.separated(", ");
            for id in target_ids {
                separated.push_bind(id);
            }
        }
        query_builder.push(") GROUP BY following_id");

        let rows = query_builder
            .build_query_as::<(String, i64)>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().collect())
    }

    // =========================================================================
    // Paged relationship listings
    // =========================================================================

    /// Paged accounts on one side of the anchor's edges, with the edge
    /// timestamp, plus the unfiltered-total for the page envelope.
    ///
    /// `sort_by` is enum-restricted; `CreatedAt` orders on the edge
    /// timestamp, the other fields on account columns. Search matches
    /// username/display name case-insensitively as substring.
    pub async fn relationship_page(
        &self,
        direction: EdgeDirection,
        anchor_id: &str,
        params: &ListParams,
    ) -> Result<(Vec<(Account, DateTime<Utc>)>, usize), AppError> {
        let (page, limit) = params.normalized();
        let offset = (page - 1) * limit;

        let (anchor_column, joined_column) = match direction {
            EdgeDirection::Following => ("follower_id", "following_id"),
            EdgeDirection::Followers => ("following_id", "follower_id"),
        };

        let search_pattern = params
            .search_term()
            .map(|term| format!("%{}%", term.to_lowercase()));

        let push_filters = |builder: &mut QueryBuilder<Sqlite>| {
            builder.push(" FROM follow_edges e JOIN accounts a ON a.id = e.");
            builder.push(joined_column);
            builder.push(" WHERE e.");
            builder.push(anchor_column);
            builder.push(" = ");
            builder.push_bind(anchor_id.to_string());
            if let Some(pattern) = &search_pattern {
                builder.push(
                    " AND (LOWER(a.username) LIKE ",
                );
                builder.push_bind(pattern.clone());
                builder.push(" OR LOWER(a.display_name) LIKE ");
                builder.push_bind(pattern.clone());
                builder.push(")");
            }
        };

        let mut count_builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
        push_filters(&mut count_builder);
        let total = count_builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let order_column = match params.sort_by {
            SortBy::CreatedAt => "e.created_at",
            SortBy::Username => "a.username",
            SortBy::DisplayName => "a.display_name",
        };

        let mut page_builder = QueryBuilder::<Sqlite>::new(
            "SELECT a.id, a.username, a.display_name, a.is_public, a.allow_friend_requests, \
             a.followers_count, a.following_count, a.created_at, \
             e.created_at AS followed_at",
        );
        push_filters(&mut page_builder);
        page_builder.push(" ORDER BY ");
        page_builder.push(order_column);
        page_builder.push(" ");
        page_builder.push(params.sort_order.as_str());
        page_builder.push(" LIMIT ");
        page_builder.push_bind(limit as i64);
        page_builder.push(" OFFSET ");
        page_builder.push_bind(offset as i64);

        let rows = page_builder
            .build_query_as::<FollowedAccountRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok((
            rows.into_iter()
                .map(|row| (row.account, row.followed_at))
                .collect(),
            total as usize,
        ))
    }

    // =========================================================================
    // Suggestion & analytics queries
    // =========================================================================

    /// Public accounts ranked by follower count, excluding one id.
    pub async fn top_public_accounts(
        &self,
        exclude_id: &str,
        limit: usize,
    ) -> Result<Vec<Account>, AppError> {
        let accounts = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE id <> ? AND is_public = 1 \
             ORDER BY followers_count DESC LIMIT ?",
        )
        .bind(exclude_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    /// Followers of `user_id` ranked by their own follower count.
    pub async fn top_followers(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Account>, AppError> {
        let accounts = sqlx::query_as::<_, Account>(
            "SELECT a.* FROM follow_edges e JOIN accounts a ON a.id = e.follower_id \
             WHERE e.following_id = ? ORDER BY a.followers_count DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    /// Count edges pointing at `user_id` created at or after `cutoff`.
    pub async fn count_new_followers_since(
        &self,
        user_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM follow_edges WHERE following_id = ? AND created_at >= ?",
        )
        .bind(user_id)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Recompute denormalized counters from edges.
    ///
    /// The only permitted counter write outside an edge transaction; run as a
    /// scheduled job to repair drift from operator intervention or bugs.
    ///
    /// # Returns
    /// Number of account rows corrected.
    pub async fn reconcile_counters(&self) -> Result<u64, AppError> {
        let followers = sqlx::query(
            "UPDATE accounts SET followers_count = \
               (SELECT COUNT(*) FROM follow_edges WHERE following_id = accounts.id) \
             WHERE followers_count <> \
               (SELECT COUNT(*) FROM follow_edges WHERE following_id = accounts.id)",
        )
        .execute(&self.pool)
        .await?;

        let following = sqlx::query(
            "UPDATE accounts SET following_count = \
               (SELECT COUNT(*) FROM follow_edges WHERE follower_id = accounts.id) \
             WHERE following_count <> \
               (SELECT COUNT(*) FROM follow_edges WHERE follower_id = accounts.id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(followers.rows_affected() + following.rows_affected())
    }
}

/// Account row joined with the edge creation timestamp
#[derive(Debug, sqlx::FromRow)]
struct FollowedAccountRow {
    #[sqlx(flatten)]
    account: Account,
    followed_at: DateTime<Utc>,
}
