//! Durable audit trail
//!
//! Append-only record of relationship actions, queryable by actor, category,
//! action, and time range. Unfollow entries are the only surviving record of
//! removed edges, so analytics depends on them.

use chrono::{DateTime, Utc};
use sqlx::{Pool, QueryBuilder, Sqlite};

use super::models::EntityId;
use crate::error::AppError;

/// Category used for relationship actions
pub const CATEGORY_USER_MANAGEMENT: &str = "user_management";

/// Audited actions
pub const ACTION_FOLLOW: &str = "follow";
pub const ACTION_UNFOLLOW: &str = "unfollow";
pub const ACTION_CLEAR_COOLDOWN: &str = "clear_cooldown";

/// Cap on rows returned by a single audit query
pub const MAX_QUERY_LIMIT: usize = 1000;

/// One audit trail entry
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: String,
    pub actor_id: String,
    pub category: String,
    pub action: String,
    /// Structured metadata, JSON text
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Parse the metadata column; None when absent or unparseable.
    pub fn metadata_json(&self) -> Option<serde_json::Value> {
        self.metadata
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

/// Filter for audit queries
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub actor_id: Option<String>,
    pub category: Option<String>,
    pub action: Option<String>,
    pub since: Option<DateTime<Utc>>,
    /// Clamped to [`MAX_QUERY_LIMIT`]
    pub limit: usize,
}

/// Audit log over the shared SQLite pool
pub struct AuditLog {
    pool: Pool<Sqlite>,
}

impl AuditLog {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Append an entry
    ///
    /// Call sites treat failures as best-effort: log and continue.
    pub async fn record(
        &self,
        actor_id: &str,
        action: &str,
        metadata: serde_json::Value,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO audit_entries (id, actor_id, category, action, metadata, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(EntityId::new().0)
        .bind(actor_id)
        .bind(CATEGORY_USER_MANAGEMENT)
        .bind(action)
        .bind(metadata.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Query entries matching the filter, newest first
    pub async fn query(&self, filter: &AuditQuery) -> Result<Vec<AuditEntry>, AppError> {
        let mut query_builder =
            QueryBuilder::<Sqlite>::new("SELECT * FROM audit_entries WHERE 1 = 1");

        if let Some(actor_id) = &filter.actor_id {
            query_builder.push(" AND actor_id = ");
            query_builder.push_bind(actor_id.clone());
        }
        if let Some(category) = &filter.category {
            query_builder.push(" AND category = ");
            query_builder.push_bind(category.clone());
        }
        if let Some(action) = &filter.action {
            query_builder.push(" AND action = ");
            query_builder.push_bind(action.clone());
        }
        if let Some(since) = filter.since {
            query_builder.push(" AND created_at >= ");
            query_builder.push_bind(since);
        }

        let limit = match filter.limit {
            0 => MAX_QUERY_LIMIT,
            limit => limit.min(MAX_QUERY_LIMIT),
        };
        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(limit as i64);

        let entries = query_builder
            .build_query_as::<AuditEntry>()
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }
}
