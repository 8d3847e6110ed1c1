//! Data layer module
//!
//! Handles all relationship persistence and caching:
//! - SQLite follow store (edges + counters, one transaction)
//! - Tag-indexed follow cache (volatile)
//! - Cooldown guard (volatile)
//! - Durable audit trail

mod audit;
mod cache;
mod cooldown;
mod models;
mod store;

pub use audit::{
    ACTION_CLEAR_COOLDOWN, ACTION_FOLLOW, ACTION_UNFOLLOW, AuditEntry, AuditLog, AuditQuery,
    CATEGORY_USER_MANAGEMENT, MAX_QUERY_LIMIT,
};
pub use cache::{
    CachedValue, FollowCache, FollowCacheStats, followers_tag, following_tag, list_key,
    status_key, suggestions_key, user_tag,
};
pub use cooldown::{CooldownGuard, CooldownStats};
pub use models::*;
pub use store::{FollowStore, MAX_BATCH_IDS};
