//! Follow graph service
//!
//! Orchestrates the public relationship operations: validation first, then
//! cooldown/cache consultation, then the transactional store mutation, then
//! best-effort side effects (cache invalidation, event publish, audit).
//! Side-effect failures are logged and never reverse the mutation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::data::{
    ACTION_CLEAR_COOLDOWN, ACTION_FOLLOW, ACTION_UNFOLLOW, AuditLog, CachedValue, CooldownGuard,
    EdgeDirection, EntityId, FollowCache, FollowEdge, FollowStore, FollowerEntry, FollowingEntry,
    ListParams, MAX_BATCH_IDS, Page, followers_tag, following_tag, list_key, status_key, user_tag,
};
use crate::error::AppError;
use crate::events::{EventPublisher, FollowEvent};

/// TTL for cached follow-status lookups
const STATUS_CACHE_TTL: Duration = Duration::from_secs(300);
/// TTL for cached list pages; shorter because they embed viewer-relative flags
const LIST_CACHE_TTL: Duration = Duration::from_secs(60);

/// Caller privilege for restricted operations
///
/// Authentication lives outside this subsystem; callers assert the level
/// they resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    User,
    Admin,
}

/// Follow graph service
pub struct FollowGraphService {
    store: Arc<FollowStore>,
    cache: Arc<FollowCache>,
    cooldown: Arc<CooldownGuard>,
    audit: Arc<AuditLog>,
    events: EventPublisher,
}

impl FollowGraphService {
    /// Create new follow graph service
    pub fn new(
        store: Arc<FollowStore>,
        cache: Arc<FollowCache>,
        cooldown: Arc<CooldownGuard>,
        audit: Arc<AuditLog>,
        events: EventPublisher,
    ) -> Self {
        Self {
            store,
            cache,
            cooldown,
            audit,
            events,
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Follow an account
    ///
    /// # Errors
    /// `Validation` on self-follow or malformed id, `NotFound` if either
    /// account is missing, `Forbidden` if the target blocks new follows,
    /// `Cooldown` while the pair's cooldown is active, `Conflict` if the
    /// edge already exists (including the losing side of a concurrent race).
    pub async fn follow(
        &self,
        follower_id: &str,
        following_id: &str,
    ) -> Result<FollowEdge, AppError> {
        use crate::metrics::{FOLLOW_REJECTIONS_TOTAL, FOLLOWS_TOTAL};

        EntityId::validate(follower_id)?;
        EntityId::validate(following_id)?;

        if follower_id == following_id {
            FOLLOW_REJECTIONS_TOTAL
                .with_label_values(&["self_follow"])
                .inc();
            return Err(AppError::Validation(
                "cannot follow yourself".to_string(),
            ));
        }

        if self.store.edge_exists(follower_id, following_id).await? {
            FOLLOW_REJECTIONS_TOTAL
                .with_label_values(&["duplicate"])
                .inc();
            return Err(AppError::Conflict(
                "already following this account".to_string(),
            ));
        }

        if !self.store.account_exists(follower_id).await? {
            FOLLOW_REJECTIONS_TOTAL
                .with_label_values(&["not_found"])
                .inc();
            return Err(AppError::NotFound);
        }
        let following = self
            .store
            .get_account(following_id)
            .await?
            .ok_or_else(|| {
                FOLLOW_REJECTIONS_TOTAL
                    .with_label_values(&["not_found"])
                    .inc();
                AppError::NotFound
            })?;

        if !following.allow_friend_requests {
            FOLLOW_REJECTIONS_TOTAL
                .with_label_values(&["forbidden"])
                .inc();
            return Err(AppError::Forbidden);
        }

        let remaining = self.cooldown.remaining(follower_id, following_id).await;
        if remaining > 0 {
            FOLLOW_REJECTIONS_TOTAL
                .with_label_values(&["cooldown"])
                .inc();
            return Err(AppError::Cooldown(remaining));
        }

        // The unique pair constraint resolves concurrent races past the
        // pre-check above; the store translates the loser to Conflict.
        let edge = self.store.insert_edge(follower_id, following_id).await?;

        self.invalidate_pair_caches(follower_id, following_id).await;

        self.events.publish(FollowEvent::Followed {
            follower_id: follower_id.to_string(),
            following_id: following_id.to_string(),
        });

        self.record_audit(
            follower_id,
            ACTION_FOLLOW,
            serde_json::json!({ "following_id": following_id }),
        )
        .await;

        FOLLOWS_TOTAL.inc();
        tracing::info!(follower_id, following_id, "account followed");

        Ok(edge)
    }

    /// Unfollow an account
    ///
    /// Starts the pair's cooldown and writes an audit entry carrying the
    /// deleted edge's creation timestamp (analytics reconstructs unfollow
    /// history from these entries).
    ///
    /// # Errors
    /// `NotFound` if no edge exists.
    pub async fn unfollow(&self, follower_id: &str, following_id: &str) -> Result<(), AppError> {
        use crate::metrics::UNFOLLOWS_TOTAL;

        EntityId::validate(follower_id)?;
        EntityId::validate(following_id)?;

        let followed_at = self.store.delete_edge(follower_id, following_id).await?;

        self.cooldown.start(follower_id, following_id).await;

        self.invalidate_pair_caches(follower_id, following_id).await;

        self.events.publish(FollowEvent::Unfollowed {
            follower_id: follower_id.to_string(),
            following_id: following_id.to_string(),
        });

        self.record_audit(
            follower_id,
            ACTION_UNFOLLOW,
            serde_json::json!({
                "following_id": following_id,
                "followed_at": followed_at.to_rfc3339(),
            }),
        )
        .await;

        UNFOLLOWS_TOTAL.inc();
        tracing::info!(follower_id, following_id, "account unfollowed");

        Ok(())
    }

    /// Clear the pair's cooldown before its TTL elapses
    ///
    /// # Errors
    /// `Forbidden` unless called with `Privilege::Admin`.
    pub async fn clear_cooldown(
        &self,
        follower_id: &str,
        following_id: &str,
        privilege: Privilege,
    ) -> Result<(), AppError> {
        if privilege != Privilege::Admin {
            return Err(AppError::Forbidden);
        }

        EntityId::validate(follower_id)?;
        EntityId::validate(following_id)?;

        self.cooldown.clear(follower_id, following_id).await;

        self.record_audit(
            follower_id,
            ACTION_CLEAR_COOLDOWN,
            serde_json::json!({ "following_id": following_id }),
        )
        .await;

        tracing::info!(follower_id, following_id, "follow cooldown cleared");

        Ok(())
    }

    // =========================================================================
    // Reads (cache-aside)
    // =========================================================================

    /// Check whether one account follows another
    pub async fn is_following(
        &self,
        follower_id: &str,
        following_id: &str,
    ) -> Result<bool, AppError> {
        EntityId::validate(follower_id)?;
        EntityId::validate(following_id)?;

        let key = status_key(follower_id, following_id);
        if let Some(value) = self.cache.get(&key).await {
            if let CachedValue::FollowStatus(cached) = value.as_ref() {
                return Ok(*cached);
            }
        }

        let exists = self.store.edge_exists(follower_id, following_id).await?;

        self.cache
            .set(
                &key,
                CachedValue::FollowStatus(exists),
                STATUS_CACHE_TTL,
                &[
                    user_tag(follower_id),
                    user_tag(following_id),
                    following_tag(follower_id),
                ],
            )
            .await;

        Ok(exists)
    }

    /// Batch follow-status lookup
    ///
    /// Input capped at 100 ids; excess is silently truncated. Cached
    /// statuses are served directly, the remainder resolved with one
    /// batched query and cached individually.
    pub async fn batch_follow_status(
        &self,
        follower_id: &str,
        ids: &[String],
    ) -> Result<HashMap<String, bool>, AppError> {
        EntityId::validate(follower_id)?;

        let ids = &ids[..ids.len().min(MAX_BATCH_IDS)];
        let mut results = HashMap::new();
        let mut uncached = Vec::new();

        for id in ids {
            let cached = self.cache.get(&status_key(follower_id, id)).await;
            match cached.as_deref() {
                Some(CachedValue::FollowStatus(value)) => {
                    results.insert(id.clone(), *value);
                }
                _ => uncached.push(id.clone()),
            }
        }

        if !uncached.is_empty() {
            let fetched = self.store.edges_batch(follower_id, &uncached).await?;
            for (id, followed) in fetched {
                self.cache
                    .set(
                        &status_key(follower_id, &id),
                        CachedValue::FollowStatus(followed),
                        STATUS_CACHE_TTL,
                        &[
                            user_tag(follower_id),
                            user_tag(&id),
                            following_tag(follower_id),
                        ],
                    )
                    .await;
                results.insert(id, followed);
            }
        }

        Ok(results)
    }

    /// List accounts the user follows, enriched for the viewer
    ///
    /// `is_followed_back` is present only when the viewer is the list owner;
    /// `mutual_follows_count` whenever a viewer is known (one batched query
    /// across both id sets).
    pub async fn list_following(
        &self,
        user_id: &str,
        viewer_id: Option<&str>,
        params: &ListParams,
    ) -> Result<Page<FollowingEntry>, AppError> {
        EntityId::validate(user_id)?;
        if let Some(viewer) = viewer_id {
            EntityId::validate(viewer)?;
        }
        if !self.store.account_exists(user_id).await? {
            return Err(AppError::NotFound);
        }

        let (page, limit) = params.normalized();
        let key = list_key(
            EdgeDirection::Following.as_str(),
            user_id,
            viewer_id,
            page,
            limit,
            params.sort_by.as_str(),
            params.sort_order.as_str(),
            params.search_term(),
        );
        if let Some(value) = self.cache.get(&key).await {
            if let CachedValue::FollowingPage(cached) = value.as_ref() {
                return Ok(cached.clone());
            }
        }

        let (rows, total) = self
            .store
            .relationship_page(EdgeDirection::Following, user_id, params)
            .await?;
        let listed_ids: Vec<String> = rows.iter().map(|(account, _)| account.id.clone()).collect();

        let followed_back = if viewer_id == Some(user_id) {
            Some(self.store.followers_of_among(user_id, &listed_ids).await?)
        } else {
            None
        };

        let mutual_counts = match viewer_id {
            Some(viewer) => {
                let viewer_following = self.store.following_ids(viewer, None).await?;
                Some(
                    self.store
                        .mutual_follow_counts(&viewer_following, &listed_ids)
                        .await?,
                )
            }
            None => None,
        };

        let items = rows
            .into_iter()
            .map(|(account, followed_at)| {
                let id = account.id.clone();
                FollowingEntry {
                    followed_at,
                    is_following: true,
                    is_followed_back: followed_back.as_ref().map(|set| set.contains(&id)),
                    mutual_follows_count: mutual_counts
                        .as_ref()
                        .map(|counts| counts.get(&id).copied().unwrap_or(0)),
                    account,
                }
            })
            .collect();

        let result = Page::new(items, total, page, limit);

        let mut tags = vec![user_tag(user_id), following_tag(user_id)];
        if let Some(viewer) = viewer_id.filter(|viewer| *viewer != user_id) {
            tags.push(following_tag(viewer));
        }
        self.cache
            .set(
                &key,
                CachedValue::FollowingPage(result.clone()),
                LIST_CACHE_TTL,
                &tags,
            )
            .await;

        Ok(result)
    }

    /// List accounts following the user, with the viewer's follow flag
    pub async fn list_followers(
        &self,
        user_id: &str,
        viewer_id: Option<&str>,
        params: &ListParams,
    ) -> Result<Page<FollowerEntry>, AppError> {
        EntityId::validate(user_id)?;
        if let Some(viewer) = viewer_id {
            EntityId::validate(viewer)?;
        }
        if !self.store.account_exists(user_id).await? {
            return Err(AppError::NotFound);
        }

        let (page, limit) = params.normalized();
        let key = list_key(
            EdgeDirection::Followers.as_str(),
            user_id,
            viewer_id,
            page,
            limit,
            params.sort_by.as_str(),
            params.sort_order.as_str(),
            params.search_term(),
        );
        if let Some(value) = self.cache.get(&key).await {
            if let CachedValue::FollowersPage(cached) = value.as_ref() {
                return Ok(cached.clone());
            }
        }

        let (rows, total) = self
            .store
            .relationship_page(EdgeDirection::Followers, user_id, params)
            .await?;
        let listed_ids: Vec<String> = rows.iter().map(|(account, _)| account.id.clone()).collect();

        let viewer_follows: HashSet<String> = match viewer_id {
            Some(viewer) => self.store.followed_among(viewer, &listed_ids).await?,
            None => HashSet::new(),
        };

        let items = rows
            .into_iter()
            .map(|(account, followed_at)| {
                let is_following = viewer_follows.contains(&account.id);
                FollowerEntry {
                    followed_at,
                    is_following,
                    account,
                }
            })
            .collect();

        let result = Page::new(items, total, page, limit);

        let mut tags = vec![user_tag(user_id), followers_tag(user_id)];
        if let Some(viewer) = viewer_id.filter(|viewer| *viewer != user_id) {
            tags.push(following_tag(viewer));
        }
        self.cache
            .set(
                &key,
                CachedValue::FollowersPage(result.clone()),
                LIST_CACHE_TTL,
                &tags,
            )
            .await;

        Ok(result)
    }

    // =========================================================================
    // Best-effort side channels
    // =========================================================================

    /// Drop every cached view an edge change between the pair may affect.
    async fn invalidate_pair_caches(&self, follower_id: &str, following_id: &str) {
        self.cache
            .invalidate_tags(&[
                user_tag(follower_id),
                user_tag(following_id),
                following_tag(follower_id),
                followers_tag(following_id),
            ])
            .await;
    }

    async fn record_audit(&self, actor_id: &str, action: &str, metadata: serde_json::Value) {
        if let Err(error) = self.audit.record(actor_id, action, metadata).await {
            use crate::metrics::AUDIT_WRITE_FAILURES_TOTAL;
            AUDIT_WRITE_FAILURES_TOTAL.inc();
            tracing::warn!(%error, actor_id, action, "failed to write audit entry");
        }
    }
}
