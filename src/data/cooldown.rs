//! Follow cooldowns
//!
//! Prevents follow/unfollow churn by blocking re-follows of the same ordered
//! account pair for a TTL after an unfollow.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const DEFAULT_MAX_TRACKED_PAIRS: usize = 10_000;

/// Cooldown entry for one ordered (follower, following) pair
#[derive(Debug, Clone)]
struct CooldownEntry {
    expires_at: Instant,
}

impl CooldownEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }

    /// Whole seconds until expiry, rounded up; 0 when expired.
    fn remaining_seconds(&self, now: Instant) -> u64 {
        let remaining = self.expires_at.saturating_duration_since(now);
        if remaining.is_zero() {
            0
        } else {
            remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
        }
    }
}

/// TTL-keyed cooldown state per ordered account pair
///
/// Per-pair state transitions: none → cooling(expires_at) → none, via TTL
/// expiry or an explicit clear. Best-effort in-memory store; losing it never
/// affects relationship state.
pub struct CooldownGuard {
    /// (follower_id, following_id) -> entry
    entries: Arc<RwLock<HashMap<(String, String), CooldownEntry>>>,
    /// How long a pair cools after an unfollow
    ttl: Duration,
    /// Maximum number of tracked pairs in memory
    max_tracked_pairs: usize,
}

impl CooldownGuard {
    /// Create a new cooldown guard
    ///
    /// # Arguments
    /// * `ttl` - Cooldown duration applied by `start`
    pub fn new(ttl: Duration) -> Self {
        Self::with_max_tracked_pairs(ttl, DEFAULT_MAX_TRACKED_PAIRS)
    }

    /// Create a new cooldown guard with an explicit in-memory pair cap.
    pub fn with_max_tracked_pairs(ttl: Duration, max_tracked_pairs: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            max_tracked_pairs: max_tracked_pairs.max(1),
        }
    }

    fn prune_expired_locked(
        entries: &mut HashMap<(String, String), CooldownEntry>,
        now: Instant,
    ) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    fn evict_soonest_locked(entries: &mut HashMap<(String, String), CooldownEntry>) -> bool {
        let Some(soonest_key) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.expires_at)
            .map(|(key, _)| key.clone())
        else {
            return false;
        };
        entries.remove(&soonest_key);
        true
    }

    /// Seconds remaining on the pair's cooldown (0 when none or expired)
    pub async fn remaining(&self, follower_id: &str, following_id: &str) -> u64 {
        let entries = self.entries.read().await;
        entries
            .get(&(follower_id.to_string(), following_id.to_string()))
            .map(|entry| entry.remaining_seconds(Instant::now()))
            .unwrap_or(0)
    }

    /// Start the pair's cooldown (called after an unfollow)
    ///
    /// Restarts the TTL if the pair was already cooling.
    pub async fn start(&self, follower_id: &str, following_id: &str) {
        let key = (follower_id.to_string(), following_id.to_string());
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.max_tracked_pairs {
            Self::prune_expired_locked(&mut entries, now);
            if entries.len() >= self.max_tracked_pairs {
                let _ = Self::evict_soonest_locked(&mut entries);
            }
        }

        entries.insert(
            key,
            CooldownEntry {
                expires_at: now + self.ttl,
            },
        );
    }

    /// Clear the pair's cooldown (privileged operation)
    pub async fn clear(&self, follower_id: &str, following_id: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(&(follower_id.to_string(), following_id.to_string()));
    }

    /// Prune expired entries
    ///
    /// Should be called periodically to clean up expired pairs.
    pub async fn prune_expired(&self) {
        let mut entries = self.entries.write().await;
        let removed = Self::prune_expired_locked(&mut entries, Instant::now());

        use crate::metrics::COOLDOWN_PAIRS_ACTIVE;
        COOLDOWN_PAIRS_ACTIVE.set(entries.len() as i64);

        if removed > 0 {
            tracing::debug!("Pruned {} expired cooldown entries", removed);
        }
    }

    /// Get cooldown guard statistics
    pub async fn stats(&self) -> CooldownStats {
        let entries = self.entries.read().await;
        let now = Instant::now();
        let total = entries.len();
        let cooling = entries
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count();

        CooldownStats {
            total_pairs: total,
            cooling_pairs: cooling,
            ttl_seconds: self.ttl.as_secs(),
            max_tracked_pairs: self.max_tracked_pairs,
        }
    }
}

/// Cooldown guard statistics
#[derive(Debug, Clone)]
pub struct CooldownStats {
    /// Total number of tracked pairs
    pub total_pairs: usize,
    /// Number of pairs still cooling
    pub cooling_pairs: usize,
    /// Cooldown TTL in seconds
    pub ttl_seconds: u64,
    /// Maximum number of pairs tracked in memory
    pub max_tracked_pairs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cooldown_lifecycle() {
        let guard = CooldownGuard::new(Duration::from_secs(1));

        assert_eq!(guard.remaining("a", "b").await, 0);

        guard.start("a", "b").await;
        assert!(guard.remaining("a", "b").await >= 1);

        // The reverse direction is a different pair
        assert_eq!(guard.remaining("b", "a").await, 0);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(guard.remaining("a", "b").await, 0);
    }

    #[tokio::test]
    async fn test_clear_ends_cooldown_early() {
        let guard = CooldownGuard::new(Duration::from_secs(60));

        guard.start("a", "b").await;
        assert!(guard.remaining("a", "b").await > 0);

        guard.clear("a", "b").await;
        assert_eq!(guard.remaining("a", "b").await, 0);
    }

    #[tokio::test]
    async fn test_max_tracked_pairs_evicts_soonest_entry() {
        let guard = CooldownGuard::with_max_tracked_pairs(Duration::from_secs(60), 2);

        guard.start("a", "b").await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        guard.start("a", "c").await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        guard.start("a", "d").await;

        let stats = guard.stats().await;
        assert_eq!(stats.total_pairs, 2);
        assert_eq!(guard.remaining("a", "b").await, 0);
        assert!(guard.remaining("a", "c").await > 0);
        assert!(guard.remaining("a", "d").await > 0);
    }

    #[tokio::test]
    async fn test_prune_expired_removes_only_expired() {
        let guard = CooldownGuard::new(Duration::from_millis(50));

        guard.start("a", "b").await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        guard.start("a", "c").await;

        guard.prune_expired().await;

        let stats = guard.stats().await;
        assert_eq!(stats.total_pairs, 1);
        assert!(guard.remaining("a", "c").await > 0);
    }
}
