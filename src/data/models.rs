//! Data models
//!
//! Rust structs representing database entities, page envelopes, and
//! analytics results. All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Validate that a caller-supplied id parses as a ULID.
    pub fn validate(id: &str) -> Result<(), AppError> {
        ulid::Ulid::from_string(id)
            .map(|_| ())
            .map_err(|_| AppError::Validation(format!("malformed account id: {id}")))
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Account
// =============================================================================

/// A referenced account row
///
/// Account lifecycle (creation, profile edits, privacy settings) is managed
/// elsewhere; this subsystem reads accounts and co-mutates the two
/// denormalized relationship counters.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    /// Whether the account is discoverable in popularity-based suggestions
    pub is_public: bool,
    /// Privacy flag: false blocks new incoming follows
    pub allow_friend_requests: bool,
    /// |{edges: following_id = id}|, co-mutated with edge changes
    pub followers_count: i64,
    /// |{edges: follower_id = id}|, co-mutated with edge changes
    pub following_count: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Follow edges
// =============================================================================

/// A directed follow relationship
///
/// Unique on (follower_id, following_id); hard-deleted on unfollow.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowEdge {
    pub id: String,
    /// The account that follows
    pub follower_id: String,
    /// The account being followed
    pub following_id: String,
    pub created_at: DateTime<Utc>,
}

/// Which side of the edge a paged relationship query walks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    /// Accounts the anchor follows
    Following,
    /// Accounts following the anchor
    Followers,
}

impl EdgeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Following => "following",
            Self::Followers => "followers",
        }
    }
}

// =============================================================================
// Paged list parameters
// =============================================================================

/// Sortable columns for relationship list queries
///
/// Restricted set: anything else silently falls back to `CreatedAt`, which
/// keeps dynamic field selection out of SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    CreatedAt,
    Username,
    DisplayName,
}

impl SortBy {
    /// Parse a caller-supplied sort field, falling back to `CreatedAt`.
    pub fn parse(value: &str) -> Self {
        match value {
            "username" => Self::Username,
            "displayName" | "display_name" => Self::DisplayName,
            _ => Self::CreatedAt,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Username => "username",
            Self::DisplayName => "display_name",
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Parameters for paged relationship list queries
#[derive(Debug, Clone)]
pub struct ListParams {
    /// 1-based page number
    pub page: usize,
    /// Page size
    pub limit: usize,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    /// Case-insensitive substring match on username/display name
    pub search: Option<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
            search: None,
        }
    }
}

impl ListParams {
    /// Effective page (1-based) and size after clamping.
    pub fn normalized(&self) -> (usize, usize) {
        (self.page.max(1), self.limit.max(1))
    }

    /// Trimmed search term, None when empty.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// =============================================================================
// Page envelope
// =============================================================================

/// Pagination metadata returned alongside list items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

/// A page of list items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: usize, page: usize, limit: usize) -> Self {
        let total_pages = total.div_ceil(limit.max(1));
        Self {
            items,
            meta: PageMeta {
                page,
                limit,
                total,
                total_pages,
                has_next_page: page < total_pages,
                has_previous_page: page > 1,
            },
        }
    }
}

// =============================================================================
// Enriched list entries
// =============================================================================

/// Entry in a "who does this user follow" listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowingEntry {
    pub account: Account,
    /// When the listed relationship was created
    pub followed_at: DateTime<Utc>,
    /// Always true: the list owner follows every listed account
    pub is_following: bool,
    /// Whether the listed account follows the owner back
    /// (present only when the viewer is the owner)
    pub is_followed_back: Option<bool>,
    /// How many of the viewer's followees also follow the listed account
    /// (present only when a viewer is known)
    pub mutual_follows_count: Option<i64>,
}

/// Entry in a "who follows this user" listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerEntry {
    pub account: Account,
    /// When the listed relationship was created
    pub followed_at: DateTime<Utc>,
    /// Whether the viewer follows the listed account
    pub is_following: bool,
}

// =============================================================================
// Stats & analytics
// =============================================================================

/// O(1) counter read for a single account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowStats {
    pub followers_count: i64,
    pub following_count: i64,
}

/// Time-windowed follow analytics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowAnalytics {
    pub followers_count: i64,
    pub following_count: i64,
    pub new_followers_7d: i64,
    pub new_followers_30d: i64,
    pub unfollows_7d: i64,
    pub unfollows_30d: i64,
    /// Followers ranked by their own follower count, descending
    pub top_followers: Vec<Account>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_validation() {
        let id = EntityId::new();
        assert!(EntityId::validate(&id.0).is_ok());
        assert!(EntityId::validate("not-a-ulid").is_err());
        assert!(EntityId::validate("").is_err());
    }

    #[test]
    fn sort_by_falls_back_to_created_at() {
        assert_eq!(SortBy::parse("username"), SortBy::Username);
        assert_eq!(SortBy::parse("displayName"), SortBy::DisplayName);
        assert_eq!(SortBy::parse("display_name"), SortBy::DisplayName);
        assert_eq!(SortBy::parse("passwordHash"), SortBy::CreatedAt);
        assert_eq!(SortBy::parse(""), SortBy::CreatedAt);
    }

    #[test]
    fn page_meta_math() {
        let page = Page::new(vec![1, 2, 3], 7, 1, 3);
        assert_eq!(page.meta.total_pages, 3);
        assert!(page.meta.has_next_page);
        assert!(!page.meta.has_previous_page);

        let last = Page::new(vec![7], 7, 3, 3);
        assert!(!last.meta.has_next_page);
        assert!(last.meta.has_previous_page);
    }
}
