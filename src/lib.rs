//! Followgraph - social-graph follow subsystem
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - FollowGraphService (public operation contract)           │
//! │  - SuggestionEngine (mutual-connection ranking)             │
//! │  - AnalyticsAggregator (windowed statistics)                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - FollowStore: SQLite (sqlx), edges + counters             │
//! │  - FollowCache: tag-indexed Moka cache                      │
//! │  - CooldownGuard: TTL pair state                            │
//! │  - AuditLog: durable action trail                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Edge mutation and counter deltas execute as one transaction; the cache,
//! cooldown store, audit trail, and event channel are best-effort services
//! whose failures never corrupt relationship state.
//!
//! # Modules
//!
//! - `service`: Business logic layer
//! - `data`: Database, cache, cooldown, and audit layer
//! - `events`: Fire-and-forget relationship event publishing
//! - `config`: Configuration management
//! - `metrics`: Prometheus instruments
//! - `error`: Error types

pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod metrics;
pub mod service;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

/// Application state shared across the embedding application
///
/// Holds the shared resources (store, caches, audit trail) and the services
/// composed over them.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Follow relationship store (SQLite)
    pub store: Arc<data::FollowStore>,

    /// Tag-indexed lookup cache (volatile)
    pub cache: Arc<data::FollowCache>,

    /// Cooldown state per ordered pair (volatile)
    pub cooldown: Arc<data::CooldownGuard>,

    /// Durable audit trail
    pub audit: Arc<data::AuditLog>,

    /// Public relationship operations
    pub follows: Arc<service::FollowGraphService>,

    /// Mutual-connection suggestions
    pub suggestions: Arc<service::SuggestionEngine>,

    /// Windowed statistics
    pub analytics: Arc<service::AnalyticsAggregator>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Returns
    /// The state plus the subscription end of the event channel; the caller
    /// owns delivery of published `FollowEvent`s. Dropping the receiver is
    /// safe; publishing degrades to a logged no-op.
    ///
    /// # Errors
    /// Returns error if the store connection or migration fails
    pub async fn new(
        config: config::AppConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<events::FollowEvent>), error::AppError> {
        tracing::info!("Initializing follow subsystem state...");

        let store = Arc::new(data::FollowStore::connect(&config.database.path).await?);
        let cache = Arc::new(data::FollowCache::new(config.cache.max_entries));
        let cooldown = Arc::new(data::CooldownGuard::with_max_tracked_pairs(
            Duration::from_secs(config.cooldown.ttl_seconds),
            config.cooldown.max_tracked_pairs,
        ));
        let audit = Arc::new(data::AuditLog::new(store.pool().clone()));
        let (events, events_rx) = events::EventPublisher::channel();

        let follows = Arc::new(service::FollowGraphService::new(
            store.clone(),
            cache.clone(),
            cooldown.clone(),
            audit.clone(),
            events,
        ));
        let suggestions = Arc::new(service::SuggestionEngine::new(
            store.clone(),
            cache.clone(),
        ));
        let analytics = Arc::new(service::AnalyticsAggregator::new(
            store.clone(),
            audit.clone(),
        ));

        tracing::info!("Follow subsystem state initialized");

        Ok((
            Self {
                config: Arc::new(config),
                store,
                cache,
                cooldown,
                audit,
                follows,
                suggestions,
                analytics,
            },
            events_rx,
        ))
    }
}
