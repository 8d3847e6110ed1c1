//! Service layer
//!
//! Contains business logic separated from any transport concerns.
//! Services orchestrate the store, cache, cooldown, audit, and event
//! components.

mod analytics;
mod follow;
mod suggestion;

pub use analytics::AnalyticsAggregator;
pub use follow::{FollowGraphService, Privilege};
pub use suggestion::{MAX_SUGGESTIONS, SuggestionEngine};
