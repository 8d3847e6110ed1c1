//! Relationship events
//!
//! Fire-and-forget publish contract for follow/unfollow notifications.
//! Core correctness never depends on subscriber timing or success: a closed
//! channel is logged and the mutation stands.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Published relationship events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FollowEvent {
    Followed {
        follower_id: String,
        following_id: String,
    },
    Unfollowed {
        follower_id: String,
        following_id: String,
    },
}

impl FollowEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Followed { .. } => "followed",
            Self::Unfollowed { .. } => "unfollowed",
        }
    }
}

/// Sending half of the event channel
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<FollowEvent>,
}

impl EventPublisher {
    /// Create a publisher and the matching subscription end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FollowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Publish an event, fire-and-forget
    pub fn publish(&self, event: FollowEvent) {
        use crate::metrics::EVENTS_PUBLISHED_TOTAL;
        EVENTS_PUBLISHED_TOTAL
            .with_label_values(&[event.event_type()])
            .inc();

        if self.tx.send(event).is_err() {
            tracing::warn!("event channel closed; dropping relationship event");
        }
    }
}
