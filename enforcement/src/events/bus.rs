//! Event bus for moderation events
//!
//! Pub/sub over a Tokio broadcast channel. Publishing never fails the
//! moderation path: with no subscribers the event is dropped after logging.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::ModerationEvent;
use crate::ledger::IdentityId;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast event bus
pub struct EventBus {
    sender: broadcast::Sender<ModerationEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: ModerationEvent) {
        let event_type = event.event_type();
        let identity_id = event.identity_id().clone();

        if event.is_anomaly() {
            warn!(event_type, %identity_id, "Moderation anomaly");
        }

        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, %identity_id, receivers = count, "Event published");
            }
            Err(_) => {
                debug!(event_type, %identity_id, "Event published (no receivers)");
            }
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<ModerationEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Default)]
pub struct EventFilter {
    /// Filter by identity
    pub identity_id: Option<IdentityId>,
    /// Filter by event types
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by identity
    pub fn identity(mut self, identity_id: impl Into<IdentityId>) -> Self {
        self.identity_id = Some(identity_id.into());
        self
    }

    /// Filter by event types
    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &ModerationEvent) -> bool {
        if let Some(ref id) = self.identity_id {
            if event.identity_id() != id {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Drain everything currently buffered on a receiver that matches `filter`.
pub fn drain_matching(
    receiver: &mut broadcast::Receiver<ModerationEvent>,
    filter: &EventFilter,
) -> Vec<ModerationEvent> {
    let mut out = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => {
                if filter.matches(&event) {
                    out.push(event);
                }
            }
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "Event receiver lagged");
            }
            Err(_) => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rejected(id: &str) -> ModerationEvent {
        ModerationEvent::SubmissionRejected {
            identity_id: id.into(),
            reason: "banned".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new();
        bus.publish(rejected("user-1"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(rejected("user-1"));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "submission_rejected");
    }

    #[test]
    fn test_filter_by_identity_and_type() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(rejected("user-1"));
        bus.publish(rejected("user-2"));

        let filter = EventFilter::new()
            .identity("user-2")
            .types(vec!["submission_rejected"]);
        let events = drain_matching(&mut rx, &filter);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].identity_id().as_str(), "user-2");
    }
}
