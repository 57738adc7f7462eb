use std::sync::{Arc, Mutex, PoisonError};

use crate::{EventType, Notification, Topic};

/// Outbound side of the notification boundary.
///
/// Implementations must return promptly and must not surface delivery
/// failures; a notification that cannot be delivered is dropped.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: Notification);

    /// Publishes each notification in order.
    fn publish_all(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            self.publish(notification);
        }
    }
}

/// Publisher that keeps every notification in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything published so far, oldest first.
    pub fn published(&self) -> Vec<Notification> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the notifications sent to one topic.
    pub fn for_topic(&self, topic: Topic) -> Vec<Notification> {
        self.published()
            .into_iter()
            .filter(|n| n.topic == topic)
            .collect()
    }

    /// Returns the event types sent to one topic, in order.
    pub fn event_types_for(&self, topic: Topic) -> Vec<EventType> {
        self.for_topic(topic)
            .into_iter()
            .map(|n| n.event_type)
            .collect()
    }

    pub fn clear(&self) {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl NotificationPublisher for RecordingPublisher {
    fn publish(&self, notification: Notification) {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

#[cfg(test)]
mod tests {
    use common::UserId;

    use super::*;

    #[test]
    fn records_in_order_per_topic() {
        let publisher = RecordingPublisher::new();
        let user = Topic::User(UserId::new());

        publisher.publish_all(vec![
            Notification::new(user, EventType::OrderUpdate, serde_json::Value::Null),
            Notification::message(Topic::Admins, "hi"),
            Notification::new(user, EventType::NewOrder, serde_json::Value::Null),
        ]);

        assert_eq!(publisher.published().len(), 3);
        assert_eq!(
            publisher.event_types_for(user),
            vec![EventType::OrderUpdate, EventType::NewOrder]
        );

        publisher.clear();
        assert!(publisher.published().is_empty());
    }
}
