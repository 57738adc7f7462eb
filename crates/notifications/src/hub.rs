//! In-process fan-out: an unbounded queue drained by a dispatcher task that
//! forwards each notification to the broadcast channel of its topic.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{broadcast, mpsc};

use crate::{Notification, NotificationPublisher, Topic};

type Subscribers = Arc<RwLock<HashMap<Topic, broadcast::Sender<Notification>>>>;

/// Publisher side of the hub. Cheap to clone.
#[derive(Clone)]
pub struct FanOutHub {
    queue: mpsc::UnboundedSender<Notification>,
    subscribers: Subscribers,
    capacity: usize,
}

/// Drains the hub's queue and delivers to subscribers.
pub struct Dispatcher {
    queue: mpsc::UnboundedReceiver<Notification>,
    subscribers: Subscribers,
}

impl FanOutHub {
    /// Creates a hub whose per-topic buffers hold `capacity` notifications.
    ///
    /// The returned [`Dispatcher`] must be driven (usually with
    /// `tokio::spawn(dispatcher.run())`) for anything to be delivered.
    pub fn new(capacity: usize) -> (Self, Dispatcher) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscribers: Subscribers = Arc::default();
        let hub = Self {
            queue: tx,
            subscribers: Arc::clone(&subscribers),
            capacity: capacity.max(1),
        };
        let dispatcher = Dispatcher {
            queue: rx,
            subscribers,
        };
        (hub, dispatcher)
    }

    /// Subscribes to one topic. Only notifications dispatched after this call
    /// are received.
    ///
    /// Topics whose receivers have all been dropped are forgotten here.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Notification> {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|_, sender| sender.receiver_count() > 0);
        subscribers
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Returns the number of live receivers on a topic.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&topic)
            .map_or(0, |sender| sender.receiver_count())
    }

    /// Number of topics currently holding a channel.
    pub fn topic_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl NotificationPublisher for FanOutHub {
    fn publish(&self, notification: Notification) {
        let event = notification.event_type.as_str();
        metrics::counter!("notifications_published_total", "event" => event).increment(1);

        if let Err(mpsc::error::SendError(dropped)) = self.queue.send(notification) {
            tracing::warn!(
                topic = %dropped.topic,
                event = %dropped.event_type,
                "notification dispatcher stopped, dropping notification"
            );
            metrics::counter!("notifications_undelivered_total").increment(1);
        }
    }
}

impl Dispatcher {
    /// Delivers notifications until every [`FanOutHub`] handle is dropped.
    pub async fn run(mut self) {
        while let Some(notification) = self.queue.recv().await {
            self.deliver(notification);
        }
        tracing::debug!("notification dispatcher finished");
    }

    /// Delivers whatever is queued right now without waiting.
    /// Returns the number of notifications taken off the queue.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Ok(notification) = self.queue.try_recv() {
            self.deliver(notification);
            count += 1;
        }
        count
    }

    fn deliver(&self, notification: Notification) {
        let topic = notification.topic;
        let event = notification.event_type;

        let sender = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&topic)
            .cloned();

        // A send error only means nobody is listening.
        match sender.map(|s| s.send(notification)) {
            Some(Ok(receivers)) => {
                tracing::debug!(%topic, %event, receivers, "notification delivered");
            }
            Some(Err(_)) => {
                tracing::debug!(%topic, %event, "subscribers gone, notification dropped");
                metrics::counter!("notifications_undelivered_total").increment(1);
                self.forget_if_idle(topic);
            }
            None => {
                tracing::debug!(%topic, %event, "no subscribers, notification dropped");
                metrics::counter!("notifications_undelivered_total").increment(1);
            }
        }
    }

    fn forget_if_idle(&self, topic: Topic) {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Re-checked under the write lock; a subscribe may have raced us.
        if subscribers
            .get(&topic)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            subscribers.remove(&topic);
        }
    }
}
