//! Notification fan-out.
//!
//! The orchestrator hands finished [`Notification`]s to a
//! [`NotificationPublisher`]. Publishing never blocks and never fails from the
//! caller's point of view; delivery to live subscribers happens on a separate
//! task owned by the [`Dispatcher`].

pub mod hub;
pub mod notification;
pub mod publisher;
pub mod topic;

pub use hub::{Dispatcher, FanOutHub};
pub use notification::Notification;
pub use publisher::{NotificationPublisher, RecordingPublisher};
pub use topic::{EventType, Topic};
