use std::fmt;

use common::{AgentId, UserId, VendorId};
use serde::{Deserialize, Serialize};

/// A notification destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "class", content = "id", rename_all = "snake_case")]
pub enum Topic {
    Vendor(VendorId),
    DeliveryAgent(AgentId),
    User(UserId),
    /// Broadcast to every connected administrator.
    Admins,
}

impl Topic {
    /// Returns the subscription path clients listen on.
    pub fn path(&self) -> String {
        match self {
            Topic::Vendor(id) => format!("/topic/vendor/{id}"),
            Topic::DeliveryAgent(id) => format!("/topic/delivery/{id}"),
            Topic::User(id) => format!("/topic/user/{id}"),
            Topic::Admins => "/topic/admin".to_string(),
        }
    }

    /// Returns the recipient class as a static label, for logs and metrics.
    pub fn class(&self) -> &'static str {
        match self {
            Topic::Vendor(_) => "vendor",
            Topic::DeliveryAgent(_) => "delivery",
            Topic::User(_) => "user",
            Topic::Admins => "admin",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Kind of notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    NewOrder,
    OrderUpdate,
    InventoryUpdate,
    NewAssignment,
    /// Free-form human-readable message.
    Notification,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NewOrder => "NEW_ORDER",
            EventType::OrderUpdate => "ORDER_UPDATE",
            EventType::InventoryUpdate => "INVENTORY_UPDATE",
            EventType::NewAssignment => "NEW_ASSIGNMENT",
            EventType::Notification => "NOTIFICATION",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_paths() {
        let vendor = VendorId::new();
        assert_eq!(Topic::Vendor(vendor).path(), format!("/topic/vendor/{vendor}"));
        let agent = AgentId::new();
        assert_eq!(
            Topic::DeliveryAgent(agent).path(),
            format!("/topic/delivery/{agent}")
        );
        assert_eq!(Topic::Admins.path(), "/topic/admin");
    }

    #[test]
    fn event_type_serializes_as_wire_name() {
        for event in [
            EventType::NewOrder,
            EventType::OrderUpdate,
            EventType::InventoryUpdate,
            EventType::NewAssignment,
            EventType::Notification,
        ] {
            let json = serde_json::to_string(&event).unwrap();
            assert_eq!(json, format!("\"{}\"", event.as_str()));
        }
    }
}
