//! Order status values and the predicates of the status state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
///                 ┌──► PENDING ──► READY_FOR_DELIVERY ──┐
/// NEW ────────────┤                                     ├──► SHIPPED ──► DELIVERED
///                 └──────────────► READY_FOR_DELIVERY ──┤
///                                  CONFIRMED ───────────┘
///
/// any non-terminal ──► CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Just created, awaiting platform admin review.
    New,

    /// Confirmed by the admin, awaiting vendor action.
    Pending,

    /// Vendor-side accepted state, eligible for admin assignment.
    Confirmed,

    /// Ready to be picked up by a delivery agent.
    ReadyForDelivery,

    /// Picked up by a delivery agent.
    Shipped,

    /// Delivered to the user (terminal state).
    Delivered,

    /// Cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::New,
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::ReadyForDelivery,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Returns true if the platform admin may review the order.
    pub fn can_admin_confirm(&self) -> bool {
        matches!(self, OrderStatus::New)
    }

    /// Returns true if the owning vendor may accept the order.
    pub fn can_vendor_confirm(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    /// Returns true if a delivery agent may claim the order for themselves.
    pub fn can_self_claim(&self) -> bool {
        matches!(self, OrderStatus::ReadyForDelivery)
    }

    /// Returns true if an admin may assign a delivery agent directly.
    pub fn can_admin_assign(&self) -> bool {
        matches!(self, OrderStatus::ReadyForDelivery | OrderStatus::Confirmed)
    }

    /// Returns true if an agent may report the order as shipped.
    pub fn can_ship(&self) -> bool {
        matches!(self, OrderStatus::ReadyForDelivery | OrderStatus::Confirmed)
    }

    /// Returns true if an agent may report the order as delivered.
    pub fn can_deliver(&self) -> bool {
        matches!(self, OrderStatus::Shipped)
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::ReadyForDelivery => "READY_FOR_DELIVERY",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a string is not a known order status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown order status: {0}")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = ParseStatusError;

    /// Parses a status name, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_new_can_be_admin_confirmed() {
        for status in OrderStatus::ALL {
            assert_eq!(status.can_admin_confirm(), status == OrderStatus::New);
        }
    }

    #[test]
    fn test_claim_preconditions_differ_by_path() {
        assert!(OrderStatus::ReadyForDelivery.can_self_claim());
        assert!(!OrderStatus::Confirmed.can_self_claim());
        assert!(OrderStatus::ReadyForDelivery.can_admin_assign());
        assert!(OrderStatus::Confirmed.can_admin_assign());
        assert!(!OrderStatus::Pending.can_admin_assign());
        assert!(!OrderStatus::Shipped.can_admin_assign());
    }

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = OrderStatus::ALL
            .into_iter()
            .filter(OrderStatus::is_terminal)
            .collect();
        assert_eq!(terminal, vec![OrderStatus::Delivered, OrderStatus::Cancelled]);
        assert!(!OrderStatus::Delivered.can_cancel());
        assert!(OrderStatus::Shipped.can_cancel());
    }

    #[test]
    fn test_wire_names_round_trip() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            " delivered ".parse::<OrderStatus>().unwrap(),
            OrderStatus::Delivered
        );
        assert_eq!(
            "ready_for_delivery".parse::<OrderStatus>().unwrap(),
            OrderStatus::ReadyForDelivery
        );
        assert_eq!(
            "PICKED_UP".parse::<OrderStatus>(),
            Err(ParseStatusError("PICKED_UP".to_string()))
        );
    }
}
