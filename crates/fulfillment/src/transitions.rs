//! The order status state machine.
//!
//! Every lifecycle operation is expressed as a [`Transition`]; `target`
//! returns the status the order moves to, or `None` if the transition is not
//! permitted from the current status.

use chrono::{DateTime, Utc};
use common::OrderStatus;
use order_store::HistoryEntry;

/// A lifecycle operation on one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Platform admin review. Vendor orders wait for the vendor; platform
    /// orders skip straight to delivery.
    AdminConfirm { has_vendor: bool },
    /// Vendor accepts the order.
    VendorConfirm,
    /// A delivery agent takes an available order.
    SelfClaim,
    /// An admin assigns a delivery agent.
    AdminAssign,
    /// A status reported by the delivery side.
    Report(OrderStatus),
}

impl Transition {
    pub fn target(&self, current: OrderStatus) -> Option<OrderStatus> {
        match *self {
            Transition::AdminConfirm { has_vendor } if current.can_admin_confirm() => {
                Some(if has_vendor {
                    OrderStatus::Pending
                } else {
                    OrderStatus::ReadyForDelivery
                })
            }
            Transition::VendorConfirm if current.can_vendor_confirm() => {
                Some(OrderStatus::ReadyForDelivery)
            }
            Transition::SelfClaim if current.can_self_claim() => Some(OrderStatus::Shipped),
            Transition::AdminAssign if current.can_admin_assign() => Some(OrderStatus::Shipped),
            Transition::Report(target) => {
                let allowed = match target {
                    OrderStatus::Shipped => current.can_ship(),
                    OrderStatus::Delivered => current.can_deliver(),
                    OrderStatus::Cancelled => current.can_cancel(),
                    _ => false,
                };
                allowed.then_some(target)
            }
            _ => None,
        }
    }

    /// Every status from which this transition is permitted.
    pub fn allowed_from(&self) -> Vec<OrderStatus> {
        OrderStatus::ALL
            .into_iter()
            .filter(|status| self.target(*status).is_some())
            .collect()
    }

    /// Short verb phrase used in error messages and logs.
    pub fn describe(&self) -> String {
        match self {
            Transition::AdminConfirm { .. } => "admin-confirm".to_string(),
            Transition::VendorConfirm => "vendor-confirm".to_string(),
            Transition::SelfClaim => "claim".to_string(),
            Transition::AdminAssign => "assign".to_string(),
            Transition::Report(target) => format!("move to {target}"),
        }
    }
}

/// Timestamp for the next history entry. Never earlier than the previous one.
pub fn next_history_timestamp(
    previous: Option<&HistoryEntry>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match previous {
        Some(entry) if entry.recorded_at > now => entry.recorded_at,
        _ => now,
    }
}
