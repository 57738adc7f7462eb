//! Persisted records.

use chrono::{DateTime, Utc};
use common::{
    AgentId, CatalogItemId, LineItemId, Money, NoticeId, OrderId, OrderStatus, UserId, VendorId,
};
use serde::{Deserialize, Serialize};

/// A catalog entry with its authoritative price and available stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: CatalogItemId,
    pub title: String,
    pub author: String,
    pub price: Money,
    pub stock: u32,
    /// Owning vendor; `None` for platform-sold items.
    pub vendor_id: Option<VendorId>,
    pub image: Option<String>,
}

impl CatalogItem {
    /// Creates a platform-owned item with no image.
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        price: Money,
        stock: u32,
    ) -> Self {
        Self {
            id: CatalogItemId::new(),
            title: title.into(),
            author: author.into(),
            price,
            stock,
            vendor_id: None,
            image: None,
        }
    }

    /// Assigns the item to a vendor.
    pub fn sold_by(mut self, vendor_id: VendorId) -> Self {
        self.vendor_id = Some(vendor_id);
        self
    }
}

/// A delivery agent as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAgent {
    pub id: AgentId,
    pub name: String,
    pub phone: Option<String>,
    pub area: Option<String>,
}

impl DeliveryAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            phone: None,
            area: None,
        }
    }
}

/// Whether a line item still sits in a cart or belongs to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "order_id", rename_all = "snake_case")]
pub enum Binding {
    /// Part of the user's active cart.
    Cart,
    /// Bound to an order at checkout; identity is frozen from here on.
    Order(OrderId),
}

/// A (user, catalog item, quantity) line, either in a cart or in an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub user_id: UserId,
    pub item_id: CatalogItemId,
    pub quantity: u32,
    pub binding: Binding,
}

impl LineItem {
    /// Creates a new unbound cart line.
    pub fn in_cart(user_id: UserId, item_id: CatalogItemId, quantity: u32) -> Self {
        Self {
            id: LineItemId::new(),
            user_id,
            item_id,
            quantity,
            binding: Binding::Cart,
        }
    }

    /// Returns the owning order, if bound.
    pub fn order_id(&self) -> Option<OrderId> {
        match self.binding {
            Binding::Cart => None,
            Binding::Order(id) => Some(id),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.order_id().is_some()
    }
}

/// The persisted order row. Items and history are stored separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub user_id: UserId,
    pub total: Money,
    pub address: String,
    pub phone: String,
    pub status: OrderStatus,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
    pub assigned_agent: Option<AgentId>,
}

/// One status an order passed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub recorded_at: DateTime<Utc>,
}

/// A message kept in a vendor's inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorNotice {
    pub id: NoticeId,
    pub vendor_id: VendorId,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl VendorNotice {
    pub fn unread(
        vendor_id: VendorId,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NoticeId::new(),
            vendor_id,
            message: message.into(),
            created_at,
            read: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cart_line_has_no_order() {
        let line = LineItem::in_cart(UserId::new(), CatalogItemId::new(), 2);
        assert_eq!(line.order_id(), None);
        assert!(!line.is_bound());
    }

    #[test]
    fn bound_line_reports_its_order() {
        let order_id = OrderId::new();
        let mut line = LineItem::in_cart(UserId::new(), CatalogItemId::new(), 1);
        line.binding = Binding::Order(order_id);
        assert_eq!(line.order_id(), Some(order_id));
    }

    #[test]
    fn binding_serializes_with_tag() {
        let json = serde_json::to_value(Binding::Cart).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "cart" }));
    }
}
