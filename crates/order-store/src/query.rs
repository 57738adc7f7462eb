use common::{AgentId, OrderStatus, UserId, VendorId};

use crate::OrderRecord;

/// Builder for order queries.
///
/// All filters are combined with AND. Results are returned newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    /// Filter by owning user.
    pub user: Option<UserId>,

    /// Filter to orders containing at least one item sold by this vendor.
    pub vendor: Option<VendorId>,

    /// Filter by assigned delivery agent.
    pub agent: Option<AgentId>,

    /// Filter by current status.
    pub status: Option<OrderStatus>,

    /// Only orders with no delivery agent assigned.
    pub unassigned_only: bool,
}

impl OrderQuery {
    /// Creates a query matching every order.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_user(user: UserId) -> Self {
        Self::all().user(user)
    }

    pub fn for_vendor(vendor: VendorId) -> Self {
        Self::all().vendor(vendor)
    }

    pub fn for_agent(agent: AgentId) -> Self {
        Self::all().agent(agent)
    }

    /// Orders waiting for a delivery agent to pick them up.
    pub fn available_for_delivery() -> Self {
        Self::all()
            .status(OrderStatus::ReadyForDelivery)
            .unassigned()
    }

    pub fn user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    pub fn vendor(mut self, vendor: VendorId) -> Self {
        self.vendor = Some(vendor);
        self
    }

    pub fn agent(mut self, agent: AgentId) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn unassigned(mut self) -> Self {
        self.unassigned_only = true;
        self
    }

    /// Checks the row-level filters. The vendor filter needs line items and
    /// is evaluated by the store.
    pub fn matches_record(&self, order: &OrderRecord) -> bool {
        if let Some(user) = self.user
            && order.user_id != user
        {
            return false;
        }
        if let Some(agent) = self.agent
            && order.assigned_agent != Some(agent)
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if self.unassigned_only && order.assigned_agent.is_some() {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::{Money, OrderId};

    use super::*;

    fn record(status: OrderStatus, agent: Option<AgentId>) -> OrderRecord {
        OrderRecord {
            id: OrderId::new(),
            user_id: UserId::new(),
            total: Money::from_dollars(5),
            address: "1 Main St".to_string(),
            phone: "555-0100".to_string(),
            status,
            payment_method: "CARD".to_string(),
            created_at: Utc::now(),
            assigned_agent: agent,
        }
    }

    #[test]
    fn all_matches_everything() {
        assert!(OrderQuery::all().matches_record(&record(OrderStatus::New, None)));
    }

    #[test]
    fn available_for_delivery_requires_status_and_no_agent() {
        let query = OrderQuery::available_for_delivery();
        assert!(query.matches_record(&record(OrderStatus::ReadyForDelivery, None)));
        assert!(!query.matches_record(&record(
            OrderStatus::ReadyForDelivery,
            Some(AgentId::new())
        )));
        assert!(!query.matches_record(&record(OrderStatus::Pending, None)));
    }

    #[test]
    fn user_and_agent_filters() {
        let agent = AgentId::new();
        let order = record(OrderStatus::Shipped, Some(agent));
        assert!(OrderQuery::for_agent(agent).matches_record(&order));
        assert!(!OrderQuery::for_agent(AgentId::new()).matches_record(&order));
        assert!(OrderQuery::for_user(order.user_id).matches_record(&order));
        assert!(!OrderQuery::for_user(UserId::new()).matches_record(&order));
    }
}
