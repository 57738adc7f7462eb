use common::AgentId;
use order_store::{DeliveryAgent, Store, StoreTx};

use crate::{FulfillmentError, Result};

/// Lookup and registration of delivery agents.
pub struct AgentDirectory<S: Store> {
    store: S,
}

impl<S: Store> AgentDirectory<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Inserts or replaces an agent.
    #[tracing::instrument(skip(self, agent), fields(agent_id = %agent.id))]
    pub async fn register(&self, agent: &DeliveryAgent) -> Result<()> {
        let mut tx = self.store.begin().await?;
        tx.put_delivery_agent(agent).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, agent_id: AgentId) -> Result<DeliveryAgent> {
        let mut tx = self.store.begin().await?;
        tx.delivery_agent(agent_id)
            .await?
            .ok_or(FulfillmentError::AgentNotFound(agent_id))
    }
}
