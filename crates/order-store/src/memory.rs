use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{
    AgentId, CatalogItemId, LineItemId, NoticeId, OrderId, OrderStatus, UserId, VendorId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Binding, CatalogItem, DeliveryAgent, HistoryEntry, LineItem, OrderQuery, OrderRecord, Result,
    VendorNotice,
    store::{StockDeduction, Store, StoreTx},
};

#[derive(Debug, Clone, Default)]
struct Tables {
    catalog: HashMap<CatalogItemId, CatalogItem>,
    agents: HashMap<AgentId, DeliveryAgent>,
    /// Insertion order doubles as "oldest first".
    line_items: Vec<LineItem>,
    orders: Vec<OrderRecord>,
    history: Vec<HistoryEntry>,
    notices: Vec<VendorNotice>,
}

impl Tables {
    fn line_mut(&mut self, id: LineItemId) -> Option<&mut LineItem> {
        self.line_items.iter_mut().find(|l| l.id == id)
    }

    fn order_mut(&mut self, id: OrderId) -> Option<&mut OrderRecord> {
        self.orders.iter_mut().find(|o| o.id == id)
    }

    fn order_has_vendor(&self, order: OrderId, vendor: VendorId) -> bool {
        self.line_items
            .iter()
            .filter(|l| l.order_id() == Some(order))
            .filter_map(|l| self.catalog.get(&l.item_id))
            .any(|item| item.vendor_id == Some(vendor))
    }
}

/// In-memory store for tests and single-process development.
///
/// Transactions are serialisable: a transaction holds the store's lock from
/// `begin` until it is committed or dropped. Reads go straight to the shared
/// tables. The first write copies them into a private working set that
/// replaces the shared state on commit, so a write costs time proportional to
/// everything stored. Use [`PostgresStore`](crate::PostgresStore) for real
/// data volumes.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    /// Returns the total number of history entries stored.
    pub async fn history_count(&self) -> usize {
        self.tables.lock().await.history.len()
    }

    /// Clears every table.
    pub async fn clear(&self) {
        *self.tables.lock().await = Tables::default();
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        Ok(InMemoryTx {
            guard,
            working: None,
        })
    }
}

/// Transaction over an [`InMemoryStore`].
pub struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    /// Copy-on-write; `None` until the first write.
    working: Option<Tables>,
}

impl InMemoryTx {
    fn tables(&self) -> &Tables {
        self.working.as_ref().unwrap_or(&*self.guard)
    }

    fn tables_mut(&mut self) -> &mut Tables {
        let shared = &self.guard;
        self.working.get_or_insert_with(|| Tables::clone(shared))
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn catalog_item(&mut self, id: CatalogItemId) -> Result<Option<CatalogItem>> {
        Ok(self.tables().catalog.get(&id).cloned())
    }

    async fn put_catalog_item(&mut self, item: &CatalogItem) -> Result<()> {
        self.tables_mut().catalog.insert(item.id, item.clone());
        Ok(())
    }

    async fn deduct_stock(&mut self, id: CatalogItemId, quantity: u32) -> Result<StockDeduction> {
        let Some(item) = self.tables_mut().catalog.get_mut(&id) else {
            return Ok(StockDeduction::Missing);
        };
        if item.stock < quantity {
            return Ok(StockDeduction::Insufficient {
                available: item.stock,
            });
        }
        item.stock -= quantity;
        Ok(StockDeduction::Deducted {
            remaining: item.stock,
        })
    }

    async fn set_stock(&mut self, id: CatalogItemId, stock: u32) -> Result<bool> {
        match self.tables_mut().catalog.get_mut(&id) {
            Some(item) => {
                item.stock = stock;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn restock(&mut self, id: CatalogItemId, quantity: u32) -> Result<Option<u32>> {
        Ok(self.tables_mut().catalog.get_mut(&id).map(|item| {
            item.stock = item.stock.saturating_add(quantity);
            item.stock
        }))
    }

    async fn delivery_agent(&mut self, id: AgentId) -> Result<Option<DeliveryAgent>> {
        Ok(self.tables().agents.get(&id).cloned())
    }

    async fn put_delivery_agent(&mut self, agent: &DeliveryAgent) -> Result<()> {
        self.tables_mut().agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn line_item(&mut self, id: LineItemId) -> Result<Option<LineItem>> {
        Ok(self.tables().line_items.iter().find(|l| l.id == id).cloned())
    }

    async fn line_item_for_update(&mut self, id: LineItemId) -> Result<Option<LineItem>> {
        self.line_item(id).await
    }

    async fn cart_lines(&mut self, user: UserId) -> Result<Vec<LineItem>> {
        Ok(self
            .tables()
            .line_items
            .iter()
            .filter(|l| l.user_id == user && l.binding == Binding::Cart)
            .cloned()
            .collect())
    }

    async fn cart_lines_for_update(&mut self, user: UserId) -> Result<Vec<LineItem>> {
        self.cart_lines(user).await
    }

    async fn cart_line(&mut self, user: UserId, item: CatalogItemId) -> Result<Option<LineItem>> {
        Ok(self
            .tables()
            .line_items
            .iter()
            .find(|l| l.user_id == user && l.item_id == item && l.binding == Binding::Cart)
            .cloned())
    }

    async fn insert_line_item(&mut self, line: &LineItem) -> Result<()> {
        self.tables_mut().line_items.push(line.clone());
        Ok(())
    }

    async fn set_line_quantity(&mut self, id: LineItemId, quantity: u32) -> Result<()> {
        if let Some(line) = self.tables_mut().line_mut(id) {
            line.quantity = quantity;
        }
        Ok(())
    }

    async fn delete_line_item(&mut self, id: LineItemId) -> Result<()> {
        self.tables_mut().line_items.retain(|l| l.id != id);
        Ok(())
    }

    async fn bind_line_item(&mut self, id: LineItemId, order: OrderId) -> Result<bool> {
        let unbound = self
            .tables()
            .line_items
            .iter()
            .any(|l| l.id == id && l.binding == Binding::Cart);
        if !unbound {
            return Ok(false);
        }
        if let Some(line) = self.tables_mut().line_mut(id) {
            line.binding = Binding::Order(order);
        }
        Ok(true)
    }

    async fn order_lines(&mut self, order: OrderId) -> Result<Vec<LineItem>> {
        Ok(self
            .tables()
            .line_items
            .iter()
            .filter(|l| l.order_id() == Some(order))
            .cloned()
            .collect())
    }

    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()> {
        self.tables_mut().orders.push(order.clone());
        Ok(())
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.tables().orders.iter().find(|o| o.id == id).cloned())
    }

    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        // The whole store is already locked by this transaction.
        self.order(id).await
    }

    async fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<()> {
        if let Some(order) = self.tables_mut().order_mut(id) {
            order.status = status;
        }
        Ok(())
    }

    async fn claim_order(
        &mut self,
        id: OrderId,
        agent: AgentId,
        allowed: &[OrderStatus],
        status: OrderStatus,
    ) -> Result<bool> {
        match self.tables_mut().order_mut(id) {
            Some(order) if order.assigned_agent.is_none() && allowed.contains(&order.status) => {
                order.assigned_agent = Some(agent);
                order.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_orders(&mut self, query: &OrderQuery) -> Result<Vec<OrderRecord>> {
        let tables = self.tables();
        let mut orders: Vec<OrderRecord> = tables
            .orders
            .iter()
            .rev()
            .filter(|o| query.matches_record(o))
            .filter(|o| match query.vendor {
                Some(vendor) => tables.order_has_vendor(o.id, vendor),
                None => true,
            })
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<bool> {
        if !self.tables().orders.iter().any(|o| o.id == id) {
            return Ok(false);
        }
        let tables = self.tables_mut();
        tables.orders.retain(|o| o.id != id);
        tables.line_items.retain(|l| l.order_id() != Some(id));
        tables.history.retain(|h| h.order_id != id);
        Ok(true)
    }

    async fn append_history(&mut self, entry: &HistoryEntry) -> Result<()> {
        self.tables_mut().history.push(entry.clone());
        Ok(())
    }

    async fn history(&mut self, order: OrderId) -> Result<Vec<HistoryEntry>> {
        let mut entries: Vec<HistoryEntry> = self
            .tables()
            .history
            .iter()
            .filter(|h| h.order_id == order)
            .cloned()
            .collect();
        entries.sort_by_key(|h| h.recorded_at);
        Ok(entries)
    }

    async fn insert_vendor_notice(&mut self, notice: &VendorNotice) -> Result<()> {
        self.tables_mut().notices.push(notice.clone());
        Ok(())
    }

    async fn vendor_notices(&mut self, vendor: VendorId) -> Result<Vec<VendorNotice>> {
        let mut notices: Vec<VendorNotice> = self
            .tables()
            .notices
            .iter()
            .rev()
            .filter(|n| n.vendor_id == vendor)
            .cloned()
            .collect();
        notices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notices)
    }

    async fn mark_notice_read(&mut self, id: NoticeId) -> Result<bool> {
        match self.tables_mut().notices.iter_mut().find(|n| n.id == id) {
            Some(notice) => {
                notice.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_vendor_notices_read(&mut self, vendor: VendorId) -> Result<u64> {
        let mut changed = 0;
        for notice in self
            .tables_mut()
            .notices
            .iter_mut()
            .filter(|n| n.vendor_id == vendor && !n.read)
        {
            notice.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn commit(self) -> Result<()> {
        let InMemoryTx { mut guard, working } = self;
        if let Some(working) = working {
            *guard = working;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::Money;

    use super::*;

    fn order_for(user: UserId, status: OrderStatus) -> OrderRecord {
        OrderRecord {
            id: OrderId::new(),
            user_id: user,
            total: Money::from_dollars(10),
            address: "1 Main St".to_string(),
            phone: "555-0100".to_string(),
            status,
            payment_method: "CARD".to_string(),
            created_at: Utc::now(),
            assigned_agent: None,
        }
    }

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let store = InMemoryStore::new();
        let order = order_for(UserId::new(), OrderStatus::New);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.order(order.id).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let store = InMemoryStore::new();
        let item = CatalogItem::new("Dune", "Frank Herbert", Money::from_dollars(10), 5);

        let mut tx = store.begin().await.unwrap();
        tx.put_catalog_item(&item).await.unwrap();
        tx.commit().await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.deduct_stock(item.id, 3).await.unwrap();
            tx.insert_order(&order_for(UserId::new(), OrderStatus::New))
                .await
                .unwrap();
            // dropped without commit
        }

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.catalog_item(item.id).await.unwrap().unwrap().stock, 5);
        assert_eq!(store_orders(&mut tx).await, 0);
    }

    async fn store_orders(tx: &mut InMemoryTx) -> usize {
        tx.find_orders(&OrderQuery::all()).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_deduct_stock_outcomes() {
        let store = InMemoryStore::new();
        let item = CatalogItem::new("Emma", "Jane Austen", Money::from_dollars(7), 2);
        let mut tx = store.begin().await.unwrap();
        tx.put_catalog_item(&item).await.unwrap();

        assert_eq!(
            tx.deduct_stock(item.id, 3).await.unwrap(),
            StockDeduction::Insufficient { available: 2 }
        );
        assert_eq!(
            tx.deduct_stock(item.id, 2).await.unwrap(),
            StockDeduction::Deducted { remaining: 0 }
        );
        assert_eq!(
            tx.deduct_stock(CatalogItemId::new(), 1).await.unwrap(),
            StockDeduction::Missing
        );
    }

    #[tokio::test]
    async fn test_claim_is_compare_and_set() {
        let store = InMemoryStore::new();
        let order = order_for(UserId::new(), OrderStatus::ReadyForDelivery);
        let allowed = [OrderStatus::ReadyForDelivery];

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();

        let first = AgentId::new();
        assert!(
            tx.claim_order(order.id, first, &allowed, OrderStatus::Shipped)
                .await
                .unwrap()
        );
        assert!(
            !tx.claim_order(order.id, AgentId::new(), &allowed, OrderStatus::Shipped)
                .await
                .unwrap()
        );

        let stored = tx.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.assigned_agent, Some(first));
        assert_eq!(stored.status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn test_vendor_filter_joins_line_items() {
        let store = InMemoryStore::new();
        let vendor = VendorId::new();
        let user = UserId::new();
        let item = CatalogItem::new("Ulysses", "James Joyce", Money::from_dollars(12), 4)
            .sold_by(vendor);
        let vendor_order = order_for(user, OrderStatus::New);
        let platform_order = order_for(user, OrderStatus::New);

        let mut tx = store.begin().await.unwrap();
        tx.put_catalog_item(&item).await.unwrap();
        tx.insert_order(&vendor_order).await.unwrap();
        tx.insert_order(&platform_order).await.unwrap();
        let line = LineItem::in_cart(user, item.id, 1);
        tx.insert_line_item(&line).await.unwrap();
        assert!(tx.bind_line_item(line.id, vendor_order.id).await.unwrap());

        let found = tx
            .find_orders(&OrderQuery::for_vendor(vendor))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, vendor_order.id);
        assert!(tx.cart_lines(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_order_cascades() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let order = order_for(user, OrderStatus::New);
        let line = LineItem::in_cart(user, CatalogItemId::new(), 1);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.insert_line_item(&line).await.unwrap();
        assert!(tx.bind_line_item(line.id, order.id).await.unwrap());
        tx.append_history(&HistoryEntry {
            order_id: order.id,
            status: OrderStatus::New,
            recorded_at: Utc::now(),
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.delete_order(order.id).await.unwrap());
        assert!(!tx.delete_order(order.id).await.unwrap());
        assert!(tx.order_lines(order.id).await.unwrap().is_empty());
        assert!(tx.history(order.id).await.unwrap().is_empty());
        tx.commit().await.unwrap();

        assert_eq!(store.history_count().await, 0);
    }

    #[tokio::test]
    async fn test_bind_only_moves_cart_lines() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let first = order_for(user, OrderStatus::New);
        let second = order_for(user, OrderStatus::New);
        let line = LineItem::in_cart(user, CatalogItemId::new(), 2);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&first).await.unwrap();
        tx.insert_order(&second).await.unwrap();
        tx.insert_line_item(&line).await.unwrap();

        assert!(tx.bind_line_item(line.id, first.id).await.unwrap());
        assert!(!tx.bind_line_item(line.id, second.id).await.unwrap());
        assert!(!tx.bind_line_item(LineItemId::new(), second.id).await.unwrap());
        assert_eq!(tx.order_lines(first.id).await.unwrap().len(), 1);
        assert!(tx.order_lines(second.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_only_commit_keeps_state() {
        let store = InMemoryStore::new();
        let order = order_for(UserId::new(), OrderStatus::New);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.order(order.id).await.unwrap().is_some());
        assert!(!tx.delete_order(OrderId::new()).await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(store.order_count().await, 1);
    }
}
