use async_trait::async_trait;
use common::{
    AgentId, CatalogItemId, LineItemId, NoticeId, OrderId, OrderStatus, UserId, VendorId,
};

use crate::{
    CatalogItem, DeliveryAgent, HistoryEntry, LineItem, OrderQuery, OrderRecord, Result,
    VendorNotice,
};

/// Outcome of a conditional stock deduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDeduction {
    /// Stock was decremented; `remaining` is the new count.
    Deducted { remaining: u32 },
    /// Not enough stock; nothing was changed.
    Insufficient { available: u32 },
    /// No catalog item with that id.
    Missing,
}

/// Entry point of a transactional store.
///
/// Every read and write goes through a [`StoreTx`]. Writes become visible to
/// other transactions only after [`StoreTx::commit`]; dropping a transaction
/// without committing discards all of its writes.
#[async_trait]
pub trait Store: Send + Sync {
    /// The transaction type handed out by this store.
    type Tx: StoreTx;

    /// Starts a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// A unit of work over the catalog, carts, orders, history and vendor inbox.
#[async_trait]
pub trait StoreTx: Send + Sized {
    // -- Catalog and stock ledger --

    async fn catalog_item(&mut self, id: CatalogItemId) -> Result<Option<CatalogItem>>;

    /// Inserts or replaces a catalog item.
    async fn put_catalog_item(&mut self, item: &CatalogItem) -> Result<()>;

    /// Decrements stock by `quantity` only if enough is available.
    async fn deduct_stock(&mut self, id: CatalogItemId, quantity: u32) -> Result<StockDeduction>;

    /// Overwrites the stock count. Returns false if the item does not exist.
    async fn set_stock(&mut self, id: CatalogItemId, stock: u32) -> Result<bool>;

    /// Adds `quantity` to the stock count, saturating at `u32::MAX`.
    /// Returns the new count, or `None` if the item does not exist.
    async fn restock(&mut self, id: CatalogItemId, quantity: u32) -> Result<Option<u32>>;

    // -- Delivery agents --

    async fn delivery_agent(&mut self, id: AgentId) -> Result<Option<DeliveryAgent>>;

    /// Inserts or replaces a delivery agent.
    async fn put_delivery_agent(&mut self, agent: &DeliveryAgent) -> Result<()>;

    // -- Line items --

    async fn line_item(&mut self, id: LineItemId) -> Result<Option<LineItem>>;

    /// Loads a line item and locks it until the transaction ends.
    async fn line_item_for_update(&mut self, id: LineItemId) -> Result<Option<LineItem>>;

    /// Returns the user's cart lines, oldest first.
    async fn cart_lines(&mut self, user: UserId) -> Result<Vec<LineItem>>;

    /// Like [`cart_lines`](Self::cart_lines), locking the lines until the
    /// transaction ends. A line bound by a concurrent transaction that
    /// committed first is not returned.
    async fn cart_lines_for_update(&mut self, user: UserId) -> Result<Vec<LineItem>>;

    /// Returns the user's cart line for one catalog item, if any, locked
    /// until the transaction ends.
    async fn cart_line(&mut self, user: UserId, item: CatalogItemId) -> Result<Option<LineItem>>;

    async fn insert_line_item(&mut self, line: &LineItem) -> Result<()>;

    async fn set_line_quantity(&mut self, id: LineItemId, quantity: u32) -> Result<()>;

    async fn delete_line_item(&mut self, id: LineItemId) -> Result<()>;

    /// Moves a cart line into an order.
    ///
    /// Returns false, changing nothing, if the line is missing or already
    /// bound.
    async fn bind_line_item(&mut self, id: LineItemId, order: OrderId) -> Result<bool>;

    /// Returns the lines bound to an order, oldest first.
    async fn order_lines(&mut self, order: OrderId) -> Result<Vec<LineItem>>;

    // -- Orders --

    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()>;

    async fn order(&mut self, id: OrderId) -> Result<Option<OrderRecord>>;

    /// Loads an order and locks it until the transaction ends.
    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<OrderRecord>>;

    async fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<()>;

    /// Compare-and-set: assigns `agent` and moves to `status` only if no agent
    /// is assigned yet and the current status is one of `allowed`.
    ///
    /// Returns false, changing nothing, if the precondition does not hold.
    async fn claim_order(
        &mut self,
        id: OrderId,
        agent: AgentId,
        allowed: &[OrderStatus],
        status: OrderStatus,
    ) -> Result<bool>;

    async fn find_orders(&mut self, query: &OrderQuery) -> Result<Vec<OrderRecord>>;

    /// Deletes an order together with its lines and history.
    /// Returns false if it did not exist.
    async fn delete_order(&mut self, id: OrderId) -> Result<bool>;

    // -- History --

    async fn append_history(&mut self, entry: &HistoryEntry) -> Result<()>;

    /// Returns the order's history in chronological order.
    async fn history(&mut self, order: OrderId) -> Result<Vec<HistoryEntry>>;

    // -- Vendor inbox --

    async fn insert_vendor_notice(&mut self, notice: &VendorNotice) -> Result<()>;

    /// Returns a vendor's notices, newest first.
    async fn vendor_notices(&mut self, vendor: VendorId) -> Result<Vec<VendorNotice>>;

    /// Returns false if the notice does not exist.
    async fn mark_notice_read(&mut self, id: NoticeId) -> Result<bool>;

    /// Returns the number of notices that changed.
    async fn mark_vendor_notices_read(&mut self, vendor: VendorId) -> Result<u64>;

    /// Makes every write of this transaction durable and visible.
    async fn commit(self) -> Result<()>;
}
