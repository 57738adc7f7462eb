//! The enriched order returned by every read and write.

use std::collections::BTreeSet;

use common::{CatalogItemId, LineItemId, Money, OrderId, OrderStatus, VendorId};
use order_store::{CatalogItem, HistoryEntry, OrderRecord, StoreTx};
use serde::Serialize;

use crate::{FulfillmentError, Result};

/// One bound line with its catalog item resolved at read time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    pub line_item_id: LineItemId,
    pub item_id: CatalogItemId,
    pub quantity: u32,
    /// Current catalog snapshot; `None` if the item was removed from the catalog.
    pub item: Option<CatalogItem>,
}

impl OrderItem {
    pub fn vendor_id(&self) -> Option<VendorId> {
        self.item.as_ref().and_then(|item| item.vendor_id)
    }
}

/// An order with its items and history.
///
/// `total` and `history` are persisted values; item details are resolved live
/// so titles and images reflect the catalog as it is now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    #[serde(flatten)]
    pub record: OrderRecord,
    pub items: Vec<OrderItem>,
    pub history: Vec<HistoryEntry>,
}

impl Order {
    /// Loads the items and history of `record` inside `tx`.
    pub async fn enrich<T: StoreTx>(tx: &mut T, record: OrderRecord) -> Result<Self> {
        let lines = tx.order_lines(record.id).await?;
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            items.push(OrderItem {
                line_item_id: line.id,
                item_id: line.item_id,
                quantity: line.quantity,
                item: tx.catalog_item(line.item_id).await?,
            });
        }
        let history = tx.history(record.id).await?;

        Ok(Self {
            record,
            items,
            history,
        })
    }

    /// Loads and enriches an order by id.
    pub async fn load<T: StoreTx>(tx: &mut T, id: OrderId) -> Result<Self> {
        let record = tx
            .order(id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(id))?;
        Self::enrich(tx, record).await
    }

    pub fn id(&self) -> OrderId {
        self.record.id
    }

    pub fn status(&self) -> OrderStatus {
        self.record.status
    }

    pub fn total(&self) -> Money {
        self.record.total
    }

    /// Every vendor represented among the order's items.
    pub fn vendors(&self) -> BTreeSet<VendorId> {
        self.items.iter().filter_map(OrderItem::vendor_id).collect()
    }

    pub fn is_vendor_order(&self) -> bool {
        self.items.iter().any(|item| item.vendor_id().is_some())
    }

    /// JSON form used as a notification payload.
    pub fn to_payload(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
