//! Stock ledger operations available outside checkout.

use std::sync::Arc;

use common::CatalogItemId;
use notifications::{EventType, Notification, NotificationPublisher, Topic};
use order_store::{CatalogItem, StockDeduction, Store, StoreTx};

use crate::{FulfillmentError, Result};

/// Authoritative per-item stock counts.
pub struct StockLedger<S: Store> {
    store: S,
    publisher: Arc<dyn NotificationPublisher>,
}

impl<S: Store> StockLedger<S> {
    pub fn new(store: S, publisher: Arc<dyn NotificationPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Inserts or replaces a catalog item.
    #[tracing::instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn register_item(&self, item: &CatalogItem) -> Result<()> {
        let mut tx = self.store.begin().await?;
        tx.put_catalog_item(item).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn item(&self, item_id: CatalogItemId) -> Result<CatalogItem> {
        let mut tx = self.store.begin().await?;
        tx.catalog_item(item_id)
            .await?
            .ok_or(FulfillmentError::ItemNotFound(item_id))
    }

    pub async fn stock(&self, item_id: CatalogItemId) -> Result<u32> {
        Ok(self.item(item_id).await?.stock)
    }

    /// Deducts `quantity` if available. Returns the remaining stock.
    #[tracing::instrument(skip(self))]
    pub async fn deduct(&self, item_id: CatalogItemId, quantity: u32) -> Result<u32> {
        let mut tx = self.store.begin().await?;
        let remaining = match tx.deduct_stock(item_id, quantity).await? {
            StockDeduction::Deducted { remaining } => remaining,
            StockDeduction::Insufficient { available } => {
                let title = tx
                    .catalog_item(item_id)
                    .await?
                    .map(|item| item.title)
                    .unwrap_or_default();
                return Err(FulfillmentError::InsufficientStock {
                    item_id,
                    title,
                    requested: quantity,
                    available,
                });
            }
            StockDeduction::Missing => return Err(FulfillmentError::ItemNotFound(item_id)),
        };
        tx.commit().await?;
        Ok(remaining)
    }

    /// Overwrites the stock count. Vendor-owned items notify their vendor with
    /// `INVENTORY_UPDATE`.
    #[tracing::instrument(skip(self))]
    pub async fn set_stock(&self, item_id: CatalogItemId, stock: i64) -> Result<CatalogItem> {
        let Ok(stock) = u32::try_from(stock) else {
            return Err(FulfillmentError::NegativeStock {
                item_id,
                requested: stock,
            });
        };

        let mut tx = self.store.begin().await?;
        if !tx.set_stock(item_id, stock).await? {
            return Err(FulfillmentError::ItemNotFound(item_id));
        }
        self.finish(tx, item_id).await
    }

    /// Returns `quantity` units to stock. Notifies like [`set_stock`](Self::set_stock).
    #[tracing::instrument(skip(self))]
    pub async fn restore(&self, item_id: CatalogItemId, quantity: u32) -> Result<CatalogItem> {
        let mut tx = self.store.begin().await?;
        if tx.restock(item_id, quantity).await?.is_none() {
            return Err(FulfillmentError::ItemNotFound(item_id));
        }
        self.finish(tx, item_id).await
    }

    async fn finish(&self, mut tx: S::Tx, item_id: CatalogItemId) -> Result<CatalogItem> {
        let item = tx
            .catalog_item(item_id)
            .await?
            .ok_or(FulfillmentError::ItemNotFound(item_id))?;
        let notification = match item.vendor_id {
            Some(vendor) => Some(Notification::new(
                Topic::Vendor(vendor),
                EventType::InventoryUpdate,
                serde_json::to_value(&item)?,
            )),
            None => None,
        };
        tx.commit().await?;

        tracing::info!(%item_id, stock = item.stock, "stock updated");
        if let Some(notification) = notification {
            self.publisher.publish(notification);
        }
        Ok(item)
    }
}
