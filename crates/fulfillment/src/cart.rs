//! Cart editing. Carts are the user's unbound line items.

use common::{CatalogItemId, LineItemId, Money, OrderId, UserId};
use order_store::{Binding, CatalogItem, LineItem, Store, StoreTx};
use serde::Serialize;

use crate::{FulfillmentError, Result};

/// A cart line with its current catalog item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartEntry {
    pub line: LineItem,
    pub item: Option<CatalogItem>,
}

impl CartEntry {
    /// Price at today's catalog price; zero if the item is gone.
    pub fn subtotal(&self) -> Money {
        self.item
            .as_ref()
            .map_or(Money::zero(), |item| item.price.multiply(self.line.quantity))
    }
}

/// Adds, edits and removes cart lines. Never touches stock.
pub struct CartService<S: Store> {
    store: S,
}

impl<S: Store> CartService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Adds `quantity` of an item, merging into the existing cart line.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        item_id: CatalogItemId,
        quantity: u32,
    ) -> Result<LineItem> {
        if quantity == 0 {
            return Err(FulfillmentError::InvalidQuantity(quantity));
        }

        let mut tx = self.store.begin().await?;
        if tx.catalog_item(item_id).await?.is_none() {
            return Err(FulfillmentError::ItemNotFound(item_id));
        }

        let line = match tx.cart_line(user_id, item_id).await? {
            Some(mut existing) => {
                existing.quantity = existing.quantity.saturating_add(quantity);
                tx.set_line_quantity(existing.id, existing.quantity).await?;
                existing
            }
            None => {
                let line = LineItem::in_cart(user_id, item_id, quantity);
                tx.insert_line_item(&line).await?;
                line
            }
        };

        tx.commit().await?;
        Ok(line)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        line_item_id: LineItemId,
        quantity: u32,
    ) -> Result<LineItem> {
        if quantity == 0 {
            return Err(FulfillmentError::InvalidQuantity(quantity));
        }

        let mut tx = self.store.begin().await?;
        let mut line = unbound_line(&mut tx, line_item_id).await?;
        line.quantity = quantity;
        tx.set_line_quantity(line.id, quantity).await?;
        tx.commit().await?;
        Ok(line)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, line_item_id: LineItemId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let line = unbound_line(&mut tx, line_item_id).await?;
        tx.delete_line_item(line.id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// The user's active cart, oldest line first.
    pub async fn cart(&self, user_id: UserId) -> Result<Vec<CartEntry>> {
        let mut tx = self.store.begin().await?;
        let lines = tx.cart_lines(user_id).await?;
        let mut entries = Vec::with_capacity(lines.len());
        for line in lines {
            let item = tx.catalog_item(line.item_id).await?;
            entries.push(CartEntry { line, item });
        }
        Ok(entries)
    }

    /// Lines bound to one order.
    pub async fn items_for_order(&self, order_id: OrderId) -> Result<Vec<LineItem>> {
        let mut tx = self.store.begin().await?;
        if tx.order(order_id).await?.is_none() {
            return Err(FulfillmentError::OrderNotFound(order_id));
        }
        Ok(tx.order_lines(order_id).await?)
    }
}

async fn unbound_line<T: StoreTx>(tx: &mut T, line_item_id: LineItemId) -> Result<LineItem> {
    let line = tx
        .line_item_for_update(line_item_id)
        .await?
        .ok_or(FulfillmentError::LineItemNotFound(line_item_id))?;
    match line.binding {
        Binding::Cart => Ok(line),
        Binding::Order(order_id) => Err(FulfillmentError::LineItemBound {
            line_item_id,
            order_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use order_store::InMemoryStore;

    use super::*;

    async fn seeded() -> (CartService<InMemoryStore>, InMemoryStore, CatalogItem) {
        let store = InMemoryStore::new();
        let item = CatalogItem::new("Dune", "Frank Herbert", Money::from_cents(1250), 5);
        let mut tx = store.begin().await.unwrap();
        tx.put_catalog_item(&item).await.unwrap();
        tx.commit().await.unwrap();
        (CartService::new(store.clone()), store, item)
    }

    #[tokio::test]
    async fn test_repeated_add_merges_quantity() {
        let (cart, _, item) = seeded().await;
        let user = UserId::new();

        let first = cart.add_item(user, item.id, 1).await.unwrap();
        let second = cart.add_item(user, item.id, 2).await.unwrap();

        assert_eq!(first.id, second.id);
        let entries = cart.cart(user).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].line.quantity, 3);
        assert_eq!(entries[0].subtotal(), Money::from_cents(3750));
    }

    #[tokio::test]
    async fn test_add_rejects_zero_and_unknown_items() {
        let (cart, _, item) = seeded().await;
        let user = UserId::new();

        assert!(matches!(
            cart.add_item(user, item.id, 0).await,
            Err(FulfillmentError::InvalidQuantity(0))
        ));
        assert!(matches!(
            cart.add_item(user, CatalogItemId::new(), 1).await,
            Err(FulfillmentError::ItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cart_edits_do_not_touch_stock() {
        let (cart, store, item) = seeded().await;
        let user = UserId::new();

        let line = cart.add_item(user, item.id, 4).await.unwrap();
        cart.update_quantity(line.id, 2).await.unwrap();
        cart.remove_item(line.id).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.catalog_item(item.id).await.unwrap().unwrap().stock, 5);
        assert!(cart_is_empty(&mut tx, user).await);
    }

    async fn cart_is_empty<T: StoreTx>(tx: &mut T, user: UserId) -> bool {
        tx.cart_lines(user).await.unwrap().is_empty()
    }

    #[tokio::test]
    async fn test_bound_lines_cannot_be_edited() {
        let (cart, store, item) = seeded().await;
        let user = UserId::new();
        let line = cart.add_item(user, item.id, 1).await.unwrap();
        let order_id = OrderId::new();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.bind_line_item(line.id, order_id).await.unwrap());
        tx.commit().await.unwrap();

        assert!(matches!(
            cart.update_quantity(line.id, 3).await,
            Err(FulfillmentError::LineItemBound { .. })
        ));
        assert!(matches!(
            cart.remove_item(line.id).await,
            Err(FulfillmentError::LineItemBound { .. })
        ));
        assert!(matches!(
            cart.remove_item(LineItemId::new()).await,
            Err(FulfillmentError::LineItemNotFound(_))
        ));
    }
}
