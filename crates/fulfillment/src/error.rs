//! Fulfillment error types.

use common::{
    AgentId, CatalogItemId, LineItemId, NoticeId, OrderId, OrderStatus, ParseStatusError, UserId,
};
use order_store::StoreError;
use thiserror::Error;

/// Errors that can occur during fulfillment operations.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("No items in cart for user {0}")]
    EmptyCart(UserId),

    #[error("Catalog item not found: {0}")]
    ItemNotFound(CatalogItemId),

    #[error("Insufficient stock for '{title}': requested {requested}, available {available}")]
    InsufficientStock {
        item_id: CatalogItemId,
        title: String,
        requested: u32,
        available: u32,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Delivery agent not found: {0}")]
    AgentNotFound(AgentId),

    /// The order already has a delivery agent.
    #[error("Order {0} is already assigned to a delivery agent")]
    AlreadyAssigned(OrderId),

    /// The order's current status does not permit the operation.
    #[error("Cannot {action} order {order_id} in status {status}")]
    InvalidState {
        order_id: OrderId,
        status: OrderStatus,
        action: String,
    },

    #[error("Stock cannot be negative for item {item_id}: {requested}")]
    NegativeStock {
        item_id: CatalogItemId,
        requested: i64,
    },

    #[error("Line item not found: {0}")]
    LineItemNotFound(LineItemId),

    /// The line item has left the cart and can no longer be edited.
    #[error("Line item {line_item_id} is bound to order {order_id}")]
    LineItemBound {
        line_item_id: LineItemId,
        order_id: OrderId,
    },

    /// A cart line left the cart while checkout was converting it.
    #[error("Cart of user {0} changed during checkout")]
    CartChanged(UserId),

    #[error("Quantity must be at least 1, got {0}")]
    InvalidQuantity(u32),

    #[error(transparent)]
    UnknownStatus(#[from] ParseStatusError),

    #[error("Vendor notice not found: {0}")]
    NoticeNotFound(NoticeId),

    /// Serialization error while building a notification payload.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An error occurred in the storage layer.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl FulfillmentError {
    /// Returns true for caller-input and business-rule violations, false for
    /// infrastructure failures.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            FulfillmentError::Store(_) | FulfillmentError::Serialization(_)
        )
    }

    pub(crate) fn invalid_state(
        order_id: OrderId,
        status: OrderStatus,
        action: impl Into<String>,
    ) -> Self {
        FulfillmentError::InvalidState {
            order_id,
            status,
            action: action.into(),
        }
    }
}

/// Result type for fulfillment operations.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
