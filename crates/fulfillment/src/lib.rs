//! Order fulfillment orchestrator.
//!
//! Converts carts into vendor-scoped orders, drives each order through the
//! status state machine, assigns delivery agents, and emits notifications
//! once each change has committed.

pub mod agents;
pub mod cart;
pub mod checkout;
pub mod error;
pub mod inventory;
pub mod order;
pub mod service;
pub mod transitions;

pub use agents::AgentDirectory;
pub use cart::{CartEntry, CartService};
pub use checkout::{CheckoutRequest, DEFAULT_PAYMENT_METHOD, Partition, PricedLine};
pub use error::{FulfillmentError, Result};
pub use inventory::StockLedger;
pub use order::{Order, OrderItem};
pub use service::{Analytics, OrderService, StatusSummary};
pub use transitions::Transition;
