//! Shared types for the marketplace workspace.

pub mod money;
pub mod status;
pub mod types;

pub use money::Money;
pub use status::{OrderStatus, ParseStatusError};
pub use types::{AgentId, CatalogItemId, LineItemId, NoticeId, OrderId, UserId, VendorId};
