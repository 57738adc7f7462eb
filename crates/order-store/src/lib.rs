pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTx};
pub use postgres::{PostgresStore, PostgresTx};
pub use query::OrderQuery;
pub use records::{
    Binding, CatalogItem, DeliveryAgent, HistoryEntry, LineItem, OrderRecord, VendorNotice,
};
pub use store::{StockDeduction, Store, StoreTx};
