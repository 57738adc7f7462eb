//! Cart-to-order conversion: request, vendor partitioning and totals.

use std::collections::BTreeMap;

use common::{Money, UserId, VendorId};
use order_store::{CatalogItem, LineItem};

/// Payment method recorded when the caller does not supply one.
pub const DEFAULT_PAYMENT_METHOD: &str = "CARD";

/// Input to `OrderService::place_order`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub address: String,
    pub phone: String,
    pub payment_method: String,
}

impl CheckoutRequest {
    pub fn new(user_id: UserId, address: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            user_id,
            address: address.into(),
            phone: phone.into(),
            payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
        }
    }

    /// Sets the payment method label. Blank labels keep the default.
    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        let method = method.into();
        if !method.trim().is_empty() {
            self.payment_method = method;
        }
        self
    }
}

/// The owner of a group of checked-out lines. Each partition becomes one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Partition {
    Vendor(VendorId),
    /// Items with no vendor, sold by the platform itself.
    Platform,
}

impl Partition {
    pub fn of(item: &CatalogItem) -> Self {
        match item.vendor_id {
            Some(vendor) => Partition::Vendor(vendor),
            None => Partition::Platform,
        }
    }

    pub fn vendor(&self) -> Option<VendorId> {
        match self {
            Partition::Vendor(vendor) => Some(*vendor),
            Partition::Platform => None,
        }
    }
}

/// A cart line whose stock has been deducted, with the catalog item priced at
/// checkout time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub line: LineItem,
    pub item: CatalogItem,
}

impl PricedLine {
    pub fn subtotal(&self) -> Money {
        self.item.price.multiply(self.line.quantity)
    }
}

/// Groups lines by owner. Line order within a partition is preserved.
pub fn partition(lines: Vec<PricedLine>) -> BTreeMap<Partition, Vec<PricedLine>> {
    let mut groups: BTreeMap<Partition, Vec<PricedLine>> = BTreeMap::new();
    for line in lines {
        groups
            .entry(Partition::of(&line.item))
            .or_default()
            .push(line);
    }
    groups
}

pub fn total(lines: &[PricedLine]) -> Money {
    lines.iter().map(PricedLine::subtotal).sum()
}
