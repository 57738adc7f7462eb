//! The order fulfillment orchestrator.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{AgentId, Money, NoticeId, OrderId, OrderStatus, UserId, VendorId};
use notifications::{EventType, Notification, NotificationPublisher, Topic};
use order_store::{
    HistoryEntry, OrderQuery, OrderRecord, StockDeduction, Store, StoreTx, VendorNotice,
};
use serde::Serialize;

use crate::checkout::{self, CheckoutRequest, PricedLine};
use crate::transitions::{Transition, next_history_timestamp};
use crate::{FulfillmentError, Order, Result};

/// Per-status slice of [`Analytics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub count: u64,
    pub revenue: Money,
}

/// Order count and revenue over every stored order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Analytics {
    pub total_revenue: Money,
    pub total_orders: u64,
    pub by_status: BTreeMap<OrderStatus, StatusSummary>,
}

impl Analytics {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a OrderRecord>) -> Self {
        let mut analytics = Analytics::default();
        for record in records {
            analytics.total_revenue += record.total;
            analytics.total_orders += 1;
            let summary = analytics.by_status.entry(record.status).or_default();
            summary.count += 1;
            summary.revenue += record.total;
        }
        analytics
    }
}

/// Coordinates checkout, status transitions and delivery assignment.
///
/// Every mutating operation runs in one store transaction. Notifications are
/// collected while the transaction is open and published only after it
/// commits; a rejected or failed operation publishes nothing.
pub struct OrderService<S: Store> {
    store: S,
    publisher: Arc<dyn NotificationPublisher>,
}

impl<S: Store> OrderService<S> {
    pub fn new(store: S, publisher: Arc<dyn NotificationPublisher>) -> Self {
        Self { store, publisher }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Converts the user's cart into one order per vendor partition.
    ///
    /// All-or-nothing: if any line fails, no stock is deducted, no order is
    /// created and the cart is left as it was.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn place_order(&self, request: CheckoutRequest) -> Result<Vec<Order>> {
        metrics::counter!("checkout_total").increment(1);
        let start = Instant::now();

        let result = self.checkout(&request).await;

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        match &result {
            Ok(orders) => {
                metrics::counter!("orders_created_total").increment(orders.len() as u64);
                tracing::info!(orders = orders.len(), "checkout complete");
            }
            Err(e) => {
                metrics::counter!("checkout_failures_total").increment(1);
                tracing::warn!(error = %e, "checkout rejected");
            }
        }
        result
    }

    async fn checkout(&self, request: &CheckoutRequest) -> Result<Vec<Order>> {
        let mut tx = self.store.begin().await?;

        let mut cart = tx.cart_lines_for_update(request.user_id).await?;
        if cart.is_empty() {
            return Err(FulfillmentError::EmptyCart(request.user_id));
        }
        // Stable lock order across concurrent checkouts.
        cart.sort_by_key(|line| line.item_id);

        let mut priced = Vec::with_capacity(cart.len());
        for line in cart {
            let item = tx
                .catalog_item(line.item_id)
                .await?
                .ok_or(FulfillmentError::ItemNotFound(line.item_id))?;

            match tx.deduct_stock(item.id, line.quantity).await? {
                StockDeduction::Deducted { .. } => priced.push(PricedLine { line, item }),
                StockDeduction::Insufficient { available } => {
                    return Err(FulfillmentError::InsufficientStock {
                        item_id: item.id,
                        title: item.title,
                        requested: line.quantity,
                        available,
                    });
                }
                StockDeduction::Missing => return Err(FulfillmentError::ItemNotFound(item.id)),
            }
        }

        let now = Utc::now();
        let mut created = Vec::new();
        for (partition, lines) in checkout::partition(priced) {
            let record = OrderRecord {
                id: OrderId::new(),
                user_id: request.user_id,
                total: checkout::total(&lines),
                address: request.address.clone(),
                phone: request.phone.clone(),
                status: OrderStatus::New,
                payment_method: request.payment_method.clone(),
                created_at: now,
                assigned_agent: None,
            };
            tx.insert_order(&record).await?;
            for priced_line in &lines {
                if !tx.bind_line_item(priced_line.line.id, record.id).await? {
                    return Err(FulfillmentError::CartChanged(request.user_id));
                }
            }
            tx.append_history(&HistoryEntry {
                order_id: record.id,
                status: OrderStatus::New,
                recorded_at: now,
            })
            .await?;

            tracing::debug!(
                order_id = %record.id,
                ?partition,
                total = %record.total,
                "order created"
            );
            created.push(record);
        }

        let mut orders = Vec::with_capacity(created.len());
        let mut outbox = Vec::with_capacity(created.len());
        for record in created {
            let order = Order::enrich(&mut tx, record).await?;
            outbox.push(Notification::new(
                Topic::Admins,
                EventType::NewOrder,
                order.to_payload()?,
            ));
            orders.push(order);
        }

        tx.commit().await?;
        self.publisher.publish_all(outbox);
        Ok(orders)
    }

    /// Platform admin review of a `NEW` order.
    ///
    /// Vendor orders move to `PENDING` and each vendor gets a `NEW_ORDER`, a
    /// message, and a persisted inbox notice. Platform orders move straight to
    /// `READY_FOR_DELIVERY`.
    #[tracing::instrument(skip(self))]
    pub async fn admin_confirm(&self, order_id: OrderId) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let current = lock_order(&mut tx, order_id).await?;
        let vendors = current.vendors();

        let transition = Transition::AdminConfirm {
            has_vendor: !vendors.is_empty(),
        };
        let next = apply(&mut tx, &current, transition).await?;

        let message = format!("Order #{order_id} confirmed by Admin. Please process.");
        let now = Utc::now();
        for vendor in &vendors {
            tx.insert_vendor_notice(&VendorNotice::unread(*vendor, message.clone(), now))
                .await?;
        }

        let order = Order::load(&mut tx, order_id).await?;
        let payload = order.to_payload()?;
        let mut outbox = Vec::new();
        for vendor in &vendors {
            outbox.push(Notification::new(
                Topic::Vendor(*vendor),
                EventType::NewOrder,
                payload.clone(),
            ));
            outbox.push(Notification::message(Topic::Vendor(*vendor), message.clone()));
        }

        tx.commit().await?;
        tracing::info!(%order_id, status = %next, "order confirmed by admin");
        self.publisher.publish_all(outbox);
        Ok(order)
    }

    /// Vendor acceptance: `PENDING` (or `CONFIRMED`) to `READY_FOR_DELIVERY`.
    #[tracing::instrument(skip(self))]
    pub async fn vendor_confirm(&self, order_id: OrderId) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let current = lock_order(&mut tx, order_id).await?;
        let next = apply(&mut tx, &current, Transition::VendorConfirm).await?;

        let order = Order::load(&mut tx, order_id).await?;
        let outbox = vec![Notification::new(
            Topic::User(order.record.user_id),
            EventType::OrderUpdate,
            order.to_payload()?,
        )];

        tx.commit().await?;
        tracing::info!(%order_id, status = %next, "order confirmed by vendor");
        self.publisher.publish_all(outbox);
        Ok(order)
    }

    /// Status reported by the delivery side: `SHIPPED`, `DELIVERED` or
    /// `CANCELLED`. Notifies the user and every vendor on the order.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let current = lock_order(&mut tx, order_id).await?;
        apply(&mut tx, &current, Transition::Report(status)).await?;

        let order = Order::load(&mut tx, order_id).await?;
        let payload = order.to_payload()?;
        let mut outbox = vec![Notification::new(
            Topic::User(order.record.user_id),
            EventType::OrderUpdate,
            payload.clone(),
        )];
        for vendor in order.vendors() {
            outbox.push(Notification::new(
                Topic::Vendor(vendor),
                EventType::OrderUpdate,
                payload.clone(),
            ));
        }

        tx.commit().await?;
        tracing::info!(%order_id, %status, "order status updated");
        self.publisher.publish_all(outbox);
        Ok(order)
    }

    /// Like [`update_status`](Self::update_status), parsing the status from its
    /// wire name.
    pub async fn update_status_named(&self, order_id: OrderId, status: &str) -> Result<Order> {
        let status: OrderStatus = status.parse()?;
        self.update_status(order_id, status).await
    }

    /// A delivery agent takes a `READY_FOR_DELIVERY` order.
    #[tracing::instrument(skip(self))]
    pub async fn take_order(&self, agent_id: AgentId, order_id: OrderId) -> Result<Order> {
        self.claim(order_id, agent_id, Transition::SelfClaim).await
    }

    /// An admin assigns a delivery agent to a `READY_FOR_DELIVERY` or
    /// `CONFIRMED` order.
    ///
    /// Fails with `AlreadyAssigned` rather than reassigning.
    #[tracing::instrument(skip(self))]
    pub async fn assign_delivery_agent(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
    ) -> Result<Order> {
        self.claim(order_id, agent_id, Transition::AdminAssign).await
    }

    async fn claim(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
        transition: Transition,
    ) -> Result<Order> {
        let mut tx = self.store.begin().await?;

        let record = tx
            .order_for_update(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;
        let agent = tx
            .delivery_agent(agent_id)
            .await?
            .ok_or(FulfillmentError::AgentNotFound(agent_id))?;

        if record.assigned_agent.is_some() {
            tracing::warn!(%order_id, %agent_id, "order already assigned");
            return Err(FulfillmentError::AlreadyAssigned(order_id));
        }
        let next = transition.target(record.status).ok_or_else(|| {
            FulfillmentError::invalid_state(order_id, record.status, transition.describe())
        })?;

        let claimed = tx
            .claim_order(order_id, agent.id, &transition.allowed_from(), next)
            .await?;
        if !claimed {
            tracing::warn!(%order_id, %agent_id, "lost claim race");
            return Err(FulfillmentError::AlreadyAssigned(order_id));
        }
        append_history(&mut tx, order_id, next).await?;

        let order = Order::load(&mut tx, order_id).await?;
        let payload = order.to_payload()?;
        let mut outbox = vec![
            Notification::new(
                Topic::DeliveryAgent(agent.id),
                EventType::NewAssignment,
                payload.clone(),
            ),
            Notification::new(
                Topic::User(order.record.user_id),
                EventType::OrderUpdate,
                payload.clone(),
            ),
        ];
        for vendor in order.vendors() {
            outbox.push(Notification::new(
                Topic::Vendor(vendor),
                EventType::OrderUpdate,
                payload.clone(),
            ));
            outbox.push(Notification::message(
                Topic::Vendor(vendor),
                format!("Order #{order_id} has been picked up by {}", agent.name),
            ));
        }

        tx.commit().await?;
        tracing::info!(%order_id, agent_id = %agent.id, "delivery agent assigned");
        self.publisher.publish_all(outbox);
        Ok(order)
    }

    /// Deletes an order with its line items and history.
    ///
    /// Stock deducted at checkout is not restored.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order(&self, order_id: OrderId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_order(order_id).await? {
            return Err(FulfillmentError::OrderNotFound(order_id));
        }
        tx.commit().await?;
        tracing::info!(%order_id, "order deleted");
        Ok(())
    }

    // -- Reads --

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        Order::load(&mut tx, order_id).await
    }

    pub async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        self.find(OrderQuery::for_user(user_id)).await
    }

    pub async fn find_by_vendor(&self, vendor_id: VendorId) -> Result<Vec<Order>> {
        self.find(OrderQuery::for_vendor(vendor_id)).await
    }

    /// `READY_FOR_DELIVERY` orders with no agent.
    pub async fn find_available_for_delivery(&self) -> Result<Vec<Order>> {
        self.find(OrderQuery::available_for_delivery()).await
    }

    pub async fn find_by_agent(&self, agent_id: AgentId) -> Result<Vec<Order>> {
        self.find(OrderQuery::for_agent(agent_id)).await
    }

    pub async fn find_all(&self) -> Result<Vec<Order>> {
        self.find(OrderQuery::all()).await
    }

    /// Runs an arbitrary query, newest first.
    pub async fn find(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let mut tx = self.store.begin().await?;
        let records = tx.find_orders(&query).await?;
        let mut orders = Vec::with_capacity(records.len());
        for record in records {
            orders.push(Order::enrich(&mut tx, record).await?);
        }
        Ok(orders)
    }

    /// The order's status timeline, oldest first.
    pub async fn history(&self, order_id: OrderId) -> Result<Vec<HistoryEntry>> {
        let mut tx = self.store.begin().await?;
        if tx.order(order_id).await?.is_none() {
            return Err(FulfillmentError::OrderNotFound(order_id));
        }
        Ok(tx.history(order_id).await?)
    }

    pub async fn analytics(&self) -> Result<Analytics> {
        let mut tx = self.store.begin().await?;
        let records = tx.find_orders(&OrderQuery::all()).await?;
        Ok(Analytics::from_records(&records))
    }

    // -- Vendor inbox --

    /// A vendor's inbox, newest first.
    pub async fn vendor_notices(&self, vendor_id: VendorId) -> Result<Vec<VendorNotice>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.vendor_notices(vendor_id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_notice_read(&self, notice_id: NoticeId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        if !tx.mark_notice_read(notice_id).await? {
            return Err(FulfillmentError::NoticeNotFound(notice_id));
        }
        tx.commit().await?;
        Ok(())
    }

    /// Returns the number of notices that were unread.
    #[tracing::instrument(skip(self))]
    pub async fn mark_all_notices_read(&self, vendor_id: VendorId) -> Result<u64> {
        let mut tx = self.store.begin().await?;
        let changed = tx.mark_vendor_notices_read(vendor_id).await?;
        tx.commit().await?;
        Ok(changed)
    }
}

/// Loads an order with its row locked for the rest of the transaction.
async fn lock_order<T: StoreTx>(tx: &mut T, order_id: OrderId) -> Result<Order> {
    let record = tx
        .order_for_update(order_id)
        .await?
        .ok_or(FulfillmentError::OrderNotFound(order_id))?;
    Order::enrich(tx, record).await
}

/// Validates `transition` against the order's status, then writes the new
/// status and its history entry.
async fn apply<T: StoreTx>(
    tx: &mut T,
    order: &Order,
    transition: Transition,
) -> Result<OrderStatus> {
    let Some(next) = transition.target(order.status()) else {
        tracing::warn!(
            order_id = %order.id(),
            status = %order.status(),
            transition = %transition.describe(),
            "transition rejected"
        );
        return Err(FulfillmentError::invalid_state(
            order.id(),
            order.status(),
            transition.describe(),
        ));
    };
    tx.set_order_status(order.id(), next).await?;
    append_history(tx, order.id(), next).await?;
    Ok(next)
}

async fn append_history<T: StoreTx>(
    tx: &mut T,
    order_id: OrderId,
    status: OrderStatus,
) -> Result<()> {
    let previous = tx.history(order_id).await?;
    let entry = HistoryEntry {
        order_id,
        status,
        recorded_at: next_history_timestamp(previous.last(), Utc::now()),
    };
    tx.append_history(&entry).await?;
    metrics::counter!("order_transitions_total", "status" => status.as_str()).increment(1);
    Ok(())
}
