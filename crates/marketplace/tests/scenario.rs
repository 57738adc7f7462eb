//! End-to-end marketplace scenarios: the fulfillment services wired to a live
//! notification hub, observed through topic subscriptions.

use common::{Money, OrderStatus, UserId, VendorId};
use fulfillment::CheckoutRequest;
use marketplace::{Config, Marketplace};
use notifications::{EventType, Notification, Topic};
use order_store::{CatalogItem, DeliveryAgent, InMemoryStore};
use tokio::sync::broadcast::{self, error::TryRecvError};

fn received(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(notification) => out.push(notification),
            Err(TryRecvError::Empty | TryRecvError::Closed) => return out,
            Err(TryRecvError::Lagged(n)) => panic!("receiver lagged by {n}"),
        }
    }
}

fn event_types(notifications: &[Notification]) -> Vec<EventType> {
    notifications.iter().map(|n| n.event_type).collect()
}

#[tokio::test]
async fn full_order_lifecycle_reaches_every_audience() {
    let (app, mut dispatcher) = marketplace::in_memory(&Config::default());

    let vendor = VendorId::new();
    let user = UserId::new();
    let agent = DeliveryAgent::new("Dana");

    let mut admin_rx = app.hub.subscribe(Topic::Admins);
    let mut vendor_rx = app.hub.subscribe(Topic::Vendor(vendor));
    let mut user_rx = app.hub.subscribe(Topic::User(user));
    let mut agent_rx = app.hub.subscribe(Topic::DeliveryAgent(agent.id));

    let novel = CatalogItem::new("Novel", "A. Writer", Money::from_dollars(12), 4).sold_by(vendor);
    let atlas = CatalogItem::new("Atlas", "B. Mapper", Money::from_dollars(30), 2);
    app.stock.register_item(&novel).await.unwrap();
    app.stock.register_item(&atlas).await.unwrap();
    app.agents.register(&agent).await.unwrap();

    app.cart.add_item(user, novel.id, 2).await.unwrap();
    app.cart.add_item(user, atlas.id, 1).await.unwrap();

    // Checkout splits into one vendor order and one platform order.
    let orders = app
        .orders
        .place_order(CheckoutRequest::new(user, "12 Harbour Rd", "555-0199"))
        .await
        .unwrap();
    assert_eq!(orders.len(), 2);
    dispatcher.drain();
    assert_eq!(
        event_types(&received(&mut admin_rx)),
        vec![EventType::NewOrder, EventType::NewOrder]
    );

    let vendor_order = orders.iter().find(|o| o.is_vendor_order()).unwrap();
    assert_eq!(vendor_order.total(), Money::from_dollars(24));
    let order_id = vendor_order.id();

    // Admin review hands the order to its vendor.
    let confirmed = app.orders.admin_confirm(order_id).await.unwrap();
    assert_eq!(confirmed.status(), OrderStatus::Pending);
    dispatcher.drain();
    let to_vendor = received(&mut vendor_rx);
    assert_eq!(
        event_types(&to_vendor),
        vec![EventType::NewOrder, EventType::Notification]
    );
    assert_eq!(
        to_vendor[1].text(),
        Some(format!("Order #{order_id} confirmed by Admin. Please process.").as_str())
    );
    let notices = app.orders.vendor_notices(vendor).await.unwrap();
    assert_eq!(notices.len(), 1);
    assert!(!notices[0].read);

    // Vendor accepts; the customer hears about it.
    let ready = app.orders.vendor_confirm(order_id).await.unwrap();
    assert_eq!(ready.status(), OrderStatus::ReadyForDelivery);
    dispatcher.drain();
    assert_eq!(
        event_types(&received(&mut user_rx)),
        vec![EventType::OrderUpdate]
    );

    // The agent takes the order.
    let shipped = app.orders.take_order(agent.id, order_id).await.unwrap();
    assert_eq!(shipped.status(), OrderStatus::Shipped);
    assert_eq!(shipped.record.assigned_agent, Some(agent.id));
    dispatcher.drain();
    assert_eq!(
        event_types(&received(&mut agent_rx)),
        vec![EventType::NewAssignment]
    );
    let to_vendor = received(&mut vendor_rx);
    assert_eq!(
        event_types(&to_vendor),
        vec![EventType::OrderUpdate, EventType::Notification]
    );
    assert_eq!(
        to_vendor[1].text(),
        Some(format!("Order #{order_id} has been picked up by Dana").as_str())
    );
    assert_eq!(
        event_types(&received(&mut user_rx)),
        vec![EventType::OrderUpdate]
    );

    // Delivery closes the lifecycle.
    let delivered = app
        .orders
        .update_status_named(order_id, "delivered")
        .await
        .unwrap();
    assert_eq!(delivered.status(), OrderStatus::Delivered);

    let statuses: Vec<OrderStatus> = app
        .orders
        .history(order_id)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            OrderStatus::New,
            OrderStatus::Pending,
            OrderStatus::ReadyForDelivery,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ]
    );

    let analytics = app.orders.analytics().await.unwrap();
    assert_eq!(analytics.total_orders, 2);
    assert_eq!(analytics.total_revenue, Money::from_dollars(54));
}

#[tokio::test]
async fn restock_notifies_owning_vendor_only() {
    let (app, mut dispatcher) = marketplace::in_memory(&Config::default());
    let vendor = VendorId::new();
    let other = VendorId::new();
    let mut vendor_rx = app.hub.subscribe(Topic::Vendor(vendor));
    let mut other_rx = app.hub.subscribe(Topic::Vendor(other));

    let item = CatalogItem::new("Poems", "C. Verse", Money::from_dollars(8), 1).sold_by(vendor);
    app.stock.register_item(&item).await.unwrap();

    let updated = app.stock.set_stock(item.id, 40).await.unwrap();
    assert_eq!(updated.stock, 40);
    dispatcher.drain();

    let to_vendor = received(&mut vendor_rx);
    assert_eq!(event_types(&to_vendor), vec![EventType::InventoryUpdate]);
    assert_eq!(to_vendor[0].payload["stock"], 40);
    assert!(received(&mut other_rx).is_empty());
}

#[tokio::test]
async fn shutdown_delivers_queued_notifications() {
    let config = Config {
        notification_capacity: 8,
        ..Config::default()
    };
    let (hub, dispatcher) = notifications::FanOutHub::new(config.notification_capacity);
    let app = Marketplace::new(InMemoryStore::new(), hub);
    let mut admin_rx = app.hub.subscribe(Topic::Admins);

    let user = UserId::new();
    let item = CatalogItem::new("Guide", "D. Tour", Money::from_dollars(5), 3);
    app.stock.register_item(&item).await.unwrap();
    app.cart.add_item(user, item.id, 1).await.unwrap();
    app.orders
        .place_order(CheckoutRequest::new(user, "3 Pier St", "555-0101"))
        .await
        .unwrap();

    // Nothing has been dispatched yet; shutting down must flush the queue.
    marketplace::run_until(app, dispatcher, async {})
        .await
        .unwrap();

    let notification = admin_rx.recv().await.unwrap();
    assert_eq!(notification.event_type, EventType::NewOrder);
    assert!(matches!(
        admin_rx.recv().await,
        Err(broadcast::error::RecvError::Closed)
    ));
}
