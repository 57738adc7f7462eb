//! Process host for the marketplace orchestrator.
//!
//! Wires one store and one notification hub into the fulfillment services,
//! installs tracing and the Prometheus exporter, and keeps the notification
//! dispatcher running until shutdown.

pub mod config;
pub mod error;

use std::future::Future;
use std::sync::Arc;

use fulfillment::{AgentDirectory, CartService, OrderService, StockLedger};
use notifications::{Dispatcher, FanOutHub, NotificationPublisher};
use order_store::{InMemoryStore, PostgresStore, Store};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use config::{Config, LogFormat};
pub use error::{Result, StartupError};

/// The fulfillment services sharing one store and one hub.
pub struct Marketplace<S: Store + Clone> {
    pub orders: Arc<OrderService<S>>,
    pub cart: CartService<S>,
    pub stock: StockLedger<S>,
    pub agents: AgentDirectory<S>,
    pub hub: FanOutHub,
}

impl<S: Store + Clone> Marketplace<S> {
    pub fn new(store: S, hub: FanOutHub) -> Self {
        let publisher: Arc<dyn NotificationPublisher> = Arc::new(hub.clone());
        Self {
            orders: Arc::new(OrderService::new(store.clone(), Arc::clone(&publisher))),
            cart: CartService::new(store.clone()),
            stock: StockLedger::new(store.clone(), publisher),
            agents: AgentDirectory::new(store),
            hub,
        }
    }
}

/// Builds a marketplace over a fresh in-memory store.
pub fn in_memory(config: &Config) -> (Marketplace<InMemoryStore>, Dispatcher) {
    let (hub, dispatcher) = FanOutHub::new(config.notification_capacity);
    (Marketplace::new(InMemoryStore::new(), hub), dispatcher)
}

/// Connects to PostgreSQL, applies migrations and builds a marketplace over it.
pub async fn connect_postgres(
    config: &Config,
    database_url: &str,
) -> Result<(Marketplace<PostgresStore>, Dispatcher)> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url)
        .await?;
    let store = PostgresStore::new(pool);
    store.run_migrations().await?;
    tracing::info!(
        max_connections = config.database_max_connections,
        "connected to PostgreSQL"
    );

    let (hub, dispatcher) = FanOutHub::new(config.notification_capacity);
    Ok((Marketplace::new(store, hub), dispatcher))
}

/// Installs the global tracing subscriber.
///
/// An invalid filter directive falls back to `info`.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
    }
    Ok(())
}

/// Installs the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn install_metrics(config: &Config) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(config.metrics_addr)
        .install()?;
    tracing::info!(addr = %config.metrics_addr, "Prometheus exporter listening");
    Ok(())
}

/// Runs the dispatcher until `shutdown` resolves, then drains it.
///
/// Dropping the marketplace releases every hub handle, so the dispatcher
/// delivers what is still queued and then exits.
pub async fn run_until<S, F>(
    marketplace: Marketplace<S>,
    dispatcher: Dispatcher,
    shutdown: F,
) -> Result<()>
where
    S: Store + Clone,
    F: Future<Output = ()>,
{
    let dispatch = tokio::spawn(dispatcher.run());

    let analytics = marketplace.orders.analytics().await?;
    metrics::gauge!("orders_at_startup").set(analytics.total_orders as f64);
    tracing::info!(
        orders = analytics.total_orders,
        revenue = %analytics.total_revenue,
        "marketplace ready"
    );

    shutdown.await;
    drop(marketplace);
    dispatch.await?;

    tracing::info!("marketplace shut down gracefully");
    Ok(())
}
