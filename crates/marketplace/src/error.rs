use thiserror::Error;

/// Errors that stop the process from starting or shutting down cleanly.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to install tracing subscriber: {0}")]
    Tracing(#[from] tracing_subscriber::util::TryInitError),

    #[error("Failed to install Prometheus exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Fulfillment(#[from] fulfillment::FulfillmentError),

    #[error("Notification dispatcher task failed: {0}")]
    Dispatcher(#[from] tokio::task::JoinError),
}

/// Result type for process startup and shutdown.
pub type Result<T> = std::result::Result<T, StartupError>;
