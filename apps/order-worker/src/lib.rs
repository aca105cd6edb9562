//! Order Worker Service
//!
//! A background worker that consumes order traffic from two SQS queues:
//!
//! ```text
//! SQS (orders)        -> OrderEventHandler  (single, retries + DLQ)
//! SQS (order-audit)   -> OrderAuditHandler  (batch)
//! ```
//!
//! ## Features
//!
//! - One listener container per queue with independent concurrency budgets
//! - Automatic retry with backoff; exhausted failures land on the DLQ
//! - Health check and Prometheus endpoints for Kubernetes probes
//! - Graceful SIGINT/SIGTERM shutdown with a drain budget

mod handlers;

use aws_config::BehaviorVersion;
use core_config::aws::AwsConfig;
use core_config::health::HealthServerConfig;
use core_config::{Environment, FromEnv, env_or_default};
use eyre::{Result, WrapErr};
use handlers::{OrderAuditHandler, OrderEventHandler};
use sqs_worker::{AwsSqsClient, ListenerConfig, MessageHandler, WorkerApp, metrics};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Drain budget for in-flight handlers on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Run the order worker
///
/// This is the main entry point for the worker. It:
/// 1. Sets up structured logging (env-aware: JSON for prod, pretty for dev)
/// 2. Builds the SQS client from the ambient AWS configuration
/// 3. Registers the order and audit listeners
/// 4. Runs until SIGINT/SIGTERM, then drains within the grace budget
///
/// # Errors
///
/// Returns an error if configuration is invalid, the health server cannot
/// bind, or no listener container manages to start.
pub async fn run() -> Result<()> {
    // Initialize tracing (env-aware: JSON for prod, pretty for dev)
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    // Initialize Prometheus metrics
    metrics::init_metrics();

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "Starting order worker service"
    );
    info!("Environment: {:?}", environment);

    let health_config =
        HealthServerConfig::from_env().wrap_err("Failed to load health server configuration")?;
    let aws_settings = AwsConfig::from_env().wrap_err("Failed to load AWS configuration")?;

    // Build the SQS client from the default provider chain, honouring the
    // region/endpoint overrides (LocalStack in development).
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = aws_settings.region.clone() {
        loader = loader.region(aws_config::Region::new(region));
    }
    if let Some(endpoint_url) = aws_settings.endpoint_url.clone() {
        loader = loader.endpoint_url(endpoint_url);
    }
    let sdk_config = loader.load().await;
    let client = Arc::new(AwsSqsClient::new(aws_sdk_sqs::Client::new(&sdk_config)));

    let order_queue = env_or_default("ORDER_QUEUE", "orders");
    let order_dlq = env_or_default("ORDER_DLQ", "orders-dlq");
    let audit_queue = env_or_default("AUDIT_QUEUE", "order-audit");
    let order_concurrency: usize = env_or_default("ORDER_CONCURRENCY", "8")
        .parse()
        .wrap_err("ORDER_CONCURRENCY must be a positive integer")?;

    let app = WorkerApp::new(client)
        .map_err(|e| eyre::eyre!("{e}"))?
        .with_app_info(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        .with_health_server(health_config.address())
        .with_shutdown_grace(SHUTDOWN_GRACE);

    // Order events: single-message delivery, retries, DLQ on exhaustion.
    app.register_handler(
        "orders",
        MessageHandler::single(OrderEventHandler),
        ListenerConfig::for_queue(&order_queue)
            .with_max_concurrent_messages(order_concurrency)
            .with_max_retry_attempts(3)
            .with_retry_delay_ms(500)
            .with_dlq(&order_dlq),
    )
    .map_err(|e| eyre::eyre!("{e}"))?;

    // Audit entries: whole batches, no DLQ (redelivery is acceptable).
    app.register_handler(
        "order-audit",
        MessageHandler::batch(OrderAuditHandler),
        ListenerConfig::for_queue(&audit_queue)
            .with_batch_mode(true)
            .with_max_messages_per_poll(10),
    )
    .map_err(|e| eyre::eyre!("{e}"))?;

    info!(
        order_queue = %order_queue,
        audit_queue = %audit_queue,
        order_concurrency,
        health = %health_config.address(),
        "listeners registered"
    );

    app.run().await.map_err(|e| eyre::eyre!("{e}"))?;

    info!("Order worker service stopped");
    Ok(())
}
