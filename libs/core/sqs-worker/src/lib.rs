//! SQS Worker - Declarative SQS Consumption Framework
//!
//! A reusable library for building SQS consumers with:
//! - One listener container per handler binding, each with its own state
//!   machine, executors, and concurrency budget
//! - Long polling with transient-error backoff
//! - Semaphore backpressure (`max_concurrent_messages` in-flight workers)
//! - Automatic retry with exponential backoff and jitter
//! - Dead letter queue routing with a structured, injection-safe envelope
//! - Per-container metrics with Prometheus export
//! - Registry-coordinated start/stop sweeps and graceful shutdown
//! - Health check endpoints for Kubernetes probes
//!
//! # Architecture
//!
//! ```text
//! SQS queue (orders)
//!   ↓ (MessagePoller, long poll)
//! ListenerContainer
//!   ↓ (semaphore-bounded workers)
//! SingleMessageHandler / BatchMessageHandler
//!   ↓ (on exhausted retries)
//! DLQ queue (orders-dlq)
//! ```
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use sqs_worker::{
//!     ListenerConfig, Message, MessageHandler, SingleMessageHandler, WorkerApp, WorkerError,
//! };
//!
//! // 1. Implement a handler
//! struct OrderHandler;
//!
//! #[async_trait]
//! impl SingleMessageHandler for OrderHandler {
//!     async fn handle(&self, message: &Message) -> Result<(), WorkerError> {
//!         let event: OrderEvent = serde_json::from_str(&message.body)?;
//!         // process the order
//!         Ok(())
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "order_handler"
//!     }
//! }
//!
//! // 2. Wire it to a queue and run
//! let app = WorkerApp::new(client)?;
//! app.register_handler(
//!     "orders",
//!     MessageHandler::single(OrderHandler),
//!     ListenerConfig::for_queue("orders")
//!         .with_max_concurrent_messages(8)
//!         .with_dlq("orders-dlq"),
//! )?;
//! app.run().await?;
//! ```

mod app;
mod client;
mod config;
mod container;
pub mod dlq;
mod error;
mod executor;
mod handler;
mod health;
mod message;
pub mod metrics;
mod poller;
mod processor;
mod registry;
mod retry;
mod state;

// Re-export all public types
pub use app::{WorkerApp, shutdown_signal};
pub use client::{AwsSqsClient, SqsClient};
pub use config::{
    ListenerConfig, MAX_MESSAGES_PER_POLL_LIMIT, MAX_POLL_TIMEOUT_SECONDS,
};
pub use container::ListenerContainer;
pub use dlq::{DlqEnvelope, DlqHandler};
pub use error::WorkerError;
pub use executor::{
    CustomExecutorProvider, ExecutorConfig, ExecutorProvider, LightweightTaskProvider,
    PlatformPoolProvider, TaskExecutor, build_executor_provider,
};
pub use handler::{BatchMessageHandler, MessageHandler, SingleMessageHandler};
pub use health::{
    HealthState, containers_handler, health_handler, health_router, metrics_handler,
    ready_handler,
};
pub use message::Message;
pub use metrics::{ContainerStatsSnapshot, MetricsCollector};
pub use poller::MessagePoller;
pub use processor::{MessageProcessor, WorkUnit};
pub use registry::{ContainerRegistry, SweepSummary};
pub use retry::RetryPolicy;
pub use state::ContainerState;

/// Result type alias for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;
