//! Boot wiring for worker binaries.
//!
//! `WorkerApp` assembles the shared collaborators (SQS client, metrics
//! collector, executor provider), turns each registered handler binding into
//! a listener container, and runs the whole set until SIGINT/SIGTERM:
//!
//! ```rust,ignore
//! let app = WorkerApp::new(client)
//!     .with_health_server("0.0.0.0:8080")
//!     .with_shutdown_grace(Duration::from_secs(20));
//!
//! app.register_handler(
//!     "orders",
//!     MessageHandler::single(OrderHandler::new(service)),
//!     ListenerConfig::for_queue("orders").with_dlq("orders-dlq"),
//! )?;
//!
//! app.run().await?;
//! ```

use crate::client::SqsClient;
use crate::config::ListenerConfig;
use crate::container::ListenerContainer;
use crate::error::WorkerError;
use crate::executor::{ExecutorProvider, LightweightTaskProvider};
use crate::handler::MessageHandler;
use crate::health::{HealthState, health_router};
use crate::metrics::MetricsCollector;
use crate::registry::ContainerRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use uuid::Uuid;

const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Builds and runs a set of listener containers.
pub struct WorkerApp {
    client: Arc<dyn SqsClient>,
    provider: Arc<dyn ExecutorProvider>,
    metrics: Arc<MetricsCollector>,
    registry: Arc<ContainerRegistry>,
    startup_timeout: Duration,
    shutdown_grace: Duration,
    health_bind: Option<String>,
    app_name: String,
    app_version: String,
}

impl WorkerApp {
    /// Create an app with the default (lightweight-task) executor provider.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(client: Arc<dyn SqsClient>) -> Result<Self, WorkerError> {
        let provider = Arc::new(LightweightTaskProvider::new()?);
        Ok(Self::with_provider(client, provider))
    }

    /// Create an app with an explicit executor provider.
    pub fn with_provider(client: Arc<dyn SqsClient>, provider: Arc<dyn ExecutorProvider>) -> Self {
        Self {
            client,
            provider,
            metrics: Arc::new(MetricsCollector::new()),
            registry: Arc::new(ContainerRegistry::new()),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            health_bind: None,
            app_name: "sqs-worker".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Replace the metrics collector (e.g. to share one across apps).
    pub fn with_metrics_collector(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Overall budget for starting all containers.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Overall budget for draining all containers on shutdown.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Serve health/stats/metrics endpoints on this address.
    pub fn with_health_server(mut self, bind_address: impl Into<String>) -> Self {
        self.health_bind = Some(bind_address.into());
        self
    }

    /// Name and version reported by the health endpoint.
    pub fn with_app_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.app_name = name.into();
        self.app_version = version.into();
        self
    }

    /// Bind a handler to a queue: creates one container per binding.
    ///
    /// An empty id gets a generated one.
    pub fn register_handler(
        &self,
        id: impl Into<String>,
        handler: MessageHandler,
        config: ListenerConfig,
    ) -> Result<(), WorkerError> {
        let mut id = id.into();
        if id.is_empty() {
            id = format!("listener-{}", Uuid::new_v4());
        }

        let container = Arc::new(ListenerContainer::new(
            id,
            handler,
            config,
            Arc::clone(&self.client),
            Arc::clone(&self.metrics),
            Arc::clone(&self.provider),
        ));
        self.registry.register(container)
    }

    pub fn registry(&self) -> &Arc<ContainerRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Start all containers, serve health endpoints, wait for SIGINT/SIGTERM,
    /// then stop everything within the shutdown grace.
    pub async fn run(&self) -> Result<(), WorkerError> {
        let summary = self.registry.start_all(self.startup_timeout).await;
        if summary.succeeded == 0 && summary.attempted > 0 {
            self.provider.shutdown(Duration::ZERO);
            return Err(WorkerError::Container(format!(
                "no container started ({} attempted)",
                summary.attempted
            )));
        }

        if let Some(bind_address) = &self.health_bind {
            let state = HealthState::new(
                Arc::clone(&self.registry),
                Arc::clone(&self.metrics),
                self.app_name.clone(),
                self.app_version.clone(),
            );
            let bind_address = bind_address.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_health(state, &bind_address).await {
                    error!(error = %e, "health server failed");
                }
            });
        }

        shutdown_signal().await;

        info!(
            grace_ms = self.shutdown_grace.as_millis() as u64,
            "shutting down containers"
        );
        self.registry.stop_all(self.shutdown_grace).await;
        self.provider.shutdown(self.shutdown_grace);

        info!("worker app stopped");
        Ok(())
    }
}

async fn serve_health(state: HealthState, bind_address: &str) -> Result<(), WorkerError> {
    let router = health_router(state);
    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(|e| WorkerError::Container(format!("health server bind {bind_address}: {e}")))?;

    info!(address = %bind_address, "health server listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| WorkerError::Container(format!("health server: {e}")))
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }
}
