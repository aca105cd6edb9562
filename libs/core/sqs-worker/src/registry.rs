//! Registry of listener containers.
//!
//! Holds the container-id -> container mapping and drives coordinated
//! start/stop sweeps. Registration is serialised; sweeps iterate over a
//! snapshot taken under the lock and then released, so containers can be
//! registered or unregistered while a sweep is in flight without the sweep
//! ever observing a mutating map.

use crate::container::ListenerContainer;
use crate::error::WorkerError;
use crate::state::ContainerState;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

/// Outcome of a start_all / stop_all sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

/// Lifecycle manager for a set of containers.
pub struct ContainerRegistry {
    containers: RwLock<HashMap<String, Arc<ListenerContainer>>>,
    /// Serialises start_all/stop_all so two sweeps never interleave.
    sweep_lock: AsyncMutex<()>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            sweep_lock: AsyncMutex::new(()),
        }
    }

    /// Register a container under its id. Ids are unique.
    pub fn register(&self, container: Arc<ListenerContainer>) -> Result<(), WorkerError> {
        let mut containers = self.containers.write().unwrap();
        let id = container.id().to_string();
        if containers.contains_key(&id) {
            return Err(WorkerError::Container(format!(
                "container '{id}' is already registered"
            )));
        }
        info!(container_id = %id, "container registered");
        containers.insert(id, container);
        Ok(())
    }

    /// Remove a container from the registry. The container is not stopped.
    pub fn unregister(&self, container_id: &str) -> Option<Arc<ListenerContainer>> {
        let removed = self.containers.write().unwrap().remove(container_id);
        if removed.is_some() {
            info!(container_id = %container_id, "container unregistered");
        }
        removed
    }

    pub fn get(&self, container_id: &str) -> Option<Arc<ListenerContainer>> {
        self.containers.read().unwrap().get(container_id).cloned()
    }

    pub fn container_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.containers.read().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.containers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.read().unwrap().is_empty()
    }

    /// Containers currently in RUNNING.
    pub fn running_count(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|container| container.state() == ContainerState::Running)
            .count()
    }

    /// Copy of the current container set, taken under the lock and iterated
    /// outside it. Sorted by id for deterministic sweep order.
    fn snapshot(&self) -> Vec<Arc<ListenerContainer>> {
        let mut containers: Vec<Arc<ListenerContainer>> =
            self.containers.read().unwrap().values().cloned().collect();
        containers.sort_by(|a, b| a.id().cmp(b.id()));
        containers
    }

    /// Start every registered container sequentially.
    ///
    /// Individual failures are recorded and do not abort the sweep. The
    /// overall timeout is a budget for the whole sweep; containers that the
    /// budget does not reach are counted as failed.
    pub async fn start_all(&self, overall_timeout: Duration) -> SweepSummary {
        let _sweep = self.sweep_lock.lock().await;
        let containers = self.snapshot();
        let started_at = Instant::now();
        let deadline = started_at + overall_timeout;

        let mut succeeded = 0;
        let mut failed = 0;

        for container in &containers {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                error!(
                    container_id = %container.id(),
                    "start_all budget exhausted before this container"
                );
                failed += 1;
                continue;
            }

            match tokio::time::timeout(remaining, container.start()).await {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(e)) => {
                    error!(container_id = %container.id(), error = %e, "container failed to start");
                    failed += 1;
                }
                Err(_) => {
                    error!(container_id = %container.id(), "container start timed out");
                    // Roll the half-started container back down.
                    let _ = container.stop(Duration::ZERO).await;
                    failed += 1;
                }
            }
        }

        let summary = SweepSummary {
            attempted: containers.len(),
            succeeded,
            failed,
            elapsed_ms: started_at.elapsed().as_millis() as u64,
        };
        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            elapsed_ms = summary.elapsed_ms,
            "start_all complete"
        );
        summary
    }

    /// Stop every registered container sequentially.
    ///
    /// Each container gets the remaining share of the overall budget as its
    /// grace; once the budget is gone the remaining containers are stopped
    /// with zero grace (force-stop).
    pub async fn stop_all(&self, overall_timeout: Duration) -> SweepSummary {
        let _sweep = self.sweep_lock.lock().await;
        let containers = self.snapshot();
        let started_at = Instant::now();
        let deadline = started_at + overall_timeout;

        let mut succeeded = 0;
        let mut failed = 0;

        for container in &containers {
            let grace = deadline.saturating_duration_since(Instant::now());
            if grace.is_zero() {
                warn!(
                    container_id = %container.id(),
                    "stop_all budget exhausted, force-stopping"
                );
            }

            match container.stop(grace).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    error!(container_id = %container.id(), error = %e, "container failed to stop");
                    failed += 1;
                }
            }
        }

        let summary = SweepSummary {
            attempted: containers.len(),
            succeeded,
            failed,
            elapsed_ms: started_at.elapsed().as_millis() as u64,
        };
        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            elapsed_ms = summary.elapsed_ms,
            "stop_all complete"
        );
        summary
    }
}

impl Default for ContainerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
