//! Per-container metrics.
//!
//! The collector keeps lock-free in-memory counters per container and exposes
//! immutable snapshots; every update is also mirrored to the `metrics` facade
//! so a Prometheus scrape sees the same numbers.
//!
//! ## Exported metrics
//!
//! - `sqs_worker_messages_processed_total` - handler invocations that succeeded
//! - `sqs_worker_messages_failed_total` - terminal handler failures by error type
//! - `sqs_worker_processing_duration_seconds` - handler timing histogram
//! - `sqs_worker_retries_total` - retry attempts
//! - `sqs_worker_dlq_operations_total` - DLQ publishes by outcome
//! - `sqs_worker_state_changes_total` - container state transitions
//! - `sqs_worker_in_flight_messages` - currently executing workers

use crate::state::ContainerState;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Metric names as constants for consistency
pub mod names {
    pub const MESSAGES_PROCESSED: &str = "sqs_worker_messages_processed_total";
    pub const MESSAGES_FAILED: &str = "sqs_worker_messages_failed_total";
    pub const PROCESSING_DURATION: &str = "sqs_worker_processing_duration_seconds";
    pub const RETRIES: &str = "sqs_worker_retries_total";
    pub const DLQ_OPERATIONS: &str = "sqs_worker_dlq_operations_total";
    pub const STATE_CHANGES: &str = "sqs_worker_state_changes_total";
    pub const IN_FLIGHT: &str = "sqs_worker_in_flight_messages";
}

/// Initialize the Prometheus metrics exporter.
///
/// Call once at application startup; repeated calls return the same handle.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("Failed to install Prometheus recorder")
        })
        .clone()
}

/// Get the global Prometheus handle.
///
/// Returns None if metrics haven't been initialized.
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

/// Sentinel for "no sample yet" in the min aggregate.
const NO_SAMPLE: u64 = u64::MAX;

struct ProcessingTimes {
    min_ms: AtomicU64,
    max_ms: AtomicU64,
    total_ms: AtomicU64,
    samples: AtomicU64,
}

impl ProcessingTimes {
    fn new() -> Self {
        Self {
            min_ms: AtomicU64::new(NO_SAMPLE),
            max_ms: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    fn record(&self, elapsed_ms: u64) {
        self.min_ms.fetch_min(elapsed_ms, Ordering::SeqCst);
        self.max_ms.fetch_max(elapsed_ms, Ordering::SeqCst);
        self.total_ms.fetch_add(elapsed_ms, Ordering::SeqCst);
        self.samples.fetch_add(1, Ordering::SeqCst);
    }

    fn reset(&self) {
        self.min_ms.store(NO_SAMPLE, Ordering::SeqCst);
        self.max_ms.store(0, Ordering::SeqCst);
        self.total_ms.store(0, Ordering::SeqCst);
        self.samples.store(0, Ordering::SeqCst);
    }
}

struct ContainerCounters {
    processed: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    dlq_success: AtomicU64,
    dlq_failure: AtomicU64,
    state_changes: AtomicU64,
    times: ProcessingTimes,
    /// Epoch millis; 0 = never.
    last_success_ms: AtomicI64,
    last_failure_ms: AtomicI64,
    state: RwLock<ContainerState>,
}

impl ContainerCounters {
    fn new(state: ContainerState) -> Self {
        Self {
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            dlq_success: AtomicU64::new(0),
            dlq_failure: AtomicU64::new(0),
            state_changes: AtomicU64::new(0),
            times: ProcessingTimes::new(),
            last_success_ms: AtomicI64::new(0),
            last_failure_ms: AtomicI64::new(0),
            state: RwLock::new(state),
        }
    }

    fn reset(&self) {
        self.processed.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
        self.retries.store(0, Ordering::SeqCst);
        self.dlq_success.store(0, Ordering::SeqCst);
        self.dlq_failure.store(0, Ordering::SeqCst);
        self.state_changes.store(0, Ordering::SeqCst);
        self.times.reset();
        self.last_success_ms.store(0, Ordering::SeqCst);
        self.last_failure_ms.store(0, Ordering::SeqCst);
        // State is owned by the container lifecycle, not the counters.
    }
}

/// Immutable view of one container's counters.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerStatsSnapshot {
    pub container_id: String,
    pub state: ContainerState,
    pub processed: u64,
    pub failed: u64,
    pub retries: u64,
    pub dlq_success: u64,
    pub dlq_failure: u64,
    pub state_changes: u64,
    pub min_processing_ms: Option<u64>,
    pub max_processing_ms: Option<u64>,
    pub avg_processing_ms: Option<f64>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Collects counters for every container in the process.
///
/// Counters are monotonic between resets and updated atomically; averages are
/// derived from sum + count at read time.
pub struct MetricsCollector {
    containers: RwLock<HashMap<String, Arc<ContainerCounters>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
        }
    }

    /// Ensure an entry exists for `container_id` so its stats are readable
    /// before the first recorded event.
    pub fn register_container(&self, container_id: &str, state: ContainerState) {
        let mut containers = self.containers.write().unwrap();
        containers
            .entry(container_id.to_string())
            .or_insert_with(|| Arc::new(ContainerCounters::new(state)));
    }

    fn entry(&self, container_id: &str) -> Arc<ContainerCounters> {
        if let Some(entry) = self.containers.read().unwrap().get(container_id) {
            return Arc::clone(entry);
        }
        let mut containers = self.containers.write().unwrap();
        Arc::clone(
            containers
                .entry(container_id.to_string())
                .or_insert_with(|| Arc::new(ContainerCounters::new(ContainerState::Created))),
        )
    }

    pub fn record_processed(&self, container_id: &str) {
        let entry = self.entry(container_id);
        entry.processed.fetch_add(1, Ordering::SeqCst);
        entry
            .last_success_ms
            .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
        counter!(names::MESSAGES_PROCESSED, "container" => container_id.to_string()).increment(1);
    }

    pub fn record_failed(&self, container_id: &str, error_type: &str) {
        let entry = self.entry(container_id);
        entry.failed.fetch_add(1, Ordering::SeqCst);
        entry
            .last_failure_ms
            .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
        counter!(
            names::MESSAGES_FAILED,
            "container" => container_id.to_string(),
            "error_type" => error_type.to_string()
        )
        .increment(1);
    }

    pub fn record_processing_time(&self, container_id: &str, elapsed_ms: u64) {
        self.entry(container_id).times.record(elapsed_ms);
        histogram!(names::PROCESSING_DURATION, "container" => container_id.to_string())
            .record(elapsed_ms as f64 / 1000.0);
    }

    pub fn record_retry_attempts(&self, container_id: &str, attempts: u32) {
        self.entry(container_id)
            .retries
            .fetch_add(u64::from(attempts), Ordering::SeqCst);
        counter!(names::RETRIES, "container" => container_id.to_string())
            .increment(u64::from(attempts));
    }

    pub fn record_dlq_operation(&self, container_id: &str, success: bool) {
        let entry = self.entry(container_id);
        if success {
            entry.dlq_success.fetch_add(1, Ordering::SeqCst);
        } else {
            entry.dlq_failure.fetch_add(1, Ordering::SeqCst);
        }
        counter!(
            names::DLQ_OPERATIONS,
            "container" => container_id.to_string(),
            "outcome" => if success { "success" } else { "failure" }
        )
        .increment(1);
    }

    pub fn record_state_change(
        &self,
        container_id: &str,
        from: ContainerState,
        to: ContainerState,
    ) {
        let entry = self.entry(container_id);
        entry.state_changes.fetch_add(1, Ordering::SeqCst);
        *entry.state.write().unwrap() = to;
        counter!(
            names::STATE_CHANGES,
            "container" => container_id.to_string(),
            "from" => from.as_str(),
            "to" => to.as_str()
        )
        .increment(1);
    }

    /// Update the in-flight worker gauge for a container.
    pub fn set_in_flight(&self, container_id: &str, count: usize) {
        gauge!(names::IN_FLIGHT, "container" => container_id.to_string()).set(count as f64);
    }

    /// Snapshot one container's counters. None when the id is unknown.
    pub fn snapshot(&self, container_id: &str) -> Option<ContainerStatsSnapshot> {
        let entry = {
            let containers = self.containers.read().unwrap();
            Arc::clone(containers.get(container_id)?)
        };
        Some(Self::snapshot_entry(container_id, &entry))
    }

    /// Snapshot every known container, sorted by id.
    pub fn snapshot_all(&self) -> Vec<ContainerStatsSnapshot> {
        let entries: Vec<(String, Arc<ContainerCounters>)> = {
            let containers = self.containers.read().unwrap();
            containers
                .iter()
                .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
                .collect()
        };

        let mut snapshots: Vec<ContainerStatsSnapshot> = entries
            .iter()
            .map(|(id, entry)| Self::snapshot_entry(id, entry))
            .collect();
        snapshots.sort_by(|a, b| a.container_id.cmp(&b.container_id));
        snapshots
    }

    /// Zero one container's counters. State is preserved.
    pub fn reset(&self, container_id: &str) {
        if let Some(entry) = self.containers.read().unwrap().get(container_id) {
            entry.reset();
        }
    }

    /// Zero every container's counters.
    pub fn reset_all(&self) {
        for entry in self.containers.read().unwrap().values() {
            entry.reset();
        }
    }

    fn snapshot_entry(container_id: &str, entry: &ContainerCounters) -> ContainerStatsSnapshot {
        let samples = entry.times.samples.load(Ordering::SeqCst);
        let min_ms = entry.times.min_ms.load(Ordering::SeqCst);
        let total_ms = entry.times.total_ms.load(Ordering::SeqCst);

        ContainerStatsSnapshot {
            container_id: container_id.to_string(),
            state: *entry.state.read().unwrap(),
            processed: entry.processed.load(Ordering::SeqCst),
            failed: entry.failed.load(Ordering::SeqCst),
            retries: entry.retries.load(Ordering::SeqCst),
            dlq_success: entry.dlq_success.load(Ordering::SeqCst),
            dlq_failure: entry.dlq_failure.load(Ordering::SeqCst),
            state_changes: entry.state_changes.load(Ordering::SeqCst),
            min_processing_ms: (min_ms != NO_SAMPLE).then_some(min_ms),
            max_processing_ms: (samples > 0)
                .then(|| entry.times.max_ms.load(Ordering::SeqCst)),
            avg_processing_ms: (samples > 0).then(|| total_ms as f64 / samples as f64),
            last_success_at: timestamp_from_millis(entry.last_success_ms.load(Ordering::SeqCst)),
            last_failure_at: timestamp_from_millis(entry.last_failure_ms.load(Ordering::SeqCst)),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn timestamp_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    (millis != 0).then(|| DateTime::from_timestamp_millis(millis)).flatten()
}
