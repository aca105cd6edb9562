//! Executor providers: where container tasks run.
//!
//! Each container draws two executors from its provider: one for message
//! workers, one for the long-running poller. An executor is a runtime handle
//! plus a task tracker, so the container can drain in-flight work on stop and
//! force-terminate stragglers past the grace budget.
//!
//! Variants:
//! - [`PlatformPoolProvider`] - dedicated fixed-size thread pool for workers,
//!   single-thread pool for pollers
//! - [`LightweightTaskProvider`] - one task per job on the ambient runtime
//! - [`CustomExecutorProvider`] - caller-supplied runtimes or handles

use crate::error::WorkerError;
use std::sync::Mutex;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Extra wait after force-stop before giving up on residual tasks.
const FORCED_STOP_WAIT: Duration = Duration::from_millis(500);

/// Executor variant selection for a worker application.
#[derive(Debug, Clone)]
pub enum ExecutorConfig {
    /// Dedicated thread pool with a fixed worker count; pollers get their own
    /// single-thread pool.
    PlatformPool { worker_threads: usize },

    /// One lightweight task per job on the ambient tokio runtime.
    Lightweight,

    /// Caller-supplied runtime handles; runtime lifecycle stays with the
    /// caller. To hand runtime ownership to the provider use
    /// [`CustomExecutorProvider::from_runtimes`] directly.
    Custom {
        worker_handle: Handle,
        poller_handle: Handle,
    },
}

/// Build a provider for the given executor configuration.
pub fn build_executor_provider(
    config: &ExecutorConfig,
) -> Result<std::sync::Arc<dyn ExecutorProvider>, WorkerError> {
    match config {
        ExecutorConfig::PlatformPool { worker_threads } => Ok(std::sync::Arc::new(
            PlatformPoolProvider::new(*worker_threads)?,
        )),
        ExecutorConfig::Lightweight => {
            Ok(std::sync::Arc::new(LightweightTaskProvider::new()?))
        }
        ExecutorConfig::Custom {
            worker_handle,
            poller_handle,
        } => Ok(std::sync::Arc::new(CustomExecutorProvider::from_handles(
            worker_handle.clone(),
            poller_handle.clone(),
        ))),
    }
}

/// Supplies per-container executors and owns any backing runtimes.
pub trait ExecutorProvider: Send + Sync {
    /// A fresh executor for message worker tasks.
    fn new_worker_executor(&self, name: &str) -> TaskExecutor;

    /// A fresh executor for the container's poller task.
    fn new_poller_executor(&self, name: &str) -> TaskExecutor;

    /// Whether `shutdown` is meaningful for this variant.
    fn supports_graceful_shutdown(&self) -> bool {
        true
    }

    /// Release provider-owned resources (backing thread pools). Per-executor
    /// draining has already happened container-side by the time this runs.
    fn shutdown(&self, timeout: Duration);
}

/// A spawning surface bound to one container.
///
/// Tracks every task it spawns. `shutdown` drains in three steps: close and
/// wait for the grace budget, force-cancel stragglers, then a bounded extra
/// wait that logs (never throws) on residual work.
#[derive(Clone)]
pub struct TaskExecutor {
    name: String,
    handle: Handle,
    tracker: TaskTracker,
    force_stop: CancellationToken,
}

impl TaskExecutor {
    pub fn new(name: impl Into<String>, handle: Handle) -> Self {
        Self {
            name: name.into(),
            handle,
            tracker: TaskTracker::new(),
            force_stop: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn a tracked task.
    ///
    /// Returns `None` when the executor has already been closed by a
    /// shutdown; the task is simply not run.
    pub fn spawn<F>(&self, task: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            debug!(executor = %self.name, "executor closed, task rejected");
            return None;
        }

        let force_stop = self.force_stop.clone();
        Some(self.tracker.spawn_on(
            async move {
                tokio::select! {
                    _ = force_stop.cancelled() => {}
                    _ = task => {}
                }
            },
            &self.handle,
        ))
    }

    /// Number of tasks currently tracked.
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Drain this executor.
    ///
    /// Returns `true` when all tasks completed within the grace budget;
    /// `false` when the force-stop step had to run.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            debug!(executor = %self.name, "executor drained");
            return true;
        }

        warn!(
            executor = %self.name,
            remaining = self.tracker.len(),
            grace_ms = grace.as_millis() as u64,
            "executor did not drain within grace budget, forcing stop"
        );
        self.force_stop.cancel();

        if tokio::time::timeout(FORCED_STOP_WAIT, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                executor = %self.name,
                remaining = self.tracker.len(),
                "tasks still running after forced stop"
            );
        }

        false
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("name", &self.name)
            .field("active_tasks", &self.tracker.len())
            .field("closed", &self.tracker.is_closed())
            .finish()
    }
}

/// Fixed-size dedicated thread pools.
///
/// Workers share a multi-thread runtime with a fixed thread count; pollers
/// share a single-thread runtime so a container's poll loop never competes
/// with handler work for a core.
pub struct PlatformPoolProvider {
    worker_handle: Handle,
    poller_handle: Handle,
    worker_runtime: Mutex<Option<Runtime>>,
    poller_runtime: Mutex<Option<Runtime>>,
}

impl PlatformPoolProvider {
    pub fn new(worker_threads: usize) -> Result<Self, WorkerError> {
        let worker_runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("sqs-worker")
            .enable_all()
            .build()
            .map_err(|e| WorkerError::Executor(format!("worker pool: {e}")))?;

        let poller_runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("sqs-poller")
            .enable_all()
            .build()
            .map_err(|e| WorkerError::Executor(format!("poller pool: {e}")))?;

        Ok(Self {
            worker_handle: worker_runtime.handle().clone(),
            poller_handle: poller_runtime.handle().clone(),
            worker_runtime: Mutex::new(Some(worker_runtime)),
            poller_runtime: Mutex::new(Some(poller_runtime)),
        })
    }

    fn release(slot: &Mutex<Option<Runtime>>, timeout: Duration) {
        if let Some(runtime) = slot.lock().unwrap().take() {
            // shutdown_timeout blocks, so hand it to a plain thread; callers
            // are usually on an async runtime.
            std::thread::spawn(move || runtime.shutdown_timeout(timeout));
        }
    }
}

impl ExecutorProvider for PlatformPoolProvider {
    fn new_worker_executor(&self, name: &str) -> TaskExecutor {
        TaskExecutor::new(name, self.worker_handle.clone())
    }

    fn new_poller_executor(&self, name: &str) -> TaskExecutor {
        TaskExecutor::new(name, self.poller_handle.clone())
    }

    fn shutdown(&self, timeout: Duration) {
        debug!("releasing platform thread pools");
        Self::release(&self.worker_runtime, timeout);
        Self::release(&self.poller_runtime, timeout);
    }
}

impl Drop for PlatformPoolProvider {
    fn drop(&mut self) {
        // shutdown_background is safe from async contexts, unlike dropping a
        // Runtime directly.
        for slot in [&self.worker_runtime, &self.poller_runtime] {
            if let Some(runtime) = slot.lock().unwrap().take() {
                runtime.shutdown_background();
            }
        }
    }
}

/// One task per job on the ambient runtime.
///
/// Applicable when the host application already runs a multi-thread tokio
/// runtime and wants no extra thread pools.
pub struct LightweightTaskProvider {
    handle: Handle,
}

impl LightweightTaskProvider {
    /// Must be constructed from within a tokio runtime.
    pub fn new() -> Result<Self, WorkerError> {
        let handle = Handle::try_current()
            .map_err(|e| WorkerError::Executor(format!("no ambient runtime: {e}")))?;
        Ok(Self { handle })
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl ExecutorProvider for LightweightTaskProvider {
    fn new_worker_executor(&self, name: &str) -> TaskExecutor {
        TaskExecutor::new(name, self.handle.clone())
    }

    fn new_poller_executor(&self, name: &str) -> TaskExecutor {
        TaskExecutor::new(name, self.handle.clone())
    }

    fn shutdown(&self, _timeout: Duration) {
        // The ambient runtime belongs to the host application.
        debug!("lightweight provider shutdown: nothing to release");
    }
}

/// Caller-supplied executors.
pub struct CustomExecutorProvider {
    worker_handle: Handle,
    poller_handle: Handle,
    owned_runtimes: Mutex<Vec<Runtime>>,
    owns_lifecycle: bool,
}

impl CustomExecutorProvider {
    /// Runtime lifecycle stays with the caller; `shutdown` is a no-op and
    /// `supports_graceful_shutdown` reports false.
    pub fn from_handles(worker_handle: Handle, poller_handle: Handle) -> Self {
        Self {
            worker_handle,
            poller_handle,
            owned_runtimes: Mutex::new(Vec::new()),
            owns_lifecycle: false,
        }
    }

    /// The provider takes ownership of the supplied runtimes and releases
    /// them on `shutdown`.
    pub fn from_runtimes(worker_runtime: Runtime, poller_runtime: Runtime) -> Self {
        Self {
            worker_handle: worker_runtime.handle().clone(),
            poller_handle: poller_runtime.handle().clone(),
            owned_runtimes: Mutex::new(vec![worker_runtime, poller_runtime]),
            owns_lifecycle: true,
        }
    }
}

impl ExecutorProvider for CustomExecutorProvider {
    fn new_worker_executor(&self, name: &str) -> TaskExecutor {
        TaskExecutor::new(name, self.worker_handle.clone())
    }

    fn new_poller_executor(&self, name: &str) -> TaskExecutor {
        TaskExecutor::new(name, self.poller_handle.clone())
    }

    fn supports_graceful_shutdown(&self) -> bool {
        self.owns_lifecycle
    }

    fn shutdown(&self, timeout: Duration) {
        if !self.owns_lifecycle {
            debug!("custom provider shutdown delegated to caller");
            return;
        }
        for runtime in self.owned_runtimes.lock().unwrap().drain(..) {
            std::thread::spawn(move || runtime.shutdown_timeout(timeout));
        }
    }
}

impl Drop for CustomExecutorProvider {
    fn drop(&mut self) {
        for runtime in self.owned_runtimes.lock().unwrap().drain(..) {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_spawn_and_drain() {
        let executor = TaskExecutor::new("test", Handle::current());
        let counter = Arc::new(AtomicU32::new(0));

        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            executor
                .spawn(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        assert!(executor.shutdown(Duration::from_secs(1)).await);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_spawn_rejected_after_shutdown() {
        let executor = TaskExecutor::new("test", Handle::current());
        executor.shutdown(Duration::from_millis(10)).await;

        assert!(executor.spawn(async {}).is_none());
    }

    #[tokio::test]
    async fn test_forced_stop_cancels_stragglers() {
        let executor = TaskExecutor::new("test", Handle::current());
        let finished = Arc::new(AtomicU32::new(0));

        let finished_clone = Arc::clone(&finished);
        executor
            .spawn(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                finished_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let started = std::time::Instant::now();
        let drained = executor.shutdown(Duration::from_millis(50)).await;

        assert!(!drained);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        // grace + forced-stop wait, with slack
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_lightweight_provider() {
        let provider = LightweightTaskProvider::new().unwrap();
        assert!(provider.supports_graceful_shutdown());

        let executor = provider.new_worker_executor("c1-worker");
        let ran = Arc::new(AtomicU32::new(0));
        let ran_clone = Arc::clone(&ran);
        executor
            .spawn(async move {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        executor.shutdown(Duration::from_secs(1)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_platform_pool_provider() {
        let provider = PlatformPoolProvider::new(2).unwrap();
        let executor = provider.new_worker_executor("c1-worker");

        let ran = Arc::new(AtomicU32::new(0));
        let ran_clone = Arc::clone(&ran);
        executor
            .spawn(async move {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        executor.shutdown(Duration::from_secs(1)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        provider.shutdown(Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_custom_provider_delegated_lifecycle() {
        let provider =
            CustomExecutorProvider::from_handles(Handle::current(), Handle::current());
        assert!(!provider.supports_graceful_shutdown());
        // No-op, must not panic.
        provider.shutdown(Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_build_provider_from_config() {
        let lightweight = build_executor_provider(&ExecutorConfig::Lightweight).unwrap();
        assert!(lightweight.supports_graceful_shutdown());

        let custom = build_executor_provider(&ExecutorConfig::Custom {
            worker_handle: Handle::current(),
            poller_handle: Handle::current(),
        })
        .unwrap();
        assert!(!custom.supports_graceful_shutdown());

        let pool =
            build_executor_provider(&ExecutorConfig::PlatformPool { worker_threads: 2 }).unwrap();
        assert!(pool.supports_graceful_shutdown());
        pool.shutdown(Duration::from_millis(50));
    }
}
