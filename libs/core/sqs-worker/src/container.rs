//! The listener container: one handler bound to one queue.
//!
//! A container owns the state machine, the executors, the poller and the
//! concurrency budget for a single handler binding. `start` and `stop` are
//! serialised through an async mutex; the state variable itself only changes
//! through one transition function that consults the transition table.
//!
//! Dispatch applies backpressure at the source: the poller task acquires a
//! semaphore permit per message (per batch in batch mode) before a worker is
//! spawned, so at most `max_concurrent_messages` workers are ever in flight
//! and polling stalls when they are all busy.

use crate::client::SqsClient;
use crate::config::ListenerConfig;
use crate::dlq::DlqHandler;
use crate::error::WorkerError;
use crate::executor::{ExecutorProvider, TaskExecutor};
use crate::handler::MessageHandler;
use crate::message::Message;
use crate::metrics::{ContainerStatsSnapshot, MetricsCollector};
use crate::poller::MessagePoller;
use crate::processor::{MessageProcessor, WorkUnit};
use crate::retry::RetryPolicy;
use crate::state::ContainerState;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

/// Grace given to the poller executor after the workers have drained; the
/// poll loop observes its cancellation token immediately, so this only
/// covers scheduling latency.
const POLLER_STOP_GRACE: Duration = Duration::from_secs(1);

/// The shared state variable plus the single function that mutates it.
struct StateCell {
    container_id: String,
    state: RwLock<ContainerState>,
    metrics: Arc<MetricsCollector>,
}

impl StateCell {
    fn new(container_id: String, metrics: Arc<MetricsCollector>) -> Self {
        metrics.register_container(&container_id, ContainerState::Created);
        Self {
            container_id,
            state: RwLock::new(ContainerState::Created),
            metrics,
        }
    }

    fn get(&self) -> ContainerState {
        *self.state.read().unwrap()
    }

    /// Transition from any of `allowed` to `to`; returns the state actually
    /// left, or None (with a warning) when the transition is not permitted.
    fn transition_any(
        &self,
        allowed: &[ContainerState],
        to: ContainerState,
    ) -> Option<ContainerState> {
        let from = {
            let mut state = self.state.write().unwrap();
            let from = *state;
            if !allowed.contains(&from) || !from.can_transition_to(to) {
                warn!(
                    container_id = %self.container_id,
                    %from,
                    %to,
                    "state transition rejected"
                );
                return None;
            }
            *state = to;
            from
        };
        self.metrics
            .record_state_change(&self.container_id, from, to);
        info!(container_id = %self.container_id, %from, %to, "state transition");
        Some(from)
    }

    fn transition(&self, from: ContainerState, to: ContainerState) -> bool {
        self.transition_any(&[from], to).is_some()
    }
}

/// Everything a worker task needs, detached from the container so spawned
/// futures never hold a reference to it.
#[derive(Clone)]
struct WorkDispatcher {
    container_id: String,
    state: Arc<StateCell>,
    semaphore: Arc<Semaphore>,
    worker_executor: TaskExecutor,
    processor: Arc<MessageProcessor>,
    dlq: Option<Arc<DlqHandler>>,
    metrics: Arc<MetricsCollector>,
    retry_policy: RetryPolicy,
    batch_mode: bool,
    max_retry_attempts: u32,
    in_flight: Arc<AtomicUsize>,
}

impl WorkDispatcher {
    /// Runs on the poller task for every received batch.
    ///
    /// Blocking on the semaphore here is deliberate: it is the backpressure
    /// knob that bounds in-flight work and stalls polling when the budget is
    /// spent.
    async fn dispatch_batch(&self, batch: Vec<Message>) {
        if self.state.get() != ContainerState::Running {
            debug!(
                container_id = %self.container_id,
                count = batch.len(),
                "container not running, dropping batch"
            );
            return;
        }

        if self.batch_mode {
            // One permit covers the whole batch.
            let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                return;
            };
            self.spawn_worker(WorkUnit::Batch(batch), permit);
        } else {
            for message in batch {
                let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                    return;
                };
                self.spawn_worker(WorkUnit::Single(message), permit);
            }
        }
    }

    fn spawn_worker(&self, unit: WorkUnit, permit: OwnedSemaphorePermit) {
        let dispatcher = self.clone();
        let spawned = self.worker_executor.spawn(async move {
            // Held for the lifetime of the task; dropping it releases the
            // concurrency slot even when the task is force-stopped.
            let _permit = permit;
            dispatcher.process_unit(unit).await;
        });

        if spawned.is_none() {
            debug!(
                container_id = %self.container_id,
                "worker executor closed, unit not scheduled"
            );
        }
    }

    /// One handler invocation under the retry policy. Never panics and never
    /// lets an error escape the task.
    async fn process_unit(&self, unit: WorkUnit) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.set_in_flight(&self.container_id, current);

        let started = Instant::now();
        let (result, retries) = self
            .retry_policy
            .execute_with_retry(self.max_retry_attempts, || {
                AssertUnwindSafe(self.processor.invoke(&unit))
                    .catch_unwind()
                    .map(|outcome| match outcome {
                        Ok(result) => result,
                        Err(_) => Err(WorkerError::handler("handler panicked")),
                    })
            })
            .await;

        if retries > 0 {
            self.metrics
                .record_retry_attempts(&self.container_id, retries);
        }

        match result {
            Ok(()) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                self.metrics.record_processed(&self.container_id);
                self.metrics
                    .record_processing_time(&self.container_id, elapsed_ms);
                self.processor.delete_on_success(&unit).await;
            }
            Err(error) => {
                self.metrics
                    .record_failed(&self.container_id, error.error_type());
                warn!(
                    container_id = %self.container_id,
                    count = unit.len(),
                    retries,
                    error = %error,
                    "message handling terminally failed"
                );

                if let Some(dlq) = &self.dlq {
                    // A failed batch ships one envelope per element.
                    for message in unit.messages() {
                        dlq.publish(message, &error, self.max_retry_attempts).await;
                    }
                }
            }
        }

        let current = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        self.metrics.set_in_flight(&self.container_id, current);
    }
}

/// Live resources of a RUNNING container, released on stop.
struct ContainerRuntime {
    queue_url: String,
    worker_executor: TaskExecutor,
    poller_executor: TaskExecutor,
    poller: Arc<MessagePoller>,
}

/// Runtime unit binding one handler to one queue.
pub struct ListenerContainer {
    id: String,
    config: ListenerConfig,
    handler: MessageHandler,
    client: Arc<dyn SqsClient>,
    metrics: Arc<MetricsCollector>,
    provider: Arc<dyn ExecutorProvider>,
    retry_policy: RetryPolicy,
    state: Arc<StateCell>,
    semaphore: Arc<Semaphore>,
    /// Serialises start/stop; only one lifecycle operation runs at a time.
    lifecycle: AsyncMutex<()>,
    runtime: RwLock<Option<ContainerRuntime>>,
}

impl ListenerContainer {
    pub fn new(
        id: impl Into<String>,
        handler: MessageHandler,
        config: ListenerConfig,
        client: Arc<dyn SqsClient>,
        metrics: Arc<MetricsCollector>,
        provider: Arc<dyn ExecutorProvider>,
    ) -> Self {
        let id = id.into();
        let retry_policy = RetryPolicy::from_config(&config);
        let state = Arc::new(StateCell::new(id.clone(), Arc::clone(&metrics)));
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_messages.max(1)));

        Self {
            id,
            config,
            handler,
            client,
            metrics,
            provider,
            retry_policy,
            state,
            semaphore,
            lifecycle: AsyncMutex::new(()),
            runtime: RwLock::new(None),
        }
    }

    /// Override the retry policy (the default is exponential backoff seeded
    /// from `retry_delay_ms`).
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    pub fn state(&self) -> ContainerState {
        self.state.get()
    }

    /// Current counters for this container, readable in every state.
    pub fn stats(&self) -> ContainerStatsSnapshot {
        self.metrics.snapshot(&self.id).unwrap_or_else(|| {
            // The entry is registered at construction, so this only covers a
            // collector that was reset out from under us.
            ContainerStatsSnapshot {
                container_id: self.id.clone(),
                state: self.state.get(),
                processed: 0,
                failed: 0,
                retries: 0,
                dlq_success: 0,
                dlq_failure: 0,
                state_changes: 0,
                min_processing_ms: None,
                max_processing_ms: None,
                avg_processing_ms: None,
                last_success_at: None,
                last_failure_at: None,
            }
        })
    }

    /// Start consuming.
    ///
    /// Validates the configuration, resolves the queue (and DLQ) URL,
    /// acquires executors and launches the poller. Succeeds only when the
    /// container reaches RUNNING; a start from an ineligible state is a
    /// warn-logged no-op.
    pub async fn start(&self) -> Result<(), WorkerError> {
        use ContainerState::*;

        let _lifecycle = self.lifecycle.lock().await;

        if self
            .state
            .transition_any(&[Created, Stopped, Failed], Starting)
            .is_none()
        {
            return Ok(());
        }

        match self.try_start().await {
            Ok(()) => {
                if self.state.transition(Starting, Running) {
                    info!(container_id = %self.id, "container started");
                    Ok(())
                } else {
                    self.release_runtime(Duration::ZERO).await;
                    self.state.transition_any(&[Starting], Failed);
                    Err(WorkerError::Container(
                        "container left STARTING during startup".to_string(),
                    ))
                }
            }
            Err(error) => {
                error!(container_id = %self.id, error = %error, "container start failed");
                self.release_runtime(Duration::ZERO).await;
                self.state.transition(Starting, Failed);
                Err(error)
            }
        }
    }

    async fn try_start(&self) -> Result<(), WorkerError> {
        self.config.validate()?;

        if self.config.batch_mode != self.handler.is_batch() {
            return Err(WorkerError::Config(format!(
                "batch_mode={} but the bound handler takes {}",
                self.config.batch_mode,
                if self.handler.is_batch() {
                    "batches"
                } else {
                    "single messages"
                }
            )));
        }

        // An explicit URL is used verbatim; a name goes through the lookup.
        let queue_url = match (&self.config.queue_url, &self.config.queue_name) {
            (Some(url), _) if !url.is_empty() => url.clone(),
            (_, Some(name)) => self.client.get_queue_url(name).await?,
            _ => unreachable!("validated above"),
        };
        info!(container_id = %self.id, queue_url = %queue_url, "queue resolved");

        let dlq = DlqHandler::resolve(
            Arc::clone(&self.client),
            Arc::clone(&self.metrics),
            &self.id,
            &queue_url,
            &self.config,
        )
        .await?
        .map(Arc::new);

        let worker_executor = self
            .provider
            .new_worker_executor(&format!("{}-worker", self.id));
        let poller_executor = self
            .provider
            .new_poller_executor(&format!("{}-poller", self.id));

        let processor = Arc::new(MessageProcessor::new(
            self.handler.clone(),
            Arc::clone(&self.client),
            queue_url.clone(),
            self.config.auto_delete,
        ));

        let dispatcher = WorkDispatcher {
            container_id: self.id.clone(),
            state: Arc::clone(&self.state),
            semaphore: Arc::clone(&self.semaphore),
            worker_executor: worker_executor.clone(),
            processor,
            dlq,
            metrics: Arc::clone(&self.metrics),
            retry_policy: self.retry_policy,
            batch_mode: self.config.batch_mode,
            max_retry_attempts: self.config.max_retry_attempts,
            in_flight: Arc::new(AtomicUsize::new(0)),
        };

        let poller = Arc::new(MessagePoller::new(
            Arc::clone(&self.client),
            queue_url.clone(),
            self.config.max_messages_per_poll,
            self.config.poll_timeout_seconds,
            self.config.retry_delay_ms,
        ));

        let loop_poller = Arc::clone(&poller);
        let poll_handle = poller_executor
            .spawn(async move {
                loop_poller
                    .poll_loop(move |batch| {
                        let dispatcher = dispatcher.clone();
                        async move { dispatcher.dispatch_batch(batch).await }
                    })
                    .await;
            })
            .ok_or_else(|| {
                WorkerError::Executor("poller executor rejected the poll task".to_string())
            })?;

        // An uncaught failure in the poller task fails the container; there
        // is no automatic restart.
        let monitor_state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let outcome = poll_handle.await;
            if monitor_state.get() == ContainerState::Running {
                let panicked = outcome.as_ref().err().is_some_and(|e| e.is_panic());
                error!(
                    container_id = %monitor_state.container_id,
                    panicked,
                    "poller task exited while container was RUNNING"
                );
                monitor_state.transition(ContainerState::Running, ContainerState::Failed);
            }
        });

        *self.runtime.write().unwrap() = Some(ContainerRuntime {
            queue_url,
            worker_executor,
            poller_executor,
            poller,
        });

        Ok(())
    }

    /// Stop consuming.
    ///
    /// Signals the poller, drains the worker executor within `grace`, then
    /// releases the poller executor. Returns within the grace budget plus a
    /// bounded slack; in-flight workers past the deadline are force-stopped.
    pub async fn stop(&self, grace: Duration) -> Result<(), WorkerError> {
        use ContainerState::*;

        let _lifecycle = self.lifecycle.lock().await;

        if self
            .state
            .transition_any(&[Running, Starting, Failed], Stopping)
            .is_none()
        {
            return Ok(());
        }

        self.release_runtime(grace).await;

        if self.state.transition(Stopping, Stopped) {
            info!(container_id = %self.id, "container stopped");
            Ok(())
        } else {
            self.state.transition_any(&[Stopping], Failed);
            Err(WorkerError::Container(
                "container left STOPPING during shutdown".to_string(),
            ))
        }
    }

    async fn release_runtime(&self, grace: Duration) {
        let runtime = self.runtime.write().unwrap().take();
        let Some(runtime) = runtime else {
            return;
        };

        runtime.poller.stop_polling();

        // Workers first: let in-flight handlers finish inside the budget.
        let drained = runtime.worker_executor.shutdown(grace).await;
        if !drained {
            warn!(
                container_id = %self.id,
                queue_url = %runtime.queue_url,
                "in-flight workers force-stopped; undeleted messages will be redelivered"
            );
        }
        runtime.poller_executor.shutdown(POLLER_STOP_GRACE).await;
    }
}

impl std::fmt::Debug for ListenerContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerContainer")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .field("handler", &self.handler)
            .finish()
    }
}
