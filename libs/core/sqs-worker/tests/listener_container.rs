//! End-to-end listener container scenarios against the in-memory SQS client.

use async_trait::async_trait;
use sqs_worker::{
    BatchMessageHandler, ContainerState, DlqEnvelope, ListenerConfig, ListenerContainer,
    LightweightTaskProvider, Message, MessageHandler, MetricsCollector, RetryPolicy,
    SingleMessageHandler, WorkerError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use test_utils::InMemorySqsClient;

/// Counts invocations; optionally sleeps; optionally fails the first
/// `failures_per_message` attempts of each message; tracks peak concurrency.
struct ScriptedHandler {
    invocations: AtomicU32,
    completions: AtomicU32,
    sleep: Duration,
    failures_per_message: u32,
    attempts: Mutex<HashMap<String, u32>>,
    always_fail: Option<String>,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedHandler {
    fn ok() -> Self {
        Self::new(Duration::ZERO, 0, None)
    }

    fn sleepy(sleep: Duration) -> Self {
        Self::new(sleep, 0, None)
    }

    fn flaky(failures_per_message: u32) -> Self {
        Self::new(Duration::ZERO, failures_per_message, None)
    }

    fn failing(message: &str) -> Self {
        Self::new(Duration::ZERO, 0, Some(message.to_string()))
    }

    fn new(sleep: Duration, failures_per_message: u32, always_fail: Option<String>) -> Self {
        Self {
            invocations: AtomicU32::new(0),
            completions: AtomicU32::new(0),
            sleep,
            failures_per_message,
            attempts: Mutex::new(HashMap::new()),
            always_fail,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    async fn run(&self, key: &str) -> Result<(), WorkerError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);

        if !self.sleep.is_zero() {
            tokio::time::sleep(self.sleep).await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);

        if let Some(message) = &self.always_fail {
            return Err(WorkerError::handler(message.clone()));
        }

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let entry = attempts.entry(key.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        if attempt <= self.failures_per_message {
            return Err(WorkerError::handler(format!("flaky attempt {attempt}")));
        }

        self.completions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedSingleHandler(Arc<ScriptedHandler>);

#[async_trait]
impl SingleMessageHandler for ScriptedSingleHandler {
    async fn handle(&self, message: &Message) -> Result<(), WorkerError> {
        self.0.run(&message.message_id).await
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

struct ScriptedBatchHandler(Arc<ScriptedHandler>);

#[async_trait]
impl BatchMessageHandler for ScriptedBatchHandler {
    async fn handle_batch(&self, messages: &[Message]) -> Result<(), WorkerError> {
        let key = messages
            .first()
            .map(|m| m.message_id.clone())
            .unwrap_or_default();
        self.0.run(&key).await
    }
}

struct Harness {
    client: Arc<InMemorySqsClient>,
    container: Arc<ListenerContainer>,
    handler: Arc<ScriptedHandler>,
    queue_url: String,
}

fn harness(handler: ScriptedHandler, config: ListenerConfig) -> Harness {
    harness_with(handler, config, None)
}

fn harness_with(
    handler: ScriptedHandler,
    config: ListenerConfig,
    retry_policy: Option<RetryPolicy>,
) -> Harness {
    let client = Arc::new(InMemorySqsClient::new());
    let queue_url = client.create_queue("orders");
    if config.enable_dlq {
        client.create_queue(config.dlq_name.as_deref().unwrap());
    }

    let handler = Arc::new(handler);
    let bound = if config.batch_mode {
        MessageHandler::batch(ScriptedBatchHandler(Arc::clone(&handler)))
    } else {
        MessageHandler::single(ScriptedSingleHandler(Arc::clone(&handler)))
    };

    let mut container = ListenerContainer::new(
        "orders-listener",
        bound,
        config,
        Arc::clone(&client) as Arc<dyn sqs_worker::SqsClient>,
        Arc::new(MetricsCollector::new()),
        Arc::new(LightweightTaskProvider::new().unwrap()),
    );
    if let Some(policy) = retry_policy {
        container = container.with_retry_policy(policy);
    }

    Harness {
        client,
        container: Arc::new(container),
        handler,
        queue_url,
    }
}

async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn happy_path_single_mode_auto_delete() {
    let config = ListenerConfig::for_queue("orders")
        .with_max_messages_per_poll(2)
        .with_poll_timeout_seconds(1)
        .with_max_retry_attempts(0)
        .with_auto_delete(true)
        .with_max_concurrent_messages(2);
    let h = harness(ScriptedHandler::ok(), config);

    h.client.enqueue_body(&h.queue_url, "a", "1");
    h.client.enqueue_body(&h.queue_url, "b", "2");

    h.container.start().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(3), || {
            h.container.stats().processed == 2
        })
        .await
    );

    let stats = h.container.stats();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.dlq_success + stats.dlq_failure, 0);
    assert_eq!(h.client.deleted_receipts().len(), 2);
    assert_eq!(h.container.state(), ContainerState::Running);
    assert!(stats.avg_processing_ms.is_some());

    h.container.stop(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn retry_then_success() {
    let config = ListenerConfig::for_queue("orders")
        .with_poll_timeout_seconds(1)
        .with_max_retry_attempts(2);
    let h = harness_with(
        ScriptedHandler::flaky(2),
        config,
        Some(RetryPolicy::FixedDelay { delay_ms: 10 }),
    );

    h.client.enqueue_body(&h.queue_url, "m-1", "body");

    let started = Instant::now();
    h.container.start().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(3), || {
            h.container.stats().processed == 1
        })
        .await
    );

    let stats = h.container.stats();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.retries, 2);
    assert_eq!(h.handler.invocations.load(Ordering::SeqCst), 3);
    // Two 10ms backoff sleeps sit between the three attempts.
    assert!(started.elapsed() >= Duration::from_millis(20));

    h.container.stop(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn exhausted_retries_publish_to_dlq() {
    let config = ListenerConfig::for_queue("orders")
        .with_poll_timeout_seconds(1)
        .with_max_retry_attempts(1)
        .with_dlq("q-dlq");
    let h = harness_with(
        ScriptedHandler::failing("boom"),
        config,
        Some(RetryPolicy::FixedDelay { delay_ms: 1 }),
    );
    let dlq_url = "https://sqs.in-memory.local/q-dlq";

    h.client.enqueue_body(&h.queue_url, "m-dlq", "payload");

    h.container.start().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(3), || {
            !h.client.sent_messages(dlq_url).is_empty()
        })
        .await
    );
    h.container.stop(Duration::from_secs(2)).await.unwrap();

    let stats = h.container.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.processed, 0);
    assert_eq!(stats.dlq_success, 1);
    assert_eq!(stats.dlq_failure, 0);

    let published = h.client.sent_messages(dlq_url);
    assert_eq!(published.len(), 1);
    let envelope: DlqEnvelope = serde_json::from_str(&published[0]).unwrap();
    assert_eq!(envelope.original_message_id, "m-dlq");
    assert_eq!(envelope.original_body, "payload");
    assert_eq!(envelope.error_message, "handler error: boom");
    assert_eq!(envelope.error_type, "handler");
    assert_eq!(envelope.retry_attempts_exhausted, 1);
    assert_eq!(envelope.container_id, "orders-listener");
    assert_eq!(envelope.queue_url, h.queue_url);
}

#[tokio::test]
async fn dlq_envelope_is_injection_safe_end_to_end() {
    let config = ListenerConfig::for_queue("orders")
        .with_poll_timeout_seconds(1)
        .with_max_retry_attempts(0)
        .with_dlq("q-dlq");
    let h = harness_with(
        ScriptedHandler::failing("boom"),
        config,
        Some(RetryPolicy::FixedDelay { delay_ms: 1 }),
    );
    let dlq_url = "https://sqs.in-memory.local/q-dlq";

    let hostile_body = "\",\"injected\":\"yes\",\"_\":\"";
    h.client.enqueue_body(&h.queue_url, "m-hostile", hostile_body);

    h.container.start().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(3), || {
            !h.client.sent_messages(dlq_url).is_empty()
        })
        .await
    );
    h.container.stop(Duration::from_secs(2)).await.unwrap();

    let published = h.client.sent_messages(dlq_url);
    let raw: serde_json::Value = serde_json::from_str(&published[0]).unwrap();
    let object = raw.as_object().unwrap();
    assert!(!object.contains_key("injected"));
    assert_eq!(object.get("original_body").unwrap(), hostile_body);

    let envelope: DlqEnvelope = serde_json::from_str(&published[0]).unwrap();
    assert_eq!(envelope.original_body, hostile_body);
}

#[tokio::test]
async fn graceful_stop_lets_in_flight_work_finish() {
    let config = ListenerConfig::for_queue("orders")
        .with_max_messages_per_poll(4)
        .with_poll_timeout_seconds(1)
        .with_max_retry_attempts(0)
        .with_max_concurrent_messages(4);
    let h = harness(ScriptedHandler::sleepy(Duration::from_millis(500)), config);

    for n in 0..4 {
        h.client.enqueue_body(&h.queue_url, &format!("m-{n}"), "body");
    }

    h.container.start().await.unwrap();
    // Let the poll round dispatch all four workers.
    assert!(
        wait_until(Duration::from_secs(2), || {
            h.handler.invocations.load(Ordering::SeqCst) == 4
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stop_started = Instant::now();
    h.container.stop(Duration::from_secs(2)).await.unwrap();
    let stop_elapsed = stop_started.elapsed();

    assert_eq!(h.container.state(), ContainerState::Stopped);
    assert!(stop_elapsed <= Duration::from_secs(2) + Duration::from_millis(500));
    assert_eq!(h.handler.completions.load(Ordering::SeqCst), 4);
    assert_eq!(h.container.stats().processed, 4);
    assert_eq!(h.client.deleted_receipts().len(), 4);
}

#[tokio::test]
async fn forced_stop_when_grace_exceeded() {
    let config = ListenerConfig::for_queue("orders")
        .with_max_messages_per_poll(4)
        .with_poll_timeout_seconds(1)
        .with_max_retry_attempts(0)
        .with_max_concurrent_messages(4);
    let h = harness(ScriptedHandler::sleepy(Duration::from_secs(5)), config);

    for n in 0..4 {
        h.client.enqueue_body(&h.queue_url, &format!("m-{n}"), "body");
    }

    h.container.start().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || {
            h.handler.invocations.load(Ordering::SeqCst) == 4
        })
        .await
    );

    let stop_started = Instant::now();
    h.container.stop(Duration::from_millis(300)).await.unwrap();
    let stop_elapsed = stop_started.elapsed();

    // grace + bounded forced-stop slack, well under the 5s handler sleep
    assert!(stop_elapsed < Duration::from_secs(3));
    assert_eq!(h.container.state(), ContainerState::Stopped);
    assert_eq!(h.handler.completions.load(Ordering::SeqCst), 0);
    assert_eq!(h.container.stats().processed, 0);
    assert!(h.client.deleted_receipts().is_empty());
    // Undeleted messages stay in flight and will be redelivered by SQS.
    assert_eq!(h.client.in_flight_count(), 4);
}

#[tokio::test]
async fn batch_mode_counts_per_invocation() {
    let config = ListenerConfig::for_queue("orders")
        .with_max_messages_per_poll(3)
        .with_poll_timeout_seconds(1)
        .with_max_retry_attempts(0)
        .with_batch_mode(true);
    let h = harness(ScriptedHandler::ok(), config);

    for n in 0..3 {
        h.client.enqueue_body(&h.queue_url, &format!("m-{n}"), "body");
    }

    h.container.start().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(3), || {
            h.container.stats().processed == 1
        })
        .await
    );
    h.container.stop(Duration::from_secs(2)).await.unwrap();

    // One handler invocation for the whole batch, all receipts deleted.
    assert_eq!(h.handler.invocations.load(Ordering::SeqCst), 1);
    assert_eq!(h.container.stats().processed, 1);
    assert_eq!(h.client.deleted_receipts().len(), 3);
}

#[tokio::test]
async fn failed_batch_ships_one_envelope_per_element() {
    let config = ListenerConfig::for_queue("orders")
        .with_max_messages_per_poll(3)
        .with_poll_timeout_seconds(1)
        .with_max_retry_attempts(0)
        .with_batch_mode(true)
        .with_dlq("q-dlq");
    let h = harness_with(
        ScriptedHandler::failing("batch boom"),
        config,
        Some(RetryPolicy::FixedDelay { delay_ms: 1 }),
    );
    let dlq_url = "https://sqs.in-memory.local/q-dlq";

    for n in 0..3 {
        h.client.enqueue_body(&h.queue_url, &format!("m-{n}"), "body");
    }

    h.container.start().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(3), || {
            h.client.sent_messages(dlq_url).len() == 3
        })
        .await
    );
    h.container.stop(Duration::from_secs(2)).await.unwrap();

    // One failed invocation, three envelopes.
    let stats = h.container.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.dlq_success, 3);

    let ids: Vec<String> = h
        .client
        .sent_messages(dlq_url)
        .iter()
        .map(|payload| {
            serde_json::from_str::<DlqEnvelope>(payload)
                .unwrap()
                .original_message_id
        })
        .collect();
    assert_eq!(ids, vec!["m-0", "m-1", "m-2"]);
}

#[tokio::test]
async fn empty_polls_do_not_touch_handler_or_counters() {
    let config = ListenerConfig::for_queue("orders").with_poll_timeout_seconds(0);
    let h = harness(ScriptedHandler::ok(), config);

    h.container.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    h.container.stop(Duration::from_secs(1)).await.unwrap();

    assert_eq!(h.handler.invocations.load(Ordering::SeqCst), 0);
    let stats = h.container.stats();
    assert_eq!(stats.processed + stats.failed, 0);
}

#[tokio::test]
async fn concurrency_never_exceeds_budget() {
    let config = ListenerConfig::for_queue("orders")
        .with_max_messages_per_poll(10)
        .with_poll_timeout_seconds(1)
        .with_max_retry_attempts(0)
        .with_max_concurrent_messages(2);
    let h = harness(ScriptedHandler::sleepy(Duration::from_millis(100)), config);

    for n in 0..6 {
        h.client.enqueue_body(&h.queue_url, &format!("m-{n}"), "body");
    }

    h.container.start().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(5), || {
            h.container.stats().processed == 6
        })
        .await
    );
    h.container.stop(Duration::from_secs(2)).await.unwrap();

    assert!(h.handler.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(h.client.deleted_receipts().len(), 6);
}

#[tokio::test]
async fn transient_receive_errors_do_not_kill_the_container() {
    let config = ListenerConfig::for_queue("orders")
        .with_poll_timeout_seconds(1)
        .with_retry_delay_ms(20)
        .with_max_retry_attempts(0);
    let h = harness(ScriptedHandler::ok(), config);

    h.client.fail_next_receives(2);
    h.client.enqueue_body(&h.queue_url, "m-1", "body");

    h.container.start().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(3), || {
            h.container.stats().processed == 1
        })
        .await
    );
    assert_eq!(h.container.state(), ContainerState::Running);

    h.container.stop(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn processed_plus_failed_equals_invocations_at_stop() {
    let config = ListenerConfig::for_queue("orders")
        .with_max_messages_per_poll(10)
        .with_poll_timeout_seconds(1)
        .with_max_retry_attempts(0)
        .with_max_concurrent_messages(4);
    // Fails the first attempt of every message; with zero retries every
    // message fails terminally after exactly one invocation.
    let h = harness_with(
        ScriptedHandler::flaky(1),
        config,
        Some(RetryPolicy::FixedDelay { delay_ms: 1 }),
    );

    for n in 0..5 {
        h.client.enqueue_body(&h.queue_url, &format!("m-{n}"), "body");
    }

    h.container.start().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(3), || {
            let stats = h.container.stats();
            stats.processed + stats.failed == 5
        })
        .await
    );
    h.container.stop(Duration::from_secs(2)).await.unwrap();

    let stats = h.container.stats();
    let invocations = h.handler.invocations.load(Ordering::SeqCst) as u64;
    assert_eq!(stats.processed + stats.failed, invocations);
    // max_retry_attempts=0: every first attempt fails terminally.
    assert_eq!(stats.failed, 5);
}

#[tokio::test]
async fn panicking_handler_is_a_terminal_failure_not_a_crash() {
    struct PanickingHandler;

    #[async_trait]
    impl SingleMessageHandler for PanickingHandler {
        async fn handle(&self, _message: &Message) -> Result<(), WorkerError> {
            panic!("handler blew up");
        }
    }

    let client = Arc::new(InMemorySqsClient::new());
    let queue_url = client.create_queue("orders");
    client.enqueue_body(&queue_url, "m-1", "body");

    let container = Arc::new(ListenerContainer::new(
        "panics",
        MessageHandler::single(PanickingHandler),
        ListenerConfig::for_queue("orders")
            .with_poll_timeout_seconds(1)
            .with_max_retry_attempts(0),
        Arc::clone(&client) as Arc<dyn sqs_worker::SqsClient>,
        Arc::new(MetricsCollector::new()),
        Arc::new(LightweightTaskProvider::new().unwrap()),
    ));

    container.start().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(3), || {
            container.stats().failed == 1
        })
        .await
    );
    assert_eq!(container.state(), ContainerState::Running);

    container.stop(Duration::from_secs(2)).await.unwrap();
}
