//! In-memory SQS test infrastructure
//!
//! Provides an `InMemorySqsClient` implementing the framework's `SqsClient`
//! contract against plain in-process queues: name resolution, long-poll
//! emulation, receipt tracking for deletes, DLQ send capture, and receive
//! failure injection.

use async_trait::async_trait;
use sqs_worker::{Message, SqsClient, WorkerError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Default)]
struct SqsState {
    /// queue name -> queue URL
    names: HashMap<String, String>,
    /// queue URL -> pending messages
    queues: HashMap<String, VecDeque<Message>>,
    /// receipt handle -> queue URL, for messages received but not deleted
    in_flight: HashMap<String, String>,
    /// queue URL -> bodies passed to send_message
    sent: HashMap<String, Vec<String>>,
    /// receipt handles that were deleted
    deleted: Vec<String>,
    /// number of upcoming receive calls that should fail
    receive_failures: u32,
}

/// In-memory `SqsClient` for tests.
///
/// Visibility timeouts are not emulated: a received-but-undeleted message
/// stays in flight forever, which is exactly what forced-stop tests want to
/// observe.
pub struct InMemorySqsClient {
    state: Arc<Mutex<SqsState>>,
}

impl InMemorySqsClient {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SqsState::default())),
        }
    }

    /// Create a queue and return its URL.
    pub fn create_queue(&self, name: &str) -> String {
        let url = format!("https://sqs.in-memory.local/{name}");
        let mut state = self.state.lock().unwrap();
        state.names.insert(name.to_string(), url.clone());
        state.queues.entry(url.clone()).or_default();
        state.sent.entry(url.clone()).or_default();
        url
    }

    /// Enqueue a prebuilt message.
    pub fn enqueue(&self, queue_url: &str, message: Message) {
        let mut state = self.state.lock().unwrap();
        state
            .queues
            .entry(queue_url.to_string())
            .or_default()
            .push_back(message);
    }

    /// Enqueue a message with a generated receipt handle; returns the message.
    pub fn enqueue_body(&self, queue_url: &str, message_id: &str, body: &str) -> Message {
        let message = Message::new(message_id, format!("rh-{}", Uuid::new_v4()), body);
        self.enqueue(queue_url, message.clone());
        message
    }

    /// Messages still pending in a queue (not yet received).
    pub fn queue_len(&self, queue_url: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .queues
            .get(queue_url)
            .map_or(0, VecDeque::len)
    }

    /// Bodies sent to a queue via `send_message` (DLQ capture).
    pub fn sent_messages(&self, queue_url: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .sent
            .get(queue_url)
            .cloned()
            .unwrap_or_default()
    }

    /// Receipt handles deleted so far, in deletion order.
    pub fn deleted_receipts(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Messages received but neither deleted nor redelivered.
    pub fn in_flight_count(&self) -> usize {
        self.state.lock().unwrap().in_flight.len()
    }

    /// Make the next `n` receive calls fail with a transient error.
    pub fn fail_next_receives(&self, n: u32) {
        self.state.lock().unwrap().receive_failures = n;
    }
}

impl Default for InMemorySqsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SqsClient for InMemorySqsClient {
    async fn get_queue_url(&self, queue_name: &str) -> Result<String, WorkerError> {
        self.state
            .lock()
            .unwrap()
            .names
            .get(queue_name)
            .cloned()
            .ok_or_else(|| WorkerError::QueueNotFound(queue_name.to_string()))
    }

    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_seconds: i32,
    ) -> Result<Vec<Message>, WorkerError> {
        let deadline = Instant::now() + Duration::from_secs(wait_seconds.max(0) as u64);

        loop {
            {
                let mut state = self.state.lock().unwrap();

                if state.receive_failures > 0 {
                    state.receive_failures -= 1;
                    return Err(WorkerError::Sqs("injected receive failure".to_string()));
                }

                if !state.queues.contains_key(queue_url) {
                    return Err(WorkerError::Sqs(format!("no such queue: {queue_url}")));
                }

                let count = max_messages.clamp(1, 10) as usize;
                let popped: Vec<Message> = {
                    let queue = state.queues.get_mut(queue_url).unwrap();
                    (0..count).map_while(|_| queue.pop_front()).collect()
                };

                if !popped.is_empty() {
                    for message in &popped {
                        state
                            .in_flight
                            .insert(message.receipt_handle.clone(), queue_url.to_string());
                    }
                    tracing::debug!(queue_url, count = popped.len(), "in-memory receive");
                    return Ok(popped);
                }
            }

            if Instant::now() >= deadline {
                // Emulate the request round trip so a short poll against an
                // empty queue does not spin hot.
                tokio::time::sleep(Duration::from_millis(5)).await;
                return Ok(vec![]);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn delete_message(
        &self,
        _queue_url: &str,
        receipt_handle: &str,
    ) -> Result<(), WorkerError> {
        let mut state = self.state.lock().unwrap();
        // Idempotent: deleting an unknown receipt is fine, like SQS.
        state.in_flight.remove(receipt_handle);
        state.deleted.push(receipt_handle.to_string());
        Ok(())
    }

    async fn delete_message_batch(
        &self,
        queue_url: &str,
        receipt_handles: &[String],
    ) -> Result<(), WorkerError> {
        for receipt_handle in receipt_handles {
            self.delete_message(queue_url, receipt_handle).await?;
        }
        Ok(())
    }

    async fn send_message(&self, queue_url: &str, body: &str) -> Result<(), WorkerError> {
        let mut state = self.state.lock().unwrap();
        if !state.queues.contains_key(queue_url) {
            return Err(WorkerError::Sqs(format!("no such queue: {queue_url}")));
        }

        state
            .sent
            .entry(queue_url.to_string())
            .or_default()
            .push(body.to_string());

        let message = Message::new(
            format!("m-{}", Uuid::new_v4()),
            format!("rh-{}", Uuid::new_v4()),
            body,
        );
        state.queues.get_mut(queue_url).unwrap().push_back(message);
        Ok(())
    }
}
