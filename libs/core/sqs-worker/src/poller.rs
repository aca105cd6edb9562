//! The long-poll loop.
//!
//! One poller task per running container. It repeatedly calls the SQS receive
//! operation and hands every non-empty batch to a callback, synchronously on
//! the poller task - backpressure from the dispatch path therefore throttles
//! polling. Transient receive errors are swallowed with a short backoff.
//! The poller never invokes handlers itself.

use crate::client::SqsClient;
use crate::message::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Ceiling for the transient-error backoff.
const MAX_ERROR_BACKOFF_MS: u64 = 1000;

/// Cancellable receive loop for one queue.
pub struct MessagePoller {
    client: Arc<dyn SqsClient>,
    queue_url: String,
    max_messages: i32,
    wait_seconds: i32,
    error_backoff: Duration,
    cancel: CancellationToken,
}

impl MessagePoller {
    pub fn new(
        client: Arc<dyn SqsClient>,
        queue_url: impl Into<String>,
        max_messages: i32,
        wait_seconds: i32,
        retry_delay_ms: u64,
    ) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            max_messages,
            wait_seconds,
            error_backoff: Duration::from_millis(retry_delay_ms.min(MAX_ERROR_BACKOFF_MS)),
            cancel: CancellationToken::new(),
        }
    }

    /// Signal the loop to exit. Idempotent.
    pub fn stop_polling(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run the receive loop until stopped.
    ///
    /// `on_batch` is awaited on the poller task for every non-empty batch, in
    /// the order SQS returned them. Empty responses loop straight into the
    /// next receive.
    pub async fn poll_loop<F, Fut>(&self, mut on_batch: F)
    where
        F: FnMut(Vec<Message>) -> Fut,
        Fut: Future<Output = ()>,
    {
        info!(queue_url = %self.queue_url, "poller started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let received = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.client.receive_messages(
                    &self.queue_url,
                    self.max_messages,
                    self.wait_seconds,
                ) => result,
            };

            match received {
                Ok(batch) if batch.is_empty() => continue,
                Ok(batch) => {
                    debug!(
                        queue_url = %self.queue_url,
                        count = batch.len(),
                        "received batch"
                    );
                    on_batch(batch).await;
                }
                Err(error) => {
                    warn!(
                        queue_url = %self.queue_url,
                        error = %error,
                        backoff_ms = self.error_backoff.as_millis() as u64,
                        "receive failed, backing off"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.error_backoff) => {}
                    }
                }
            }
        }

        info!(queue_url = %self.queue_url, "poller stopped");
    }
}
