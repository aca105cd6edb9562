//! The SQS client contract the framework consumes.
//!
//! The core never talks to AWS directly; it calls this trait. Production code
//! uses [`aws::AwsSqsClient`]; tests use the in-memory client from the
//! `test-utils` crate.

pub mod aws;

use crate::error::WorkerError;
use crate::message::Message;
use async_trait::async_trait;

pub use aws::AwsSqsClient;

/// Operations the listener framework requires from SQS.
///
/// All operations are best-effort from the framework's point of view: delete
/// failures are tolerated (the message is simply redelivered after its
/// visibility timeout), and receive failures trigger a short poller backoff.
#[async_trait]
pub trait SqsClient: Send + Sync {
    /// Resolve a queue name to its URL.
    ///
    /// Fails with [`WorkerError::QueueNotFound`] when no such queue exists.
    async fn get_queue_url(&self, queue_name: &str) -> Result<String, WorkerError>;

    /// Long-poll the queue for up to `wait_seconds`, returning 0..=`max_messages`
    /// messages. `max_messages` must be in [1, 10], `wait_seconds` in [0, 20].
    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_seconds: i32,
    ) -> Result<Vec<Message>, WorkerError>;

    /// Delete a single message by receipt handle.
    async fn delete_message(&self, queue_url: &str, receipt_handle: &str)
        -> Result<(), WorkerError>;

    /// Delete a batch of messages by receipt handle.
    async fn delete_message_batch(
        &self,
        queue_url: &str,
        receipt_handles: &[String],
    ) -> Result<(), WorkerError>;

    /// Send a message body to a queue. Used by the DLQ handler.
    async fn send_message(&self, queue_url: &str, body: &str) -> Result<(), WorkerError>;
}
