//! Listener configuration
//!
//! `ListenerConfig` carries the per-listener options a binding declares:
//! queue identity, polling shape, delivery mode, retry policy inputs, DLQ
//! routing, and the concurrency ceiling. Validation is a pure function over
//! the struct and runs at container start; a bad config fails `start()`, not
//! the first message.

use crate::error::WorkerError;

/// SQS allows at most 10 messages per receive call.
pub const MAX_MESSAGES_PER_POLL_LIMIT: i32 = 10;

/// SQS allows at most 20 seconds of server-side long-poll wait.
pub const MAX_POLL_TIMEOUT_SECONDS: i32 = 20;

/// Configuration for one listener container
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Queue name, resolved to a URL at container start.
    /// Exactly one of `queue_name` / `queue_url` must be set.
    pub queue_name: Option<String>,

    /// Explicit queue URL, used verbatim.
    pub queue_url: Option<String>,

    /// Messages requested per receive call, in [1, 10].
    pub max_messages_per_poll: i32,

    /// Server-side long-poll wait in seconds, in [0, 20]. 0 = short poll.
    pub poll_timeout_seconds: i32,

    /// Invoke the handler once per batch instead of once per message.
    pub batch_mode: bool,

    /// Delete messages after the handler returns successfully.
    pub auto_delete: bool,

    /// Additional attempts after the first failure (0 = no retries).
    pub max_retry_attempts: u32,

    /// Base delay for the retry policy in milliseconds.
    pub retry_delay_ms: u64,

    /// Publish terminal failures to the dead letter queue.
    pub enable_dlq: bool,

    /// DLQ queue name, required when `enable_dlq` is set.
    pub dlq_name: Option<String>,

    /// Concurrency ceiling: maximum in-flight worker tasks for this listener.
    pub max_concurrent_messages: usize,
}

impl ListenerConfig {
    /// Create a config consuming a queue by name
    pub fn for_queue(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: Some(queue_name.into()),
            ..Self::default()
        }
    }

    /// Create a config consuming a queue by explicit URL
    pub fn for_queue_url(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: Some(queue_url.into()),
            ..Self::default()
        }
    }

    /// Set the receive batch size (SQS caps this at 10)
    pub fn with_max_messages_per_poll(mut self, count: i32) -> Self {
        self.max_messages_per_poll = count;
        self
    }

    /// Set the long-poll wait in seconds (SQS caps this at 20)
    pub fn with_poll_timeout_seconds(mut self, seconds: i32) -> Self {
        self.poll_timeout_seconds = seconds;
        self
    }

    /// Deliver whole batches to the handler instead of single messages
    pub fn with_batch_mode(mut self, batch_mode: bool) -> Self {
        self.batch_mode = batch_mode;
        self
    }

    /// Enable or disable deletion after successful handling
    pub fn with_auto_delete(mut self, auto_delete: bool) -> Self {
        self.auto_delete = auto_delete;
        self
    }

    /// Set the number of additional attempts after the first failure
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Set the base retry delay in milliseconds
    pub fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    /// Route terminal failures to the named DLQ
    pub fn with_dlq(mut self, dlq_name: impl Into<String>) -> Self {
        self.enable_dlq = true;
        self.dlq_name = Some(dlq_name.into());
        self
    }

    /// Set the concurrency ceiling for this listener
    pub fn with_max_concurrent_messages(mut self, count: usize) -> Self {
        self.max_concurrent_messages = count;
        self
    }

    /// Validate the configuration.
    ///
    /// Runs at container start; any error here is fatal for that container
    /// and leaves the rest of the registry untouched.
    pub fn validate(&self) -> Result<(), WorkerError> {
        let has_name = self.queue_name.as_deref().is_some_and(|n| !n.is_empty());
        let has_url = self.queue_url.as_deref().is_some_and(|u| !u.is_empty());

        match (has_name, has_url) {
            (false, false) => {
                return Err(WorkerError::Config(
                    "either queue_name or queue_url must be set".to_string(),
                ));
            }
            (true, true) => {
                return Err(WorkerError::Config(
                    "queue_name and queue_url are mutually exclusive".to_string(),
                ));
            }
            _ => {}
        }

        if !(1..=MAX_MESSAGES_PER_POLL_LIMIT).contains(&self.max_messages_per_poll) {
            return Err(WorkerError::Config(format!(
                "max_messages_per_poll must be in [1, {}], got {}",
                MAX_MESSAGES_PER_POLL_LIMIT, self.max_messages_per_poll
            )));
        }

        if !(0..=MAX_POLL_TIMEOUT_SECONDS).contains(&self.poll_timeout_seconds) {
            return Err(WorkerError::Config(format!(
                "poll_timeout_seconds must be in [0, {}], got {}",
                MAX_POLL_TIMEOUT_SECONDS, self.poll_timeout_seconds
            )));
        }

        if self.enable_dlq && !self.dlq_name.as_deref().is_some_and(|n| !n.is_empty()) {
            return Err(WorkerError::Config(
                "dlq_name is required when enable_dlq is set".to_string(),
            ));
        }

        if self.max_concurrent_messages == 0 {
            return Err(WorkerError::Config(
                "max_concurrent_messages must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            queue_name: None,
            queue_url: None,
            max_messages_per_poll: 10,
            poll_timeout_seconds: 20,
            batch_mode: false,
            auto_delete: true,
            max_retry_attempts: 3,
            retry_delay_ms: 1000,
            enable_dlq: false,
            dlq_name: None,
            max_concurrent_messages: 1,
        }
    }
}
