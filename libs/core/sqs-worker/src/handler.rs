//! Handler traits and the handler binding.
//!
//! User code implements one of two traits depending on the listener's
//! delivery mode:
//! - `SingleMessageHandler` - invoked once per message
//! - `BatchMessageHandler` - invoked once per received batch
//!
//! A bound handler is carried as the `MessageHandler` tagged union; the
//! container validates at start that the variant matches the listener's
//! `batch_mode` flag.

use crate::error::WorkerError;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// Handler invoked once per message.
///
/// # Example
///
/// ```rust,ignore
/// struct OrderHandler {
///     orders: Arc<OrderService>,
/// }
///
/// #[async_trait]
/// impl SingleMessageHandler for OrderHandler {
///     async fn handle(&self, message: &Message) -> Result<(), WorkerError> {
///         let event: OrderEvent = serde_json::from_str(&message.body)?;
///         self.orders.apply(event).await
///     }
///
///     fn name(&self) -> &'static str {
///         "order_handler"
///     }
/// }
/// ```
#[async_trait]
pub trait SingleMessageHandler: Send + Sync {
    /// Process a single message.
    ///
    /// Return `Ok(())` for success, `Err` for failure. Failures are retried
    /// per the listener's retry policy and routed to the DLQ once exhausted.
    /// Handlers must be idempotent: SQS is at-least-once.
    async fn handle(&self, message: &Message) -> Result<(), WorkerError>;

    /// Handler name for logging.
    fn name(&self) -> &'static str {
        "handler"
    }
}

/// Handler invoked once per received batch.
#[async_trait]
pub trait BatchMessageHandler: Send + Sync {
    /// Process a whole batch.
    ///
    /// A failure of any element fails the whole batch: the batch is retried
    /// as a unit and, on exhaustion, every element is shipped to the DLQ.
    async fn handle_batch(&self, messages: &[Message]) -> Result<(), WorkerError>;

    /// Handler name for logging.
    fn name(&self) -> &'static str {
        "batch_handler"
    }
}

/// A handler bound to a listener, tagged by arity.
///
/// Two booleans ("batch?", "single?") would admit contradictions; the enum
/// makes the arity unrepresentable-wrong.
#[derive(Clone)]
pub enum MessageHandler {
    Single(Arc<dyn SingleMessageHandler>),
    Batch(Arc<dyn BatchMessageHandler>),
}

impl MessageHandler {
    pub fn single(handler: impl SingleMessageHandler + 'static) -> Self {
        Self::Single(Arc::new(handler))
    }

    pub fn batch(handler: impl BatchMessageHandler + 'static) -> Self {
        Self::Batch(Arc::new(handler))
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Single(h) => h.name(),
            Self::Batch(h) => h.name(),
        }
    }
}

impl std::fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(h) => write!(f, "MessageHandler::Single({})", h.name()),
            Self::Batch(h) => write!(f, "MessageHandler::Batch({})", h.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopSingle;

    #[async_trait]
    impl SingleMessageHandler for NoopSingle {
        async fn handle(&self, _message: &Message) -> Result<(), WorkerError> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "noop_single"
        }
    }

    struct NoopBatch;

    #[async_trait]
    impl BatchMessageHandler for NoopBatch {
        async fn handle_batch(&self, _messages: &[Message]) -> Result<(), WorkerError> {
            Ok(())
        }
    }

    #[test]
    fn test_handler_arity_tags() {
        let single = MessageHandler::single(NoopSingle);
        assert!(!single.is_batch());
        assert_eq!(single.name(), "noop_single");

        let batch = MessageHandler::batch(NoopBatch);
        assert!(batch.is_batch());
        assert_eq!(batch.name(), "batch_handler");
    }

    #[tokio::test]
    async fn test_handler_invocation() {
        let handler = MessageHandler::single(NoopSingle);
        let msg = Message::new("m-1", "rh-1", "body");

        match handler {
            MessageHandler::Single(h) => h.handle(&msg).await.unwrap(),
            MessageHandler::Batch(_) => panic!("expected single"),
        }
    }
}
