//! Handler invocation and post-success deletion.
//!
//! The processor owns the step between "a unit of work arrived" and "the
//! handler returned": it calls the bound handler with the right arity and,
//! when auto-delete is on, deletes the receipt(s) after success. Delete
//! failures are logged, never propagated - SQS will simply redeliver after
//! the visibility timeout, which idempotent handlers absorb.

use crate::client::SqsClient;
use crate::error::WorkerError;
use crate::handler::MessageHandler;
use crate::message::Message;
use std::sync::Arc;
use tracing::warn;

/// One schedulable unit: a single message or a whole batch.
#[derive(Debug, Clone)]
pub enum WorkUnit {
    Single(Message),
    Batch(Vec<Message>),
}

impl WorkUnit {
    pub fn messages(&self) -> &[Message] {
        match self {
            Self::Single(message) => std::slice::from_ref(message),
            Self::Batch(messages) => messages,
        }
    }

    pub fn len(&self) -> usize {
        self.messages().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages().is_empty()
    }
}

/// Invokes the bound handler and performs auto-delete.
pub struct MessageProcessor {
    handler: MessageHandler,
    client: Arc<dyn SqsClient>,
    queue_url: String,
    auto_delete: bool,
}

impl MessageProcessor {
    pub fn new(
        handler: MessageHandler,
        client: Arc<dyn SqsClient>,
        queue_url: impl Into<String>,
        auto_delete: bool,
    ) -> Self {
        Self {
            handler,
            client,
            queue_url: queue_url.into(),
            auto_delete,
        }
    }

    /// Invoke the handler for this unit. Errors propagate to the retry layer.
    pub async fn invoke(&self, unit: &WorkUnit) -> Result<(), WorkerError> {
        match (&self.handler, unit) {
            (MessageHandler::Single(handler), WorkUnit::Single(message)) => {
                handler.handle(message).await
            }
            (MessageHandler::Batch(handler), WorkUnit::Batch(messages)) => {
                handler.handle_batch(messages).await
            }
            // Arity is validated at container start; this is a programming error.
            _ => Err(WorkerError::Container(
                "handler arity does not match work unit".to_string(),
            )),
        }
    }

    /// Delete the unit's receipt(s) after a successful handler return.
    ///
    /// Best-effort: failures are logged and swallowed.
    pub async fn delete_on_success(&self, unit: &WorkUnit) {
        if !self.auto_delete {
            return;
        }

        let result = match unit {
            WorkUnit::Single(message) => {
                self.client
                    .delete_message(&self.queue_url, &message.receipt_handle)
                    .await
            }
            WorkUnit::Batch(messages) => {
                let receipts: Vec<String> = messages
                    .iter()
                    .map(|message| message.receipt_handle.clone())
                    .collect();
                self.client
                    .delete_message_batch(&self.queue_url, &receipts)
                    .await
            }
        };

        if let Err(error) = result {
            warn!(
                queue_url = %self.queue_url,
                count = unit.len(),
                error = %error,
                "delete after success failed, messages will be redelivered"
            );
        }
    }
}
