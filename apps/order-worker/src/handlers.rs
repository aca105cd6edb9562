//! Order event handlers.

use async_trait::async_trait;
use serde::Deserialize;
use sqs_worker::{BatchMessageHandler, Message, SingleMessageHandler, WorkerError};
use tracing::{debug, info};

/// An order lifecycle event as published to the orders queue.
#[derive(Debug, Deserialize)]
pub struct OrderEvent {
    pub order_id: String,
    pub event_type: OrderEventType,
    pub amount_cents: i64,
    #[serde(default)]
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventType {
    Created,
    Paid,
    Shipped,
    Cancelled,
}

/// Applies order lifecycle events, one message at a time.
pub struct OrderEventHandler;

#[async_trait]
impl SingleMessageHandler for OrderEventHandler {
    async fn handle(&self, message: &Message) -> Result<(), WorkerError> {
        let event: OrderEvent = serde_json::from_str(&message.body)?;

        info!(
            order_id = %event.order_id,
            event_type = ?event.event_type,
            amount_cents = event.amount_cents,
            "applying order event"
        );

        if event.amount_cents < 0 {
            return Err(WorkerError::handler(format!(
                "order {} has negative amount {}",
                event.order_id, event.amount_cents
            )));
        }

        // Business logic would live here (persist, emit domain events, ...).
        Ok(())
    }

    fn name(&self) -> &'static str {
        "order_event_handler"
    }
}

/// Records audit entries in bulk; the queue is written batch-at-a-time by the
/// upstream service, so the whole batch stands or falls together.
pub struct OrderAuditHandler;

#[async_trait]
impl BatchMessageHandler for OrderAuditHandler {
    async fn handle_batch(&self, messages: &[Message]) -> Result<(), WorkerError> {
        info!(count = messages.len(), "recording audit batch");

        for message in messages {
            // Audit bodies are free-form; only presence is validated.
            if message.body.is_empty() {
                return Err(WorkerError::handler(format!(
                    "audit message {} has an empty body",
                    message.message_id
                )));
            }
            debug!(message_id = %message.message_id, "audit entry recorded");
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "order_audit_handler"
    }
}
