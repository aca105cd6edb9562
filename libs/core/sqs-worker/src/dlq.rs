//! Dead letter queue publishing.
//!
//! When a message exhausts its retries the container hands it here. The
//! failure is wrapped in a structured envelope and sent to the configured DLQ.
//! The envelope is always produced by the serde encoder - user-controlled
//! message bodies never touch the JSON syntax, which is what keeps a hostile
//! body from injecting fields into the envelope.
//!
//! A DLQ handler never throws back into the container: publish failures are
//! logged and recorded via `record_dlq_operation(false)`.

use crate::client::SqsClient;
use crate::config::ListenerConfig;
use crate::error::WorkerError;
use crate::message::Message;
use crate::metrics::MetricsCollector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// The structured failure record published to the DLQ.
///
/// Field names are stable; DLQ consumers depend on this shape. Timestamps are
/// UTC ISO-8601.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEnvelope {
    /// SQS message id of the failed message.
    pub original_message_id: String,

    /// Verbatim body of the failed message.
    pub original_body: String,

    /// Rendered failure message of the last attempt.
    pub error_message: String,

    /// Stable error kind tag (see `WorkerError::error_type`).
    pub error_type: String,

    /// When the envelope was built.
    pub timestamp: DateTime<Utc>,

    /// Container that gave up on the message.
    pub container_id: String,

    /// Source queue the message came from.
    pub queue_url: String,

    /// Retry attempts performed before giving up.
    pub retry_attempts_exhausted: u32,

    /// String attributes of the original message.
    pub original_attributes: HashMap<String, String>,
}

impl DlqEnvelope {
    pub fn new(
        message: &Message,
        error: &WorkerError,
        container_id: &str,
        queue_url: &str,
        retry_attempts_exhausted: u32,
    ) -> Self {
        Self {
            original_message_id: message.message_id.clone(),
            original_body: message.body.clone(),
            error_message: error.to_string(),
            error_type: error.error_type().to_string(),
            timestamp: Utc::now(),
            container_id: container_id.to_string(),
            queue_url: queue_url.to_string(),
            retry_attempts_exhausted,
            original_attributes: message.attributes.clone(),
        }
    }
}

/// Publishes failure envelopes for one container.
pub struct DlqHandler {
    client: Arc<dyn SqsClient>,
    metrics: Arc<MetricsCollector>,
    container_id: String,
    source_queue_url: String,
    dlq_url: String,
}

impl DlqHandler {
    /// Resolve the DLQ for a listener at container start.
    ///
    /// Returns `Ok(None)` when the listener has no DLQ enabled. A missing or
    /// unresolvable DLQ name is a start-time error: the container goes to
    /// FAILED instead of discovering the problem on the first failed message.
    pub async fn resolve(
        client: Arc<dyn SqsClient>,
        metrics: Arc<MetricsCollector>,
        container_id: &str,
        source_queue_url: &str,
        config: &ListenerConfig,
    ) -> Result<Option<Self>, WorkerError> {
        if !config.enable_dlq {
            return Ok(None);
        }

        let dlq_name = config
            .dlq_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                WorkerError::Config("dlq_name is required when enable_dlq is set".to_string())
            })?;

        let dlq_url = client.get_queue_url(dlq_name).await?;
        info!(
            container_id = %container_id,
            dlq_name = %dlq_name,
            dlq_url = %dlq_url,
            "resolved dead letter queue"
        );

        Ok(Some(Self {
            client,
            metrics,
            container_id: container_id.to_string(),
            source_queue_url: source_queue_url.to_string(),
            dlq_url,
        }))
    }

    pub fn dlq_url(&self) -> &str {
        &self.dlq_url
    }

    /// Publish a failure envelope for one message.
    ///
    /// Returns whether the publish succeeded. Serialization and send errors
    /// are logged and recorded; they never propagate - the original message
    /// is already terminally failed at this point.
    pub async fn publish(
        &self,
        message: &Message,
        error: &WorkerError,
        retry_attempts_exhausted: u32,
    ) -> bool {
        let envelope = DlqEnvelope::new(
            message,
            error,
            &self.container_id,
            &self.source_queue_url,
            retry_attempts_exhausted,
        );

        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(serde_error) => {
                error!(
                    container_id = %self.container_id,
                    message_id = %message.message_id,
                    error = %serde_error,
                    "failed to serialize DLQ envelope, skipping publish"
                );
                self.metrics.record_dlq_operation(&self.container_id, false);
                return false;
            }
        };

        match self.client.send_message(&self.dlq_url, &payload).await {
            Ok(()) => {
                info!(
                    container_id = %self.container_id,
                    message_id = %message.message_id,
                    dlq_url = %self.dlq_url,
                    retry_attempts = retry_attempts_exhausted,
                    "published failure to DLQ"
                );
                self.metrics.record_dlq_operation(&self.container_id, true);
                true
            }
            Err(send_error) => {
                error!(
                    container_id = %self.container_id,
                    message_id = %message.message_id,
                    dlq_url = %self.dlq_url,
                    error = %send_error,
                    "failed to publish to DLQ"
                );
                self.metrics.record_dlq_operation(&self.container_id, false);
                false
            }
        }
    }
}
