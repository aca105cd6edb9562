//! `SqsClient` implementation over the AWS SDK.

use crate::client::SqsClient;
use crate::error::WorkerError;
use crate::message::Message;
use async_trait::async_trait;
use aws_sdk_sqs::error::SdkError;
use aws_sdk_sqs::types::DeleteMessageBatchRequestEntry;
use std::collections::HashMap;
use tracing::warn;

/// Production SQS client backed by `aws_sdk_sqs::Client`.
///
/// The binary owns SDK configuration (region, credentials, endpoint); this
/// wrapper only adapts the SDK surface to the framework contract.
#[derive(Clone)]
pub struct AwsSqsClient {
    inner: aws_sdk_sqs::Client,
}

impl AwsSqsClient {
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { inner: client }
    }

    pub fn inner(&self) -> &aws_sdk_sqs::Client {
        &self.inner
    }
}

#[async_trait]
impl SqsClient for AwsSqsClient {
    async fn get_queue_url(&self, queue_name: &str) -> Result<String, WorkerError> {
        let output = self
            .inner
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err)
                    if service_err.err().is_queue_does_not_exist() =>
                {
                    WorkerError::QueueNotFound(queue_name.to_string())
                }
                _ => WorkerError::Sqs(e.to_string()),
            })?;

        output
            .queue_url()
            .map(str::to_string)
            .ok_or_else(|| WorkerError::QueueNotFound(queue_name.to_string()))
    }

    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_seconds: i32,
    ) -> Result<Vec<Message>, WorkerError> {
        let output = self
            .inner
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_seconds)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| WorkerError::Sqs(e.to_string()))?;

        let mut messages = Vec::new();
        for sdk_message in output.messages.unwrap_or_default() {
            // A message without a receipt handle cannot be deleted; skip it
            // and let SQS redeliver.
            let (Some(message_id), Some(receipt_handle), Some(body)) = (
                sdk_message.message_id(),
                sdk_message.receipt_handle(),
                sdk_message.body(),
            ) else {
                warn!(queue_url = %queue_url, "received incomplete SQS message, skipping");
                continue;
            };

            let attributes: HashMap<String, String> = sdk_message
                .message_attributes()
                .map(|attrs| {
                    attrs
                        .iter()
                        .filter_map(|(key, value)| {
                            value.string_value().map(|v| (key.clone(), v.to_string()))
                        })
                        .collect()
                })
                .unwrap_or_default();

            messages.push(
                Message::new(message_id, receipt_handle, body).with_attributes(attributes),
            );
        }

        Ok(messages)
    }

    async fn delete_message(
        &self,
        queue_url: &str,
        receipt_handle: &str,
    ) -> Result<(), WorkerError> {
        self.inner
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| WorkerError::Sqs(e.to_string()))?;
        Ok(())
    }

    async fn delete_message_batch(
        &self,
        queue_url: &str,
        receipt_handles: &[String],
    ) -> Result<(), WorkerError> {
        if receipt_handles.is_empty() {
            return Ok(());
        }

        let mut entries = Vec::with_capacity(receipt_handles.len());
        for (index, receipt_handle) in receipt_handles.iter().enumerate() {
            let entry = DeleteMessageBatchRequestEntry::builder()
                .id(index.to_string())
                .receipt_handle(receipt_handle)
                .build()
                .map_err(|e| WorkerError::Sqs(e.to_string()))?;
            entries.push(entry);
        }

        let output = self
            .inner
            .delete_message_batch()
            .queue_url(queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| WorkerError::Sqs(e.to_string()))?;

        let failed = output.failed();
        if !failed.is_empty() {
            return Err(WorkerError::Sqs(format!(
                "{} of {} batch deletes failed",
                failed.len(),
                receipt_handles.len()
            )));
        }

        Ok(())
    }

    async fn send_message(&self, queue_url: &str, body: &str) -> Result<(), WorkerError> {
        self.inner
            .send_message()
            .queue_url(queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| WorkerError::Sqs(e.to_string()))?;
        Ok(())
    }
}
