//! The message type handed to user handlers.

use std::collections::HashMap;

/// A single message received from SQS.
///
/// Immutable once constructed: the container never mutates a message after it
/// leaves the poller. The receipt handle is the opaque token required to
/// delete the message from the queue; it is only valid while the message is
/// within its visibility timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// SQS-assigned message id.
    pub message_id: String,

    /// Opaque token required to delete this delivery.
    pub receipt_handle: String,

    /// Raw message body.
    pub body: String,

    /// String message attributes.
    pub attributes: HashMap<String, String>,
}

impl Message {
    pub fn new(
        message_id: impl Into<String>,
        receipt_handle: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            receipt_handle: receipt_handle.into(),
            body: body.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }
}
