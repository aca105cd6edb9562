//! Error types for the listener framework.
//!
//! `WorkerError` is the single error enum used across the crate: SQS client
//! implementations, handlers, and the container lifecycle all speak it.

use thiserror::Error;

/// Errors that can occur while consuming from SQS.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// SQS client or transport error.
    #[error("SQS error: {0}")]
    Sqs(String),

    /// A queue name could not be resolved to a URL.
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    /// Listener configuration rejected at container start.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failure raised by a user message handler.
    #[error("handler error: {0}")]
    Handler(String),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Container lifecycle error (start/stop/dispatch).
    #[error("container error: {0}")]
    Container(String),

    /// Executor construction or shutdown error.
    #[error("executor error: {0}")]
    Executor(String),

    /// Operation exceeded its deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),
}

impl WorkerError {
    /// Stable tag for this error kind, used as the DLQ envelope `error_type`
    /// and as a metrics label.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Sqs(_) => "sqs",
            Self::QueueNotFound(_) => "queue_not_found",
            Self::Config(_) => "config",
            Self::Handler(_) => "handler",
            Self::Serialization(_) => "serialization",
            Self::Container(_) => "container",
            Self::Executor(_) => "executor",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Convenience constructor for handler failures.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkerError::Handler("payment declined".to_string());
        assert_eq!(err.to_string(), "handler error: payment declined");

        let err = WorkerError::QueueNotFound("orders".to_string());
        assert_eq!(err.to_string(), "queue not found: orders");
    }

    #[test]
    fn test_error_type_tags() {
        assert_eq!(WorkerError::Sqs("x".into()).error_type(), "sqs");
        assert_eq!(WorkerError::handler("x").error_type(), "handler");
        assert_eq!(WorkerError::Config("x".into()).error_type(), "config");
        assert_eq!(WorkerError::Timeout("x".into()).error_type(), "timeout");
    }

    #[test]
    fn test_serde_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: WorkerError = json_err.into();
        assert_eq!(err.error_type(), "serialization");
    }
}
