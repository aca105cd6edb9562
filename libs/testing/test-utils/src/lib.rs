//! Shared test utilities for worker testing
//!
//! This crate provides reusable test infrastructure:
//! - `InMemorySqsClient`: a full in-memory `SqsClient` with queue creation,
//!   long-poll emulation, delete tracking, and failure injection
//! - `TestDataBuilder`: deterministic test data generation
//! - `assertions`: custom assertion helpers
//!
//! # Usage
//!
//! ```rust,ignore
//! use test_utils::{InMemorySqsClient, TestDataBuilder};
//!
//! #[tokio::test]
//! async fn my_listener_test() {
//!     let client = Arc::new(InMemorySqsClient::new());
//!     let queue_url = client.create_queue("orders");
//!     let builder = TestDataBuilder::from_test_name("my_listener_test");
//!
//!     client.enqueue_body(&queue_url, &builder.message_id(0), &builder.body(0));
//!     // drive the container against `client` ...
//! }
//! ```

mod sqs;

pub use sqs::InMemorySqsClient;

/// Builder for test data with deterministic randomization
///
/// This ensures tests are reproducible by using seeded data.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Deterministic message id for the n-th message of this test
    pub fn message_id(&self, n: usize) -> String {
        format!("m-{}-{}", self.seed, n)
    }

    /// Deterministic JSON body for the n-th message of this test
    pub fn body(&self, n: usize) -> String {
        format!("{{\"seq\":{},\"seed\":{}}}", n, self.seed)
    }

    /// Generate a unique name for testing
    ///
    /// # Arguments
    ///
    /// * `prefix` - The type of resource (e.g., "queue", "listener")
    /// * `suffix` - A unique identifier within the test (e.g., "main", "dlq")
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }
}

/// Test assertion helpers
pub mod assertions {
    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }

    /// Assert that a JSON payload has a string field with the given value.
    ///
    /// Panics with the offending payload, which makes DLQ envelope tests
    /// readable when they fail.
    pub fn assert_json_str_field(payload: &str, field: &str, expected: &str) {
        let value: serde_json::Value = serde_json::from_str(payload)
            .unwrap_or_else(|e| panic!("payload is not valid JSON ({e}): {payload}"));
        let actual = value
            .get(field)
            .and_then(|v| v.as_str())
            .unwrap_or_else(|| panic!("missing string field '{field}' in: {payload}"));
        assert_eq!(actual, expected, "field '{field}' mismatch in: {payload}");
    }
}
