use crate::{env_optional, ConfigError, FromEnv};

/// AWS connection settings for worker binaries
///
/// Region and credentials resolution is otherwise left to the AWS SDK's
/// default provider chain; this only carries the knobs a worker deployment
/// commonly overrides.
#[derive(Clone, Debug, Default)]
pub struct AwsConfig {
    /// Explicit region override (e.g. "eu-west-1"). None = SDK default chain.
    pub region: Option<String>,

    /// Custom endpoint URL, used to point at LocalStack in development.
    pub endpoint_url: Option<String>,
}

impl FromEnv for AwsConfig {
    /// Reads from environment variables:
    /// - AWS_REGION: optional region override
    /// - AWS_ENDPOINT_URL: optional endpoint override (LocalStack)
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            region: env_optional("AWS_REGION"),
            endpoint_url: env_optional("AWS_ENDPOINT_URL"),
        })
    }
}
