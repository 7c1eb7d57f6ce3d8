use rpc_api::TargetError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid target: {0}")]
    InvalidTarget(#[from] TargetError),

    #[error("Matchmaker registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("No hosts for target {target} after {attempts} attempts in {elapsed:?}")]
    RetryExhausted {
        target: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the routing table may retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::RegistryUnavailable(_))
    }
}
