//! Router configuration

use crate::policy::RetryPolicy;
use crate::{CoreError, Result};
use rpc_api::address::combine_address;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default port of the RPC sockets
pub const DEFAULT_RPC_PORT: u16 = 9501;

/// Matchmaker backend selection
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum MatchmakerBackend {
    /// Process-local registry
    #[default]
    InMemory,
    /// Registry shared through a Consul KV store
    Consul {
        /// Base URL of the Consul HTTP API, e.g. `http://127.0.0.1:8500`
        url: String,
        /// Key prefix under which all registrations live
        #[serde(default = "default_key_prefix")]
        prefix: String,
        /// Timeout of a single HTTP request
        #[serde(
            default = "default_request_timeout",
            with = "duration_ms",
            rename = "request_timeout_ms"
        )]
        request_timeout: Duration,
    },
}

fn default_key_prefix() -> String {
    "rpc-matchmaker".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Configuration of the routing core
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Which matchmaker backend to build
    pub matchmaker: MatchmakerBackend,
    /// Port of the RPC sockets, also used to build the fallback host
    pub rpc_port: u16,
    /// Host returned by `get_single_host` when a target has no hosts
    pub fallback_host: Option<String>,
    /// Delegate broadcast delivery to the transport's pub/sub layer
    pub use_pub_sub: bool,
    /// Retry policy of host resolution
    pub retry: RetryPolicy,
    /// Interval between publisher connection refreshes
    #[serde(with = "duration_ms", rename = "connection_update_interval_ms")]
    pub connection_update_interval: Duration,
    /// Interval between target re-registrations
    #[serde(with = "duration_ms", rename = "target_update_interval_ms")]
    pub target_update_interval: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            matchmaker: MatchmakerBackend::default(),
            rpc_port: DEFAULT_RPC_PORT,
            fallback_host: None,
            use_pub_sub: true,
            retry: RetryPolicy::default(),
            connection_update_interval: Duration::from_secs(30),
            target_update_interval: Duration::from_secs(30),
        }
    }
}

impl RouterConfig {
    /// Parse a YAML document, filling absent fields with defaults
    pub fn from_yaml_str(data: &str) -> Result<Self> {
        let config: RouterConfig = serde_yaml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            CoreError::InvalidConfiguration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&data)
    }

    /// Host used when a target has nothing registered
    pub fn fallback_host(&self) -> String {
        self.fallback_host
            .clone()
            .unwrap_or_else(|| combine_address("localhost", self.rpc_port))
    }

    pub fn validate(&self) -> Result<()> {
        if self.connection_update_interval.is_zero() {
            return Err(CoreError::InvalidConfiguration(
                "connection_update_interval_ms must be positive".to_string(),
            ));
        }
        if self.target_update_interval.is_zero() {
            return Err(CoreError::InvalidConfiguration(
                "target_update_interval_ms must be positive".to_string(),
            ));
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(CoreError::InvalidConfiguration(format!(
                "retry multiplier must be at least 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if self.retry.max_attempts.is_none() && self.retry.max_elapsed.is_none() {
            return Err(CoreError::InvalidConfiguration(
                "retry needs max_attempts or max_elapsed_ms".to_string(),
            ));
        }
        if let MatchmakerBackend::Consul { url, .. } = &self.matchmaker {
            if url.is_empty() {
                return Err(CoreError::InvalidConfiguration(
                    "consul backend requires a url".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Durations as integer milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

pub(crate) mod opt_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
