//! Consul KV client used by the distributed matchmaker

use super::distributed::{KvStore, Versioned};
use crate::{CoreError, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the modify index of a single-key read
const CONSUL_INDEX_HEADER: &str = "X-Consul-Index";

/// KvStore backed by the Consul KV HTTP API.
///
/// Every request carries its own timeout, independent of the retry policy
/// the routing table applies on top of it.
pub struct ConsulKvStore {
    client: Client,
    base_url: String,
}

impl ConsulKvStore {
    /// Create a client for the Consul agent at `base_url`
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| CoreError::InvalidConfiguration(format!("consul client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// URL of a key in the KV API
    pub fn key_url(&self, key: &str) -> String {
        format!("{}/v1/kv/{}", self.base_url, key.trim_start_matches('/'))
    }

    fn unavailable(url: &str, error: impl std::fmt::Display) -> CoreError {
        warn!("Consul request to {} failed: {}", url, error);
        CoreError::RegistryUnavailable(format!("{}: {}", url, error))
    }
}

#[async_trait::async_trait]
impl KvStore for ConsulKvStore {
    fn name(&self) -> &'static str {
        "consul"
    }

    async fn get(&self, key: &str) -> Result<Option<Versioned>> {
        let url = self.key_url(key);
        let response = self
            .client
            .get(&url)
            .query(&[("raw", "")])
            .send()
            .await
            .map_err(|e| Self::unavailable(&url, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Consul key {} not found", key);
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::unavailable(&url, response.status()));
        }

        let version = response
            .headers()
            .get(CONSUL_INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| {
                CoreError::Internal(format!("{} missing {} header", url, CONSUL_INDEX_HEADER))
            })?;
        let value = response
            .text()
            .await
            .map_err(|e| Self::unavailable(&url, e))?;

        Ok(Some(Versioned { value, version }))
    }

    async fn compare_and_swap(&self, key: &str, value: &str, version: u64) -> Result<bool> {
        let url = self.key_url(key);
        let response = self
            .client
            .put(&url)
            .query(&[("cas", version)])
            .body(value.to_string())
            .send()
            .await
            .map_err(|e| Self::unavailable(&url, e))?;

        if !response.status().is_success() {
            return Err(Self::unavailable(&url, response.status()));
        }

        response
            .json::<bool>()
            .await
            .map_err(|e| Self::unavailable(&url, e))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let url = self.key_url(prefix);
        let response = self
            .client
            .delete(&url)
            .query(&[("recurse", "true")])
            .send()
            .await
            .map_err(|e| Self::unavailable(&url, e))?;

        if !response.status().is_success() {
            return Err(Self::unavailable(&url, response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchmaker::{DistributedMatchmaker, Matchmaker};
    use rpc_api::Target;

    #[test]
    fn test_key_url() {
        let store = ConsulKvStore::new("http://127.0.0.1:8500/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            store.key_url("rpc-matchmaker/targets/compute"),
            "http://127.0.0.1:8500/v1/kv/rpc-matchmaker/targets/compute"
        );
        assert_eq!(
            store.key_url("/rpc-matchmaker/publishers"),
            "http://127.0.0.1:8500/v1/kv/rpc-matchmaker/publishers"
        );
    }

    #[tokio::test]
    async fn test_unreachable_consul_is_registry_unavailable() {
        // Nothing listens on the discard port of the loopback interface
        let store = ConsulKvStore::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let mm = DistributedMatchmaker::new(store, "test", "localhost:9501");

        let result = mm.get_hosts(&Target::new("test_topic")).await;
        assert!(matches!(result, Err(CoreError::RegistryUnavailable(_))));

        let result = mm.register(&Target::new("test_topic"), "h1").await;
        assert!(matches!(result, Err(CoreError::RegistryUnavailable(_))));
    }
}
