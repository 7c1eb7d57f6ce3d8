//! Matchmaker shared across processes through a key-value store

use super::{Matchmaker, PublisherEndpoint};
use crate::{CoreError, Result};
use rpc_api::Target;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

/// Bound on read-modify-write rounds lost to concurrent writers
const MAX_CAS_ATTEMPTS: u32 = 16;

/// A value read from the store with its modification version
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned {
    pub value: String,
    pub version: u64,
}

/// Minimal key-value contract the distributed matchmaker needs.
///
/// Unreachable stores must fail with [`CoreError::RegistryUnavailable`].
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Read a key, `None` if it does not exist
    async fn get(&self, key: &str) -> Result<Option<Versioned>>;

    /// Write `value` only if the key is still at `version`.
    ///
    /// Version 0 means the key must not exist yet. Returns whether the write
    /// was applied.
    async fn compare_and_swap(&self, key: &str, value: &str, version: u64) -> Result<bool>;

    /// Delete every key under `prefix`
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;
}

/// DistributedMatchmaker stores each target's hosts as one JSON array under
/// `<prefix>/targets/<target key>` and the publisher endpoints under
/// `<prefix>/publishers`, updating both with compare-and-swap.
pub struct DistributedMatchmaker<S> {
    store: S,
    prefix: String,
    fallback_host: String,
}

impl<S: KvStore> DistributedMatchmaker<S> {
    pub fn new(store: S, prefix: impl Into<String>, fallback_host: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_end_matches('/').to_string(),
            fallback_host: fallback_host.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn target_key(&self, target: &Target) -> String {
        format!("{}/targets/{}", self.prefix, target.key())
    }

    fn publishers_key(&self) -> String {
        format!("{}/publishers", self.prefix)
    }

    /// Remove every registration under the prefix.
    ///
    /// Only keys below `<prefix>/` are deleted; sibling prefixes such as
    /// `<prefix>-other` belong to other deployments.
    pub async fn flush(&self) -> Result<()> {
        self.store.delete_prefix(&format!("{}/", self.prefix)).await?;
        info!(prefix = %self.prefix, "Flushed matchmaker registrations");
        Ok(())
    }

    async fn read_list<T: DeserializeOwned>(&self, key: &str) -> Result<(Vec<T>, u64)> {
        match self.store.get(key).await? {
            Some(entry) if entry.value.trim().is_empty() => Ok((Vec::new(), entry.version)),
            Some(entry) => Ok((serde_json::from_str(&entry.value)?, entry.version)),
            None => Ok((Vec::new(), 0)),
        }
    }

    /// Apply `mutate` to the list stored at `key`; `mutate` returns whether it changed anything
    async fn update_list<T, F>(&self, key: &str, mutate: F) -> Result<()>
    where
        T: Serialize + DeserializeOwned + Send,
        F: Fn(&mut Vec<T>) -> bool + Send + Sync,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let (mut list, version) = self.read_list::<T>(key).await?;
            if !mutate(&mut list) {
                return Ok(());
            }

            let value = serde_json::to_string(&list)?;
            if self.store.compare_and_swap(key, &value, version).await? {
                return Ok(());
            }
            debug!(key, attempt, "Concurrent update of registry key, retrying");
        }

        Err(CoreError::Internal(format!(
            "gave up updating {} after {} conflicting writes",
            key, MAX_CAS_ATTEMPTS
        )))
    }
}

#[async_trait::async_trait]
impl<S: KvStore> Matchmaker for DistributedMatchmaker<S> {
    fn name(&self) -> &'static str {
        self.store.name()
    }

    fn fallback_host(&self) -> &str {
        &self.fallback_host
    }

    async fn register(&self, target: &Target, host: &str) -> Result<()> {
        target.validate()?;
        let key = self.target_key(target);
        self.update_list::<String, _>(&key, |hosts| {
            if hosts.iter().any(|h| h == host) {
                return false;
            }
            hosts.push(host.to_string());
            true
        })
        .await?;
        debug!(key = %key, host, "Registered host");
        Ok(())
    }

    async fn unregister(&self, target: &Target, host: &str) -> Result<()> {
        let key = self.target_key(target);
        self.update_list::<String, _>(&key, |hosts| {
            let before = hosts.len();
            hosts.retain(|h| h != host);
            hosts.len() != before
        })
        .await?;
        debug!(key = %key, host, "Unregistered host");
        Ok(())
    }

    async fn get_hosts(&self, target: &Target) -> Result<Vec<String>> {
        let (hosts, _) = self.read_list(&self.target_key(target)).await?;
        Ok(hosts)
    }

    async fn register_publisher(&self, endpoint: &PublisherEndpoint) -> Result<()> {
        self.update_list::<PublisherEndpoint, _>(&self.publishers_key(), |publishers| {
            if publishers.contains(endpoint) {
                return false;
            }
            publishers.push(endpoint.clone());
            true
        })
        .await
    }

    async fn unregister_publisher(&self, endpoint: &PublisherEndpoint) -> Result<()> {
        self.update_list::<PublisherEndpoint, _>(&self.publishers_key(), |publishers| {
            let before = publishers.len();
            publishers.retain(|p| p != endpoint);
            publishers.len() != before
        })
        .await
    }

    async fn get_publishers(&self) -> Result<Vec<PublisherEndpoint>> {
        let (publishers, _) = self.read_list(&self.publishers_key()).await?;
        Ok(publishers)
    }
}
