//! Matchmaker: the registry mapping targets to host addresses
//!
//! Two backends implement the same contract:
//! - [`InMemoryMatchmaker`] keeps registrations in process memory
//! - [`DistributedMatchmaker`] shares them across processes through a [`KvStore`]

mod consul;
mod distributed;
mod memory;

pub use consul::ConsulKvStore;
pub use distributed::{DistributedMatchmaker, KvStore, Versioned};
pub use memory::InMemoryMatchmaker;

use crate::config::{MatchmakerBackend, RouterConfig};
use crate::Result;
use rand::seq::SliceRandom;
use rpc_api::Target;
use std::sync::Arc;
use tracing::{debug, info};

/// A publisher endpoint: (publisher address, router address)
pub type PublisherEndpoint = (String, String);

/// Registry of target to host mappings
#[async_trait::async_trait]
pub trait Matchmaker: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Host returned by `get_single_host` when nothing is registered
    fn fallback_host(&self) -> &str;

    /// Add `host` to the target's hosts if it is not there yet
    async fn register(&self, target: &Target, host: &str) -> Result<()>;

    /// Remove `host` from the target's hosts, no-op if absent
    async fn unregister(&self, target: &Target, host: &str) -> Result<()>;

    /// All hosts registered for the target, in registration order
    async fn get_hosts(&self, target: &Target) -> Result<Vec<String>>;

    /// Add a publisher endpoint if it is not there yet
    async fn register_publisher(&self, endpoint: &PublisherEndpoint) -> Result<()>;

    /// Remove a publisher endpoint, no-op if absent
    async fn unregister_publisher(&self, endpoint: &PublisherEndpoint) -> Result<()>;

    /// Snapshot of all registered publisher endpoints
    async fn get_publishers(&self) -> Result<Vec<PublisherEndpoint>>;

    /// One of the target's hosts, or the fallback host when there is none.
    ///
    /// Callers that must not be handed the fallback check `get_hosts` first.
    async fn get_single_host(&self, target: &Target) -> Result<String> {
        let hosts = self.get_hosts(target).await?;
        let picked = hosts.choose(&mut rand::thread_rng()).cloned();
        match picked {
            Some(host) => Ok(host),
            None => {
                debug!(target = %target, fallback = self.fallback_host(), "No hosts registered, using fallback");
                Ok(self.fallback_host().to_string())
            }
        }
    }
}

/// Build the matchmaker backend selected by the configuration
pub fn from_config(config: &RouterConfig) -> Result<Arc<dyn Matchmaker>> {
    config.validate()?;
    let matchmaker: Arc<dyn Matchmaker> = match &config.matchmaker {
        MatchmakerBackend::InMemory => Arc::new(InMemoryMatchmaker::new(config.fallback_host())),
        MatchmakerBackend::Consul {
            url,
            prefix,
            request_timeout,
        } => {
            let store = ConsulKvStore::new(url, *request_timeout)?;
            Arc::new(DistributedMatchmaker::new(
                store,
                prefix.clone(),
                config.fallback_host(),
            ))
        }
    };
    info!(backend = matchmaker.name(), "Matchmaker initialized");
    Ok(matchmaker)
}
