//! Process-local matchmaker

use super::{Matchmaker, PublisherEndpoint};
use crate::Result;
use rpc_api::Target;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// InMemoryMatchmaker keeps registrations in a process-local map.
///
/// Suitable for single-process topologies and tests.
pub struct InMemoryMatchmaker {
    // Map of canonical target key to hosts in registration order
    routes: Arc<RwLock<HashMap<String, Vec<String>>>>,
    publishers: Arc<RwLock<Vec<PublisherEndpoint>>>,
    fallback_host: String,
}

impl InMemoryMatchmaker {
    pub fn new(fallback_host: impl Into<String>) -> Self {
        Self {
            routes: Arc::new(RwLock::new(HashMap::new())),
            publishers: Arc::new(RwLock::new(Vec::new())),
            fallback_host: fallback_host.into(),
        }
    }

    /// Number of targets with at least one host
    pub async fn target_count(&self) -> usize {
        self.routes.read().await.len()
    }
}

#[async_trait::async_trait]
impl Matchmaker for InMemoryMatchmaker {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    fn fallback_host(&self) -> &str {
        &self.fallback_host
    }

    async fn register(&self, target: &Target, host: &str) -> Result<()> {
        target.validate()?;
        let key = target.key();

        let mut routes = self.routes.write().await;
        let hosts = routes.entry(key.clone()).or_default();
        if !hosts.iter().any(|h| h == host) {
            hosts.push(host.to_string());
            debug!(target = %key, host, "Registered host");
        }
        Ok(())
    }

    async fn unregister(&self, target: &Target, host: &str) -> Result<()> {
        let key = target.key();

        let mut routes = self.routes.write().await;
        if let Some(hosts) = routes.get_mut(&key) {
            hosts.retain(|h| h != host);
            if hosts.is_empty() {
                routes.remove(&key);
            }
            debug!(target = %key, host, "Unregistered host");
        }
        Ok(())
    }

    async fn get_hosts(&self, target: &Target) -> Result<Vec<String>> {
        let routes = self.routes.read().await;
        Ok(routes.get(&target.key()).cloned().unwrap_or_default())
    }

    async fn register_publisher(&self, endpoint: &PublisherEndpoint) -> Result<()> {
        let mut publishers = self.publishers.write().await;
        if !publishers.contains(endpoint) {
            publishers.push(endpoint.clone());
            debug!(publisher = %endpoint.0, router = %endpoint.1, "Registered publisher");
        }
        Ok(())
    }

    async fn unregister_publisher(&self, endpoint: &PublisherEndpoint) -> Result<()> {
        let mut publishers = self.publishers.write().await;
        publishers.retain(|p| p != endpoint);
        Ok(())
    }

    async fn get_publishers(&self) -> Result<Vec<PublisherEndpoint>> {
        Ok(self.publishers.read().await.clone())
    }
}
