//! Fakes of the transport and matchmaker shared by the unit tests

use crate::transport::{Connection, RequestSender};
use rpc_api::{Request, Target};
use rpc_core::matchmaker::InMemoryMatchmaker;
use rpc_core::{CoreError, Matchmaker, PublisherEndpoint, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Connection recording connect attempts
#[derive(Default)]
pub struct RecordingConnection {
    pub connected: Mutex<HashSet<String>>,
    pub connect_attempts: AtomicUsize,
    pub refuse: Mutex<HashSet<String>>,
    pub closed: AtomicBool,
    pub close_calls: AtomicUsize,
}

impl RecordingConnection {
    pub fn connected_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<_> = self.connected.lock().unwrap().iter().cloned().collect();
        hosts.sort();
        hosts
    }

    pub fn attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connection for RecordingConnection {
    async fn connect_to_host(&self, address: &str) -> anyhow::Result<()> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() {
            anyhow::bail!("connection is closed");
        }
        if self.refuse.lock().unwrap().contains(address) {
            anyhow::bail!("connection to {} refused", address);
        }
        self.connected.lock().unwrap().insert(address.to_string());
        Ok(())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Sender recording every request it is handed
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<Request>>,
}

impl RecordingSender {
    pub fn routing_keys(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.routing_key.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl RequestSender for RecordingSender {
    async fn send(&self, _connection: &dyn Connection, request: &Request) {
        self.sent.lock().unwrap().push(request.clone());
    }
}

/// In-memory matchmaker counting queries, optionally slow or unavailable
pub struct CountingMatchmaker {
    pub inner: InMemoryMatchmaker,
    pub host_queries: AtomicU32,
    pub publisher_queries: AtomicU32,
    pub unavailable: AtomicBool,
    pub query_delay: Duration,
}

impl CountingMatchmaker {
    pub fn new() -> Self {
        Self {
            inner: InMemoryMatchmaker::new("localhost:9501"),
            host_queries: AtomicU32::new(0),
            publisher_queries: AtomicU32::new(0),
            unavailable: AtomicBool::new(false),
            query_delay: Duration::ZERO,
        }
    }

    /// Number of publisher queries so far
    pub fn queries(&self) -> u32 {
        self.publisher_queries.load(Ordering::SeqCst)
    }

    /// Number of host resolutions so far
    pub fn resolutions(&self) -> u32 {
        self.host_queries.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoreError::RegistryUnavailable("down".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Matchmaker for CountingMatchmaker {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn fallback_host(&self) -> &str {
        self.inner.fallback_host()
    }

    async fn register(&self, target: &Target, host: &str) -> Result<()> {
        self.check_available()?;
        self.inner.register(target, host).await
    }

    async fn unregister(&self, target: &Target, host: &str) -> Result<()> {
        self.check_available()?;
        self.inner.unregister(target, host).await
    }

    async fn get_hosts(&self, target: &Target) -> Result<Vec<String>> {
        self.host_queries.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.inner.get_hosts(target).await
    }

    async fn register_publisher(&self, endpoint: &PublisherEndpoint) -> Result<()> {
        self.check_available()?;
        self.inner.register_publisher(endpoint).await
    }

    async fn unregister_publisher(&self, endpoint: &PublisherEndpoint) -> Result<()> {
        self.check_available()?;
        self.inner.unregister_publisher(endpoint).await
    }

    async fn get_publishers(&self) -> Result<Vec<PublisherEndpoint>> {
        self.publisher_queries.fetch_add(1, Ordering::SeqCst);
        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }
        self.check_available()?;
        self.inner.get_publishers().await
    }
}
