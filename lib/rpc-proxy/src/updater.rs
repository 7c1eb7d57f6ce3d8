//! Background tasks keeping the matchmaker and the transport in sync
//!
//! An [`Updater`] runs an [`UpdateTask`] once right away and then on a fixed
//! interval until stopped. Two tasks are provided:
//! - [`ConnectionUpdater`] connects the transport to every registered publisher
//! - [`TargetUpdater`] keeps this process's own registrations alive

use crate::transport::Connection;
use rpc_api::Target;
use rpc_core::{CoreError, Matchmaker, PublisherEndpoint, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of an updater
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdaterState {
    Running,
    Stopped,
}

/// One unit of periodic work
#[async_trait::async_trait]
pub trait UpdateTask: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Run one update; a failure is logged and retried on the next tick
    async fn update(&self) -> Result<()>;
}

/// Periodic runner of an [`UpdateTask`] with an explicit stop handshake
pub struct Updater {
    name: &'static str,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Updater {
    /// Spawn the update loop on the current Tokio runtime.
    ///
    /// The first update runs immediately. A zero interval is raised to one
    /// millisecond.
    pub fn start(task: Arc<dyn UpdateTask>, interval: Duration) -> Self {
        let name = task.name();
        let cancel = CancellationToken::new();
        let interval = interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(run_update_loop(task, interval, cancel.clone()));

        Self {
            name,
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> UpdaterState {
        if self.cancel.is_cancelled() {
            UpdaterState::Stopped
        } else {
            UpdaterState::Running
        }
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// An update in flight completes first; none starts after this returns.
    /// Concurrent callers all wait for the loop to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let mut handle = self.handle.lock().await;
        if let Some(handle) = handle.take() {
            if let Err(e) = handle.await {
                error!(updater = self.name, error = %e, "Updater task failed");
            }
        }
    }
}

impl Drop for Updater {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_update_loop(task: Arc<dyn UpdateTask>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        updater = task.name(),
        interval_ms = interval.as_millis() as u64,
        "Updater started"
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(updater = task.name(), "Updater stopped");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = task.update().await {
                    warn!(updater = task.name(), error = %e, "Update failed, retrying on next tick");
                }
            }
        }
    }
}

/// Connects the transport to the router address of every registered publisher
pub struct PublisherConnectionTask {
    matchmaker: Arc<dyn Matchmaker>,
    connection: Arc<dyn Connection>,
}

impl PublisherConnectionTask {
    pub fn new(matchmaker: Arc<dyn Matchmaker>, connection: Arc<dyn Connection>) -> Self {
        Self {
            matchmaker,
            connection,
        }
    }
}

#[async_trait::async_trait]
impl UpdateTask for PublisherConnectionTask {
    fn name(&self) -> &'static str {
        "publisher-connection"
    }

    async fn update(&self) -> Result<()> {
        let publishers = self.matchmaker.get_publishers().await?;

        for (publisher_address, router_address) in &publishers {
            if let Err(e) = self.connection.connect_to_host(router_address).await {
                warn!(
                    publisher = %publisher_address,
                    router = %router_address,
                    error = %e,
                    "Failed to connect to publisher"
                );
            }
        }

        debug!(publishers = publishers.len(), "Publisher connections refreshed");
        Ok(())
    }
}

/// Keeps a connection attached to every publisher known to the matchmaker
pub struct ConnectionUpdater {
    updater: Updater,
}

impl ConnectionUpdater {
    pub fn start(
        matchmaker: Arc<dyn Matchmaker>,
        connection: Arc<dyn Connection>,
        interval: Duration,
    ) -> Self {
        let task = Arc::new(PublisherConnectionTask::new(matchmaker, connection));
        Self {
            updater: Updater::start(task, interval),
        }
    }

    pub fn state(&self) -> UpdaterState {
        self.updater.state()
    }

    pub async fn stop(&self) {
        self.updater.stop().await;
    }
}

/// Re-registers this process's targets and publisher endpoint
pub struct TargetRegistrationTask {
    matchmaker: Arc<dyn Matchmaker>,
    registrations: Vec<(Target, String)>,
    publisher: Option<PublisherEndpoint>,
}

impl TargetRegistrationTask {
    pub fn new(
        matchmaker: Arc<dyn Matchmaker>,
        registrations: Vec<(Target, String)>,
        publisher: Option<PublisherEndpoint>,
    ) -> Self {
        Self {
            matchmaker,
            registrations,
            publisher,
        }
    }

    /// Remove everything this task registers
    pub async fn unregister_all(&self) -> Result<()> {
        let mut first_error = None;

        for (target, host) in &self.registrations {
            if let Err(e) = self.matchmaker.unregister(target, host).await {
                warn!(target = %target, host = %host, error = %e, "Failed to unregister host");
                first_error.get_or_insert(e);
            }
        }
        if let Some(publisher) = &self.publisher {
            if let Err(e) = self.matchmaker.unregister_publisher(publisher).await {
                warn!(publisher = %publisher.0, error = %e, "Failed to unregister publisher");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

#[async_trait::async_trait]
impl UpdateTask for TargetRegistrationTask {
    fn name(&self) -> &'static str {
        "target-registration"
    }

    async fn update(&self) -> Result<()> {
        let mut first_error: Option<CoreError> = None;

        for (target, host) in &self.registrations {
            if let Err(e) = self.matchmaker.register(target, host).await {
                warn!(target = %target, host = %host, error = %e, "Failed to register host");
                first_error.get_or_insert(e);
            }
        }
        if let Some(publisher) = &self.publisher {
            if let Err(e) = self.matchmaker.register_publisher(publisher).await {
                warn!(publisher = %publisher.0, error = %e, "Failed to register publisher");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!(targets = self.registrations.len(), "Registrations refreshed");
                Ok(())
            }
        }
    }
}

/// Keeps this process's registrations alive in the matchmaker
pub struct TargetUpdater {
    updater: Updater,
    task: Arc<TargetRegistrationTask>,
}

impl TargetUpdater {
    pub fn start(
        matchmaker: Arc<dyn Matchmaker>,
        registrations: Vec<(Target, String)>,
        publisher: Option<PublisherEndpoint>,
        interval: Duration,
    ) -> Self {
        let task = Arc::new(TargetRegistrationTask::new(
            matchmaker,
            registrations,
            publisher,
        ));
        Self {
            updater: Updater::start(task.clone(), interval),
            task,
        }
    }

    pub fn state(&self) -> UpdaterState {
        self.updater.state()
    }

    pub async fn stop(&self) {
        self.updater.stop().await;
    }

    /// Stop refreshing and withdraw every registration
    pub async fn shutdown(&self) -> Result<()> {
        self.stop().await;
        self.task.unregister_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingMatchmaker, RecordingConnection};
    use std::sync::atomic::Ordering;

    fn endpoint(name: &str) -> PublisherEndpoint {
        (format!("tcp://{}:9502", name), format!("tcp://{}:9503", name))
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_updater_connects_immediately() {
        let mm = Arc::new(CountingMatchmaker::new());
        mm.register_publisher(&endpoint("a")).await.unwrap();
        mm.register_publisher(&endpoint("b")).await.unwrap();
        let connection = Arc::new(RecordingConnection::default());

        let updater = ConnectionUpdater::start(mm.clone(), connection.clone(), Duration::from_secs(10));
        assert_eq!(updater.state(), UpdaterState::Running);
        time::sleep(Duration::from_millis(1)).await;

        assert_eq!(mm.queries(), 1);
        assert_eq!(
            connection.connected_hosts(),
            vec!["tcp://a:9503", "tcp://b:9503"]
        );

        updater.stop().await;
        assert_eq!(updater.state(), UpdaterState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_updater_picks_up_new_publishers() {
        let mm = Arc::new(CountingMatchmaker::new());
        mm.register_publisher(&endpoint("a")).await.unwrap();
        let connection = Arc::new(RecordingConnection::default());

        let updater = ConnectionUpdater::start(mm.clone(), connection.clone(), Duration::from_secs(10));
        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(connection.connected_hosts(), vec!["tcp://a:9503"]);

        mm.register_publisher(&endpoint("b")).await.unwrap();
        time::sleep(Duration::from_secs(10)).await;
        time::sleep(Duration::from_millis(1)).await;

        assert_eq!(mm.queries(), 2);
        assert_eq!(
            connection.connected_hosts(),
            vec!["tcp://a:9503", "tcp://b:9503"]
        );
        updater.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_updater_survives_unavailable_registry() {
        let mm = Arc::new(CountingMatchmaker::new());
        mm.register_publisher(&endpoint("a")).await.unwrap();
        mm.unavailable.store(true, Ordering::SeqCst);
        let connection = Arc::new(RecordingConnection::default());

        let updater = ConnectionUpdater::start(mm.clone(), connection.clone(), Duration::from_secs(1));
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(mm.queries(), 2);
        assert!(connection.connected_hosts().is_empty());
        assert_eq!(updater.state(), UpdaterState::Running);

        mm.unavailable.store(false, Ordering::SeqCst);
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(connection.connected_hosts(), vec!["tcp://a:9503"]);
        updater.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_does_not_skip_other_publishers() {
        let mm = Arc::new(CountingMatchmaker::new());
        mm.register_publisher(&endpoint("a")).await.unwrap();
        mm.register_publisher(&endpoint("b")).await.unwrap();
        let connection = Arc::new(RecordingConnection::default());
        connection
            .refuse
            .lock()
            .unwrap()
            .insert("tcp://a:9503".to_string());

        let updater = ConnectionUpdater::start(mm.clone(), connection.clone(), Duration::from_secs(10));
        time::sleep(Duration::from_millis(1)).await;

        assert_eq!(connection.attempts(), 2);
        assert_eq!(connection.connected_hosts(), vec!["tcp://b:9503"]);
        updater.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_update_after_stop() {
        let mm = Arc::new(CountingMatchmaker::new());
        mm.register_publisher(&endpoint("a")).await.unwrap();
        let connection = Arc::new(RecordingConnection::default());

        let updater = ConnectionUpdater::start(mm.clone(), connection.clone(), Duration::from_millis(10));
        time::sleep(Duration::from_millis(35)).await;
        updater.stop().await;

        let queries = mm.queries();
        let attempts = connection.attempts();
        assert!(queries >= 3);

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(mm.queries(), queries);
        assert_eq!(connection.attempts(), attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_update_in_flight() {
        let mm = Arc::new(CountingMatchmaker {
            query_delay: Duration::from_millis(50),
            ..CountingMatchmaker::new()
        });
        mm.register_publisher(&endpoint("a")).await.unwrap();
        let connection = Arc::new(RecordingConnection::default());

        let updater = ConnectionUpdater::start(mm.clone(), connection.clone(), Duration::from_millis(10));
        // The first update is now blocked inside get_publishers
        time::sleep(Duration::from_millis(5)).await;
        assert_eq!(mm.queries(), 1);
        assert_eq!(connection.attempts(), 0);

        updater.stop().await;
        assert_eq!(connection.attempts(), 1);

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(mm.queries(), 1);
        assert_eq!(connection.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_stop() {
        let mm = Arc::new(CountingMatchmaker::new());
        let connection = Arc::new(RecordingConnection::default());
        let updater = Arc::new(ConnectionUpdater::start(
            mm.clone(),
            connection,
            Duration::from_millis(10),
        ));
        time::sleep(Duration::from_millis(15)).await;

        let a = {
            let updater = updater.clone();
            tokio::spawn(async move { updater.stop().await })
        };
        let b = {
            let updater = updater.clone();
            tokio::spawn(async move { updater.stop().await })
        };
        a.await.unwrap();
        b.await.unwrap();

        let queries = mm.queries();
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(mm.queries(), queries);
        updater.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_updater_registers_and_shuts_down() {
        let mm = Arc::new(CountingMatchmaker::new());
        let target = Target::new("compute").with_server("node-1");
        let publisher = endpoint("node-1");

        let updater = TargetUpdater::start(
            mm.clone(),
            vec![
                (target.clone(), "node-1:9501".to_string()),
                (Target::new("compute"), "node-1:9501".to_string()),
            ],
            Some(publisher.clone()),
            Duration::from_secs(5),
        );
        time::sleep(Duration::from_millis(1)).await;

        assert_eq!(mm.get_hosts(&target).await.unwrap(), vec!["node-1:9501"]);
        assert_eq!(
            mm.get_hosts(&Target::new("compute")).await.unwrap(),
            vec!["node-1:9501"]
        );
        assert_eq!(mm.get_publishers().await.unwrap(), vec![publisher]);

        updater.shutdown().await.unwrap();
        assert_eq!(updater.state(), UpdaterState::Stopped);
        assert!(mm.get_hosts(&target).await.unwrap().is_empty());
        assert!(mm.get_publishers().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_updater_restores_lost_registrations() {
        let mm = Arc::new(CountingMatchmaker::new());
        let target = Target::new("compute");
        mm.unavailable.store(true, Ordering::SeqCst);

        let updater = TargetUpdater::start(
            mm.clone(),
            vec![(target.clone(), "node-1:9501".to_string())],
            None,
            Duration::from_secs(5),
        );
        time::sleep(Duration::from_millis(1)).await;
        assert!(mm.inner.get_hosts(&target).await.unwrap().is_empty());

        mm.unavailable.store(false, Ordering::SeqCst);
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(mm.get_hosts(&target).await.unwrap(), vec!["node-1:9501"]);
        updater.stop().await;
    }
}
