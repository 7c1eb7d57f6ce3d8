//! Publishers sending requests through the proxy
//!
//! Two strategies share the [`Publisher`] contract:
//! - [`ProxyPublisher`] handles every pattern except CALL
//! - [`CallProxyPublisher`] handles CALL only
//!
//! Both resolve routing keys through the [`RoutingTable`], set them on the
//! request and hand it to the [`RequestSender`] once per key.

use crate::error::{PublisherError, Result};
use crate::metrics::PublisherMetrics;
use crate::transport::{Connection, RequestSender};
use crate::updater::ConnectionUpdater;
use rpc_api::{MessageType, Request};
use rpc_core::{CoreError, RouterConfig, RoutingTable};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Send path of one delivery strategy
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Route and send a request, returning how many copies were handed to the transport
    async fn send_request(&self, request: &mut Request) -> Result<usize>;

    /// Stop background work and release the connection
    async fn cleanup(&self);
}

/// Connection, sender and background updater owned by a proxy publisher
struct ProxyChannel {
    routing_table: Arc<RoutingTable>,
    connection: Arc<dyn Connection>,
    sender: Arc<dyn RequestSender>,
    connection_updater: ConnectionUpdater,
    metrics: Option<Arc<PublisherMetrics>>,
    closed: AtomicBool,
}

impl ProxyChannel {
    fn new(
        routing_table: Arc<RoutingTable>,
        connection: Arc<dyn Connection>,
        sender: Arc<dyn RequestSender>,
        update_interval: Duration,
    ) -> Self {
        let connection_updater = ConnectionUpdater::start(
            routing_table.matchmaker().clone(),
            connection.clone(),
            update_interval,
        );
        Self {
            routing_table,
            connection,
            sender,
            connection_updater,
            metrics: None,
            closed: AtomicBool::new(false),
        }
    }

    async fn dispatch(&self, request: &mut Request, routing_keys: Vec<String>) -> usize {
        let count = routing_keys.len();
        for routing_key in routing_keys {
            request.routing_key = Some(routing_key);
            self.sender.send(self.connection.as_ref(), request).await;
        }

        if let Some(metrics) = &self.metrics {
            metrics.sent(request.msg_type, count);
        }
        count
    }

    fn reject(&self, request: &Request) -> PublisherError {
        if let Some(metrics) = &self.metrics {
            metrics.rejected(request.msg_type);
        }
        PublisherError::UnsupportedPattern(request.msg_type)
    }

    /// Updater first, so no refresh runs against a closed connection
    async fn cleanup(&self) {
        self.connection_updater.stop().await;
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.connection.close().await;
        }
    }
}

/// Non-CALL publisher via proxy
pub struct ProxyPublisher {
    channel: ProxyChannel,
    use_pub_sub: bool,
}

impl ProxyPublisher {
    /// Create the publisher and start refreshing its publisher connections.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: &RouterConfig,
        routing_table: Arc<RoutingTable>,
        connection: Arc<dyn Connection>,
        sender: Arc<dyn RequestSender>,
    ) -> Self {
        info!(use_pub_sub = config.use_pub_sub, "Proxy publisher initialized");
        Self {
            channel: ProxyChannel::new(
                routing_table,
                connection,
                sender,
                config.connection_update_interval,
            ),
            use_pub_sub: config.use_pub_sub,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PublisherMetrics>) -> Self {
        self.channel.metrics = Some(metrics);
        self
    }

    async fn routing_keys(&self, request: &Request) -> Result<Vec<String>> {
        let routing_table = &self.channel.routing_table;

        if request.msg_type.is_direct() {
            return match routing_table.get_routable_host(&request.target).await {
                Ok(host) => Ok(vec![host]),
                // Nobody waits for an answer, so an unroutable message is dropped
                Err(CoreError::RetryExhausted { .. }) => Ok(Vec::new()),
                Err(e) => Err(e.into()),
            };
        }

        if self.use_pub_sub {
            request.target.validate().map_err(CoreError::from)?;
            Ok(vec![request.target.subscribe_filter()])
        } else {
            Ok(routing_table.get_all_hosts(&request.target).await?)
        }
    }
}

#[async_trait::async_trait]
impl Publisher for ProxyPublisher {
    fn name(&self) -> &'static str {
        "proxy"
    }

    async fn send_request(&self, request: &mut Request) -> Result<usize> {
        if request.msg_type == MessageType::Call {
            return Err(self.channel.reject(request));
        }

        let routing_keys = self.routing_keys(request).await?;
        if routing_keys.is_empty() {
            debug!(
                message_id = %request.message_id,
                target = %request.target,
                msg_type = %request.msg_type,
                "No hosts for target, dropping message"
            );
            if let Some(metrics) = &self.channel.metrics {
                metrics.dropped(request.msg_type);
            }
            return Ok(0);
        }

        Ok(self.channel.dispatch(request, routing_keys).await)
    }

    async fn cleanup(&self) {
        self.channel.cleanup().await;
    }
}

/// CALL publisher via proxy
pub struct CallProxyPublisher {
    channel: ProxyChannel,
}

impl CallProxyPublisher {
    /// Create the publisher and start refreshing its publisher connections.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: &RouterConfig,
        routing_table: Arc<RoutingTable>,
        connection: Arc<dyn Connection>,
        sender: Arc<dyn RequestSender>,
    ) -> Self {
        Self {
            channel: ProxyChannel::new(
                routing_table,
                connection,
                sender,
                config.connection_update_interval,
            ),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PublisherMetrics>) -> Self {
        self.channel.metrics = Some(metrics);
        self
    }
}

#[async_trait::async_trait]
impl Publisher for CallProxyPublisher {
    fn name(&self) -> &'static str {
        "call-proxy"
    }

    async fn send_request(&self, request: &mut Request) -> Result<usize> {
        if request.msg_type != MessageType::Call {
            return Err(self.channel.reject(request));
        }

        let host = match self.channel.routing_table.get_routable_host(&request.target).await {
            Ok(host) => host,
            Err(CoreError::RetryExhausted { attempts, elapsed, .. }) => {
                warn!(
                    message_id = %request.message_id,
                    target = %request.target,
                    attempts,
                    ?elapsed,
                    "Timeout resolving a host for CALL"
                );
                if let Some(metrics) = &self.channel.metrics {
                    metrics.call_timeouts_total.inc();
                }
                return Err(PublisherError::Timeout {
                    message_id: request.message_id,
                    target: request.target.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        Ok(self.channel.dispatch(request, vec![host]).await)
    }

    async fn cleanup(&self) {
        self.channel.cleanup().await;
    }
}
