//! Client selecting the publisher strategy by message type

use crate::error::Result;
use crate::metrics::PublisherMetrics;
use crate::publisher::{CallProxyPublisher, ProxyPublisher, Publisher};
use crate::transport::{Connection, RequestSender};
use rpc_api::{MessageType, Request};
use rpc_core::{Matchmaker, RouterConfig, RoutingTable};
use std::sync::Arc;
use tracing::debug;

/// ProxyClient sends CALL requests through the CALL publisher and every
/// other pattern through the non-CALL publisher.
pub struct ProxyClient {
    call_publisher: Arc<dyn Publisher>,
    publisher: Arc<dyn Publisher>,
}

impl ProxyClient {
    /// Build both proxy publishers on a shared routing table.
    ///
    /// Each publisher gets its own connection. Must be called from within a
    /// Tokio runtime.
    pub fn new(
        config: &RouterConfig,
        matchmaker: Arc<dyn Matchmaker>,
        call_connection: Arc<dyn Connection>,
        connection: Arc<dyn Connection>,
        sender: Arc<dyn RequestSender>,
        metrics: Option<Arc<PublisherMetrics>>,
    ) -> Self {
        let routing_table = Arc::new(RoutingTable::new(matchmaker, config.retry.clone()));

        let mut call_publisher =
            CallProxyPublisher::new(config, routing_table.clone(), call_connection, sender.clone());
        let mut publisher = ProxyPublisher::new(config, routing_table, connection, sender);
        if let Some(metrics) = metrics {
            call_publisher = call_publisher.with_metrics(metrics.clone());
            publisher = publisher.with_metrics(metrics);
        }

        Self::from_publishers(Arc::new(call_publisher), Arc::new(publisher))
    }

    pub fn from_publishers(call_publisher: Arc<dyn Publisher>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            call_publisher,
            publisher,
        }
    }

    fn publisher_for(&self, msg_type: MessageType) -> &Arc<dyn Publisher> {
        match msg_type {
            MessageType::Call => &self.call_publisher,
            _ => &self.publisher,
        }
    }

    /// Send a request through the publisher matching its pattern
    pub async fn send(&self, request: &mut Request) -> Result<usize> {
        let publisher = self.publisher_for(request.msg_type);
        debug!(
            message_id = %request.message_id,
            msg_type = %request.msg_type,
            publisher = publisher.name(),
            "Dispatching request"
        );
        publisher.send_request(request).await
    }

    pub async fn cleanup(&self) {
        self.call_publisher.cleanup().await;
        self.publisher.cleanup().await;
    }
}
