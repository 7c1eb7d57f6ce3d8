//! Prometheus metrics for the publisher send path

use anyhow::Result;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};
use rpc_api::MessageType;
use std::sync::Arc;

/// Prometheus metrics collector for publishers
#[derive(Clone)]
pub struct PublisherMetrics {
    /// Requests handed to the transport, one per routing key
    pub requests_sent_total: CounterVec,
    /// Requests dropped because no host was registered
    pub requests_dropped_total: CounterVec,
    /// Requests rejected because the publisher does not support their pattern
    pub requests_rejected_total: CounterVec,
    /// CALL requests that could not be resolved in time
    pub call_timeouts_total: Counter,
    /// Prometheus registry for metrics
    pub registry: Arc<Registry>,
}

impl PublisherMetrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_sent_total = CounterVec::new(
            Opts::new("rpc_requests_sent_total", "Requests handed to the transport"),
            &["msg_type"],
        )?;

        let requests_dropped_total = CounterVec::new(
            Opts::new(
                "rpc_requests_dropped_total",
                "Requests dropped for lack of registered hosts",
            ),
            &["msg_type"],
        )?;

        let requests_rejected_total = CounterVec::new(
            Opts::new(
                "rpc_requests_rejected_total",
                "Requests with a pattern the publisher does not support",
            ),
            &["msg_type"],
        )?;

        let call_timeouts_total = Counter::new(
            "rpc_call_timeouts_total",
            "CALL requests whose target could not be resolved in time",
        )?;

        registry.register(Box::new(requests_sent_total.clone()))?;
        registry.register(Box::new(requests_dropped_total.clone()))?;
        registry.register(Box::new(requests_rejected_total.clone()))?;
        registry.register(Box::new(call_timeouts_total.clone()))?;

        Ok(Self {
            requests_sent_total,
            requests_dropped_total,
            requests_rejected_total,
            call_timeouts_total,
            registry,
        })
    }

    pub(crate) fn sent(&self, msg_type: MessageType, count: usize) {
        self.requests_sent_total
            .with_label_values(&[msg_type.as_str()])
            .inc_by(count as f64);
    }

    pub(crate) fn dropped(&self, msg_type: MessageType) {
        self.requests_dropped_total
            .with_label_values(&[msg_type.as_str()])
            .inc();
    }

    pub(crate) fn rejected(&self, msg_type: MessageType) {
        self.requests_rejected_total
            .with_label_values(&[msg_type.as_str()])
            .inc();
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
