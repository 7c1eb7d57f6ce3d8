//! Proxy send path of the RPC transport
//!
//! This library provides:
//! - Publishers computing routing keys per message pattern and handing requests to the transport
//! - Background updaters keeping transport connections and registrations in sync with the matchmaker
//! - Prometheus metrics of the send path

pub mod client;
pub mod error;
pub mod metrics;
pub mod publisher;
pub mod transport;
pub mod updater;

#[cfg(test)]
mod testing;

pub use client::ProxyClient;
pub use error::{PublisherError, Result};
pub use metrics::PublisherMetrics;
pub use publisher::{CallProxyPublisher, ProxyPublisher, Publisher};
pub use transport::{Connection, RequestSender};
pub use updater::{ConnectionUpdater, TargetUpdater, UpdateTask, Updater, UpdaterState};
