//! Target addressing

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("Target topic must not be empty")]
    EmptyTopic,

    #[error("Target serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Target is the abstract destination a message is addressed to.
///
/// Serialized as a flat record; every field except `topic` may be absent and
/// deserializes to `None` / `false`. Fields are read-only once built; the
/// `with_*` builders produce a new value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    topic: String,

    #[serde(default)]
    exchange: Option<String>,

    #[serde(default)]
    server: Option<String>,

    #[serde(default)]
    namespace: Option<String>,

    #[serde(default)]
    version: Option<String>,

    #[serde(default)]
    fanout: bool,
}

impl Target {
    /// Create a target for a topic
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_fanout(mut self, fanout: bool) -> Self {
        self.fanout = fanout;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn exchange(&self) -> Option<&str> {
        self.exchange.as_deref()
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn is_fanout(&self) -> bool {
        self.fanout
    }

    /// Reject targets that cannot be resolved
    pub fn validate(&self) -> Result<(), TargetError> {
        if self.topic.is_empty() {
            return Err(TargetError::EmptyTopic);
        }
        Ok(())
    }

    /// Canonical `topic.exchange.server` form, used as the registry key.
    ///
    /// Absent and empty fields are skipped.
    pub fn key(&self) -> String {
        let mut items: Vec<&str> = Vec::with_capacity(3);
        if !self.topic.is_empty() {
            items.push(&self.topic);
        }
        for field in [&self.exchange, &self.server] {
            if let Some(value) = field.as_deref().filter(|v| !v.is_empty()) {
                items.push(value);
            }
        }
        items.join(".")
    }

    /// Subscription filter for pub/sub delivery of broadcast messages
    pub fn subscribe_filter(&self) -> String {
        self.key()
    }

    /// Parse a target from its flat JSON record
    pub fn from_json(data: &str) -> Result<Self, TargetError> {
        Ok(serde_json::from_str(data)?)
    }

    /// Serialize the target into its flat JSON record
    pub fn to_json(&self) -> Result<String, TargetError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_topic_only() {
        assert_eq!(Target::new("compute").key(), "compute");
    }

    #[test]
    fn test_key_order_is_topic_exchange_server() {
        let target = Target::new("compute")
            .with_server("node-1")
            .with_exchange("nova");
        assert_eq!(target.key(), "compute.nova.node-1");
    }

    #[test]
    fn test_key_skips_empty_fields() {
        let target = Target::new("compute")
            .with_exchange("")
            .with_server("node-1")
            .with_namespace("ns")
            .with_version("1.2");
        assert_eq!(target.key(), "compute.node-1");
        assert_eq!(target.subscribe_filter(), "compute.node-1");
    }

    #[test]
    fn test_equality_covers_all_fields() {
        let a = Target::new("compute").with_version("1.0");
        let b = Target::new("compute").with_version("1.1");
        assert_ne!(a, b);
        assert_eq!(a.key(), b.key());
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_builders_leave_original_untouched() {
        let base = Target::new("compute");
        let derived = base.clone().with_server("node-1").with_fanout(true);
        assert_eq!(base.server(), None);
        assert!(!base.is_fanout());
        assert_eq!(derived.server(), Some("node-1"));
        assert!(derived.is_fanout());
        assert_eq!(derived.topic(), base.topic());
    }

    #[test]
    fn test_validate() {
        assert!(Target::new("compute").validate().is_ok());
        assert!(matches!(
            Target::new("").validate(),
            Err(TargetError::EmptyTopic)
        ));
    }

    #[test]
    fn test_from_json_defaults_absent_fields() {
        let target = Target::from_json(r#"{"topic": "compute", "server": "node-1"}"#)
            .expect("valid target record");
        assert_eq!(target.topic(), "compute");
        assert_eq!(target.server(), Some("node-1"));
        assert_eq!(target.exchange(), None);
        assert_eq!(target.namespace(), None);
        assert_eq!(target.version(), None);
        assert!(!target.is_fanout());
    }

    #[test]
    fn test_from_json_requires_topic() {
        assert!(Target::from_json(r#"{"server": "node-1"}"#).is_err());
    }

    #[test]
    fn test_json_record_fields() {
        let target = Target::new("compute").with_fanout(true);
        let value: serde_json::Value =
            serde_json::from_str(&target.to_json().unwrap()).unwrap();
        for field in ["exchange", "topic", "namespace", "version", "server", "fanout"] {
            assert!(value.get(field).is_some(), "missing field {}", field);
        }
        assert_eq!(value["fanout"], serde_json::Value::Bool(true));
    }
}
