//! Message types and outgoing requests

use crate::Target;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Delivery pattern of a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Request/response, exactly one reply expected
    Call,
    /// One-way message to a single consumer
    Cast,
    /// One-way message to every consumer of the target
    CastFanout,
    /// Notification to a single consumer
    Notify,
    /// Notification to every consumer of the target
    NotifyFanout,
}

impl MessageType {
    pub const ALL: [MessageType; 5] = [
        MessageType::Call,
        MessageType::Cast,
        MessageType::CastFanout,
        MessageType::Notify,
        MessageType::NotifyFanout,
    ];

    /// Point-to-point types, routed to a single host
    pub fn is_direct(&self) -> bool {
        matches!(self, MessageType::Call | MessageType::Cast | MessageType::Notify)
    }

    /// Broadcast types, routed to every host of a target
    pub fn is_multisend(&self) -> bool {
        !self.is_direct()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Call => "CALL",
            MessageType::Cast => "CAST",
            MessageType::CastFanout => "CAST_FANOUT",
            MessageType::Notify => "NOTIFY",
            MessageType::NotifyFanout => "NOTIFY_FANOUT",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing request handed to a publisher.
///
/// `routing_key` is filled in by the publisher right before each send.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    pub message_id: Uuid,
    pub target: Target,
    pub msg_type: MessageType,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_key: Option<String>,
}

impl Request {
    /// Create a new request with a fresh message id
    pub fn new(target: Target, msg_type: MessageType, payload: serde_json::Value) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            target,
            msg_type,
            payload,
            routing_key: None,
        }
    }
}
