//! Addressing and message types shared by the RPC routing crates
//!
//! This library defines:
//! - Target: the abstract destination of a message
//! - MessageType and Request: what is being sent and where it is routed
//! - Address helpers for the endpoint strings the transport understands

pub mod address;
pub mod message;
pub mod target;

pub use message::{MessageType, Request};
pub use target::{Target, TargetError};
