//! Core routing and service discovery functionality
//!
//! This library provides:
//! - Matchmaker registry mapping targets to hosts, in-memory or shared through Consul
//! - Routing table resolving targets to hosts with bounded retries
//! - Retry policy, host load balancing and router configuration

pub mod config;
pub mod error;
pub mod load_balancer;
pub mod matchmaker;
pub mod policy;
pub mod routing_table;

pub use config::{MatchmakerBackend, RouterConfig};
pub use error::{CoreError, Result};
pub use load_balancer::{LoadBalancer, LoadBalancingStrategy};
pub use matchmaker::{InMemoryMatchmaker, Matchmaker, PublisherEndpoint};
pub use policy::RetryPolicy;
pub use routing_table::RoutingTable;
