//! Boundary to the socket layer that actually moves messages

use rpc_api::Request;

/// A transport connection that can be attached to several remote hosts
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    /// Connect to `address` unless already connected
    async fn connect_to_host(&self, address: &str) -> anyhow::Result<()>;

    /// Release the connection
    async fn close(&self);
}

/// Hands a routed request to the transport; delivery failures are the transport's concern
#[async_trait::async_trait]
pub trait RequestSender: Send + Sync {
    async fn send(&self, connection: &dyn Connection, request: &Request);
}
