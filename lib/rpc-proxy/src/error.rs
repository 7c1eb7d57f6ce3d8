use rpc_api::MessageType;
use rpc_core::CoreError;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, PublisherError>;

#[derive(Error, Debug)]
pub enum PublisherError {
    #[error("Unsupported send pattern: {0}")]
    UnsupportedPattern(MessageType),

    #[error("Timeout waiting for a host to send message {message_id} to target {target}")]
    Timeout { message_id: Uuid, target: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}
