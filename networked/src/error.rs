use networked_core::id::PeerId;
use networked_replication::error::ReplicationError;
use networked_serde::SerializationError;
use networked_transport::TransportError;

pub type Result<T> = core::result::Result<T, SessionError>;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed message: {0}")]
    Serialization(#[from] SerializationError),
    #[error(transparent)]
    Replication(#[from] ReplicationError),
    #[error("not connected to {0}")]
    Disconnected(PeerId),
}
