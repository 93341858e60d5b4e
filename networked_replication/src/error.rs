//! Replication-related errors

use alloc::string::String;

use networked_core::id::{NetworkId, ObjectKey, PeerId};
use networked_serde::SerializationError;

pub type Result<T> = core::result::Result<T, ReplicationError>;

#[derive(thiserror::Error, Debug)]
pub enum ReplicationError {
    #[error("object {0} does not have authority")]
    NotAuthority(ObjectKey),
    #[error("network id {network_id} is already bound to {existing}, cannot bind it to {new}")]
    DuplicateNetworkId {
        network_id: NetworkId,
        existing: ObjectKey,
        new: ObjectKey,
    },
    #[error("object {network_id} has {slots} variable slots, received index {index}")]
    UnknownVariableIndex {
        network_id: NetworkId,
        index: usize,
        slots: usize,
    },
    #[error("no variable named {name} with the requested type")]
    UnknownVariable { name: &'static str },
    #[error("object {0} is client-side and cannot be bound to a network id")]
    ClientSideObject(ObjectKey),
    #[error("object {key} is registered as {current}, cannot bind it to {requested}")]
    Rebind {
        key: ObjectKey,
        current: NetworkId,
        requested: NetworkId,
    },
    #[error("no live object with network id {0}")]
    UnknownObject(NetworkId),
    #[error("network id {0} is already registered")]
    AlreadyRegistered(NetworkId),
    #[error("no object with key {0}")]
    UnknownObjectKey(ObjectKey),
    #[error("no pending creation with placeholder id {0}")]
    UnknownPlaceholder(NetworkId),
    #[error("no prefab registered under {0:?}")]
    UnknownPrefab(String),
    #[error("delete confirmation for {0} without a pending request")]
    UnknownDeleteConfirmation(NetworkId),
    #[error("{peer} sent an update for {network_id} owned by {owner:?}")]
    NotOwner {
        network_id: NetworkId,
        peer: PeerId,
        owner: Option<PeerId>,
    },
    #[error("unexpected {kind} message from {from}")]
    UnexpectedMessage { from: PeerId, kind: &'static str },
    #[error("network id space exhausted")]
    IdsExhausted,
    #[error("{0} can only be called on the server")]
    ServerOnly(&'static str),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl ReplicationError {
    /// Fatal errors come from a local programming mistake rather than from remote input.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReplicationError::DuplicateNetworkId { .. }
                | ReplicationError::ClientSideObject(_)
                | ReplicationError::Rebind { .. }
                | ReplicationError::IdsExhausted
                | ReplicationError::ServerOnly(_)
        )
    }
}
