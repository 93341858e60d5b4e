//! Messages exchanged by the replication contexts of the server and its clients
use alloc::string::String;

use bytes::Bytes;
use networked_core::id::{NetworkId, PeerId};
use networked_serde::reader::Reader;
use networked_serde::writer::Writer;
use networked_serde::{SerializationError, ToBytes};

#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationMessage {
    /// Instantiate `prefab` and apply `snapshot` to it.
    ///
    /// Sent by the server with a registered id, or by a client with a placeholder id to request
    /// the creation of an object it spawned.
    Create {
        network_id: NetworkId,
        prefab: String,
        parent: Option<NetworkId>,
        persistent: bool,
        snapshot: Bytes,
    },
    /// Server's answer to a client `Create`: the placeholder is now known as `network_id`
    AssignId {
        placeholder: NetworkId,
        network_id: NetworkId,
    },
    /// New value of the variable at slot `index`
    VariableUpdate {
        network_id: NetworkId,
        index: u16,
        payload: Bytes,
    },
    /// A client deleted the object. If `ack` is set it waits for a [`ReplicationMessage::DeleteConfirmed`].
    DeleteRequest { network_id: NetworkId, ack: bool },
    DeleteConfirmed { network_id: NetworkId },
    /// Remove the object and its descendants. `deleting` is false for range-based unloading.
    Forget { network_id: NetworkId, deleting: bool },
    /// The receiving client gained or lost authority over the object
    Authority { network_id: NetworkId, granted: bool },
}

impl ReplicationMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ReplicationMessage::Create { .. } => "create",
            ReplicationMessage::AssignId { .. } => "assign_id",
            ReplicationMessage::VariableUpdate { .. } => "variable_update",
            ReplicationMessage::DeleteRequest { .. } => "delete_request",
            ReplicationMessage::DeleteConfirmed { .. } => "delete_confirmed",
            ReplicationMessage::Forget { .. } => "forget",
            ReplicationMessage::Authority { .. } => "authority",
        }
    }
}

/// Variable payloads use the same `[i32 length][payload]` record as snapshots
fn write_payload(payload: &Bytes, writer: &mut Writer) -> Result<(), SerializationError> {
    let len = i32::try_from(payload.len())
        .map_err(|_| SerializationError::InvalidLength(payload.len() as i64))?;
    writer.write_i32(len)?;
    writer.write_slice(payload)
}

fn read_payload(reader: &mut Reader) -> Result<Bytes, SerializationError> {
    let len = reader.read_i32()?;
    let len = usize::try_from(len).map_err(|_| SerializationError::InvalidLength(len as i64))?;
    reader.read_bytes(len)
}

impl ToBytes for ReplicationMessage {
    fn bytes_len(&self) -> usize {
        1 + match self {
            ReplicationMessage::Create {
                prefab,
                parent,
                snapshot,
                ..
            } => 4 + (4 + prefab.len()) + parent.bytes_len() + 1 + snapshot.bytes_len(),
            ReplicationMessage::AssignId { .. } => 8,
            ReplicationMessage::VariableUpdate { payload, .. } => 4 + 2 + 4 + payload.len(),
            ReplicationMessage::DeleteRequest { .. }
            | ReplicationMessage::Forget { .. }
            | ReplicationMessage::Authority { .. } => 5,
            ReplicationMessage::DeleteConfirmed { .. } => 4,
        }
    }

    fn to_bytes(&self, writer: &mut Writer) -> Result<(), SerializationError> {
        match self {
            ReplicationMessage::Create {
                network_id,
                prefab,
                parent,
                persistent,
                snapshot,
            } => {
                writer.write_u8(0)?;
                network_id.to_bytes(writer)?;
                prefab.to_bytes(writer)?;
                parent.to_bytes(writer)?;
                persistent.to_bytes(writer)?;
                snapshot.to_bytes(writer)?;
            }
            ReplicationMessage::AssignId {
                placeholder,
                network_id,
            } => {
                writer.write_u8(1)?;
                placeholder.to_bytes(writer)?;
                network_id.to_bytes(writer)?;
            }
            ReplicationMessage::VariableUpdate {
                network_id,
                index,
                payload,
            } => {
                writer.write_u8(2)?;
                network_id.to_bytes(writer)?;
                writer.write_u16(*index)?;
                write_payload(payload, writer)?;
            }
            ReplicationMessage::DeleteRequest { network_id, ack } => {
                writer.write_u8(3)?;
                network_id.to_bytes(writer)?;
                ack.to_bytes(writer)?;
            }
            ReplicationMessage::DeleteConfirmed { network_id } => {
                writer.write_u8(4)?;
                network_id.to_bytes(writer)?;
            }
            ReplicationMessage::Forget {
                network_id,
                deleting,
            } => {
                writer.write_u8(5)?;
                network_id.to_bytes(writer)?;
                deleting.to_bytes(writer)?;
            }
            ReplicationMessage::Authority {
                network_id,
                granted,
            } => {
                writer.write_u8(6)?;
                network_id.to_bytes(writer)?;
                granted.to_bytes(writer)?;
            }
        }
        Ok(())
    }

    fn from_bytes(reader: &mut Reader) -> Result<Self, SerializationError> {
        let message = match reader.read_u8()? {
            0 => ReplicationMessage::Create {
                network_id: NetworkId::from_bytes(reader)?,
                prefab: String::from_bytes(reader)?,
                parent: Option::<NetworkId>::from_bytes(reader)?,
                persistent: bool::from_bytes(reader)?,
                snapshot: Bytes::from_bytes(reader)?,
            },
            1 => ReplicationMessage::AssignId {
                placeholder: NetworkId::from_bytes(reader)?,
                network_id: NetworkId::from_bytes(reader)?,
            },
            2 => ReplicationMessage::VariableUpdate {
                network_id: NetworkId::from_bytes(reader)?,
                index: reader.read_u16()?,
                payload: read_payload(reader)?,
            },
            3 => ReplicationMessage::DeleteRequest {
                network_id: NetworkId::from_bytes(reader)?,
                ack: bool::from_bytes(reader)?,
            },
            4 => ReplicationMessage::DeleteConfirmed {
                network_id: NetworkId::from_bytes(reader)?,
            },
            5 => ReplicationMessage::Forget {
                network_id: NetworkId::from_bytes(reader)?,
                deleting: bool::from_bytes(reader)?,
            },
            6 => ReplicationMessage::Authority {
                network_id: NetworkId::from_bytes(reader)?,
                granted: bool::from_bytes(reader)?,
            },
            _ => return Err(SerializationError::InvalidValue),
        };
        Ok(message)
    }
}

/// Which peers an outgoing message is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendTarget {
    All,
    Only(PeerId),
    AllExcept(PeerId),
}

impl SendTarget {
    pub fn includes(&self, peer: PeerId) -> bool {
        match self {
            SendTarget::All => true,
            SendTarget::Only(target) => *target == peer,
            SendTarget::AllExcept(excluded) => *excluded != peer,
        }
    }
}

/// A message waiting to be sent by the session layer
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub target: SendTarget,
    pub message: ReplicationMessage,
}
