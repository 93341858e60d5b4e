//! Identifiers for replicated objects and for the participants of a session
use core::fmt::Formatter;
use networked_serde::reader::Reader;
use networked_serde::writer::Writer;
use networked_serde::{SerializationError, ToBytes};
use serde::{Deserialize, Serialize};

/// Session-wide identifier of a replicated object.
///
/// Positive ids are issued by the server and unique across every participant for as long as
/// the object is alive. Zero and negative ids are local placeholders for objects whose
/// creation has not been confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(pub i32);

impl NetworkId {
    pub const NONE: NetworkId = NetworkId(0);

    /// True once the server has issued this id
    pub fn is_registered(&self) -> bool {
        self.0 > 0
    }

    pub fn is_placeholder(&self) -> bool {
        self.0 <= 0
    }
}

impl Default for NetworkId {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<i32> for NetworkId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl core::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl ToBytes for NetworkId {
    fn bytes_len(&self) -> usize {
        4
    }

    fn to_bytes(&self, writer: &mut Writer) -> Result<(), SerializationError> {
        writer.write_i32(self.0)
    }

    fn from_bytes(reader: &mut Reader) -> Result<Self, SerializationError> {
        Ok(Self(reader.read_i32()?))
    }
}

/// Handle of an object inside one replication context.
///
/// Keys are never sent over the network: they stay valid for the whole life of the object,
/// including before it has been given a [`NetworkId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(pub u64);

impl core::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "obj{}", self.0)
    }
}

/// A participant of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PeerId {
    /// Refers to the server
    Server,
    /// A client living in the same process as the server
    Local(u64),
    /// A client connected through a raw socket
    Socket(u64),
    /// A client connected through the relayed P2P service
    P2p(u64),
}

impl ToBytes for PeerId {
    fn bytes_len(&self) -> usize {
        match self {
            PeerId::Server => 1,
            PeerId::Local(_) | PeerId::Socket(_) | PeerId::P2p(_) => 1 + 8,
        }
    }

    fn to_bytes(&self, writer: &mut Writer) -> Result<(), SerializationError> {
        match self {
            PeerId::Server => writer.write_u8(0)?,
            PeerId::Local(id) => {
                writer.write_u8(1)?;
                writer.write_u64(*id)?;
            }
            PeerId::Socket(id) => {
                writer.write_u8(2)?;
                writer.write_u64(*id)?;
            }
            PeerId::P2p(id) => {
                writer.write_u8(3)?;
                writer.write_u64(*id)?;
            }
        }
        Ok(())
    }

    fn from_bytes(reader: &mut Reader) -> Result<Self, SerializationError> {
        match reader.read_u8()? {
            0 => Ok(PeerId::Server),
            1 => Ok(PeerId::Local(reader.read_u64()?)),
            2 => Ok(PeerId::Socket(reader.read_u64()?)),
            3 => Ok(PeerId::P2p(reader.read_u64()?)),
            _ => Err(SerializationError::InvalidValue),
        }
    }
}

impl PeerId {
    /// Convert a PeerId to a u64 representation
    pub fn to_bits(&self) -> u64 {
        match self {
            PeerId::Server => 0,
            PeerId::Local(x) | PeerId::Socket(x) | PeerId::P2p(x) => *x,
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, PeerId::Server)
    }

    pub fn is_local(&self) -> bool {
        matches!(self, PeerId::Local(_))
    }
}

impl core::fmt::Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(self, f)
    }
}
