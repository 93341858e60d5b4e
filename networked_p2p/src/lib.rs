/*! # Networked P2P

Transport backend over a relayed peer-to-peer networking service, such as the P2P layer of a game
distribution platform.

The service delivers packets between peers identified by a `u64`, on numbered channels. A single
logical connection is multiplexed on two channels, one per direction:
- [`P2pConfig::server_channel`] carries the client → server packets
- [`P2pConfig::client_channel`] carries the server → client packets

When the server and a client run in the same process they share the same peer id, and the split
keeps the server from reading back its own packets. The service raises no session request for the
packets a peer sends to itself, so the server accepts that loopback client as soon as its first
packet arrives.
*/
extern crate alloc;

use alloc::string::ToString;

use bytes::Bytes;
use networked_transport::TransportError;
use serde::{Deserialize, Serialize};

pub mod client;
pub mod relay;
pub mod server;

/// Peer-to-peer networking service
pub trait P2pNetworking: Send + Sync {
    /// Id of this peer on the service
    fn local_peer(&self) -> u64;

    /// Send one packet to `peer` on `channel`.
    ///
    /// The first packet sent to a peer raises a session request on its side, unless the peer is
    /// the sender itself.
    fn send(&self, peer: u64, channel: u32, data: &[u8]) -> Result<(), P2pError>;

    /// Size of the next packet received on `channel`, if any
    fn packet_available(&self, channel: u32) -> Option<usize>;

    /// Next packet received on `channel`, with the id of its sender
    fn read_packet(&self, channel: u32) -> Option<(u64, Bytes)>;

    /// Next peer asking to open a session with this peer
    fn poll_session_request(&self) -> Option<u64>;

    /// Returns false if the session can not be opened
    fn accept_session(&self, peer: u64) -> bool;

    fn close_session(&self, peer: u64);
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum P2pError {
    #[error("peer {0} is not reachable")]
    UnknownPeer(u64),
    #[error("peer {0} already joined the relay")]
    AlreadyJoined(u64),
    #[error("packet of {len} bytes exceeds the maximum of {max} bytes")]
    PacketTooLarge { len: usize, max: usize },
}

impl From<P2pError> for TransportError {
    fn from(value: P2pError) -> Self {
        TransportError::Backend(value.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct P2pConfig {
    /// Channel of the client → server packets
    pub server_channel: u32,
    /// Channel of the server → client packets
    pub client_channel: u32,
    /// Writes larger than this are split over several packets
    pub max_packet_len: usize,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            server_channel: 0,
            client_channel: 1,
            max_packet_len: 512 * 1024,
        }
    }
}

pub mod prelude {
    pub use crate::client::P2pClientBackend;
    pub use crate::relay::{LocalRelay, LocalRelayPeer};
    pub use crate::server::P2pServerBackend;
    pub use crate::{P2pConfig, P2pError, P2pNetworking};
}
