//! Module related to the concept of `Authority`
//!
//! A peer is said to have authority over an object if it is the one allowed to write its
//! networked variables. Its writes are replicated to every other peer; the other peers only
//! apply received updates.
//!
//! The server always knows which peer has authority over an object, since it brokers the
//! updates between the clients. An object created by a client is owned by that client, an
//! object created by the server is owned by the server. When a client disconnects, the
//! authority over its objects goes back to the server.
use alloc::vec::Vec;

use bevy_platform::collections::HashMap;
use networked_core::id::{NetworkId, PeerId};

/// Tracks, on the server, which peer owns each registered object
#[derive(Debug, Default)]
pub struct AuthorityBroker {
    /// for each object, the peer that has authority over it
    pub owners: HashMap<NetworkId, PeerId>,
}

impl AuthorityBroker {
    pub fn owner(&self, network_id: NetworkId) -> Option<PeerId> {
        self.owners.get(&network_id).copied()
    }

    pub fn is_owner(&self, network_id: NetworkId, peer: PeerId) -> bool {
        self.owner(network_id) == Some(peer)
    }

    /// Set the owner, returning the previous one
    pub fn set_owner(&mut self, network_id: NetworkId, peer: PeerId) -> Option<PeerId> {
        self.owners.insert(network_id, peer)
    }

    pub fn remove(&mut self, network_id: NetworkId) -> Option<PeerId> {
        self.owners.remove(&network_id)
    }

    /// Ids owned by `peer`, in increasing order
    pub fn owned_by(&self, peer: PeerId) -> Vec<NetworkId> {
        let mut ids: Vec<NetworkId> = self
            .owners
            .iter()
            .filter(|(_, owner)| **owner == peer)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn clear(&mut self) {
        self.owners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use test_log::test;

    #[test]
    fn test_owned_by() {
        let mut broker = AuthorityBroker::default();
        broker.set_owner(NetworkId(3), PeerId::Local(1));
        broker.set_owner(NetworkId(1), PeerId::Local(1));
        broker.set_owner(NetworkId(2), PeerId::Server);
        assert_eq!(
            broker.owned_by(PeerId::Local(1)),
            vec![NetworkId(1), NetworkId(3)]
        );
        assert_eq!(
            broker.set_owner(NetworkId(3), PeerId::Server),
            Some(PeerId::Local(1))
        );
        assert!(broker.is_owner(NetworkId(3), PeerId::Server));
    }
}
