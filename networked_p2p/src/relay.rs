//! In-process implementation of [`P2pNetworking`]
//!
//! Every peer joined to the same [`LocalRelay`] can reach the others. Sessions follow the usual
//! P2P service rules: sending to a peer opens the session on the sender side and raises a session
//! request on the receiver side, except when a peer sends to itself.
use alloc::collections::VecDeque;
use alloc::sync::Arc;

use bevy_platform::collections::{HashMap, HashSet};
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{P2pError, P2pNetworking};

#[derive(Default)]
struct PeerState {
    channels: HashMap<u32, VecDeque<(u64, Bytes)>>,
    sessions: HashSet<u64>,
    requests: VecDeque<u64>,
}

#[derive(Default)]
struct RelayState {
    peers: HashMap<u64, PeerState>,
}

#[derive(Clone, Default)]
pub struct LocalRelay {
    state: Arc<Mutex<RelayState>>,
}

impl LocalRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the relay as `peer`
    pub fn join(&self, peer: u64) -> Result<LocalRelayPeer, P2pError> {
        let mut state = self.state.lock();
        if state.peers.contains_key(&peer) {
            return Err(P2pError::AlreadyJoined(peer));
        }
        state.peers.insert(peer, PeerState::default());
        debug!(peer, "joined local relay");
        Ok(LocalRelayPeer {
            relay: self.clone(),
            peer,
        })
    }

    /// Remove `peer`; the packets queued for it are dropped
    pub fn leave(&self, peer: u64) {
        let mut state = self.state.lock();
        state.peers.remove(&peer);
        for other in state.peers.values_mut() {
            other.sessions.remove(&peer);
            other.requests.retain(|p| *p != peer);
        }
    }
}

/// Handle of one peer on a [`LocalRelay`]
#[derive(Clone)]
pub struct LocalRelayPeer {
    relay: LocalRelay,
    peer: u64,
}

impl P2pNetworking for LocalRelayPeer {
    fn local_peer(&self) -> u64 {
        self.peer
    }

    fn send(&self, peer: u64, channel: u32, data: &[u8]) -> Result<(), P2pError> {
        let mut state = self.relay.state.lock();
        if !state.peers.contains_key(&peer) {
            return Err(P2pError::UnknownPeer(peer));
        }
        if peer != self.peer {
            if let Some(sender) = state.peers.get_mut(&self.peer) {
                sender.sessions.insert(peer);
            }
        }
        let Some(target) = state.peers.get_mut(&peer) else {
            return Err(P2pError::UnknownPeer(peer));
        };
        if peer != self.peer
            && !target.sessions.contains(&self.peer)
            && !target.requests.contains(&self.peer)
        {
            trace!(from = self.peer, to = peer, "session request");
            target.requests.push_back(self.peer);
        }
        let packet = (self.peer, Bytes::copy_from_slice(data));
        match target.channels.get_mut(&channel) {
            Some(queue) => queue.push_back(packet),
            None => {
                target.channels.insert(channel, VecDeque::from([packet]));
            }
        }
        Ok(())
    }

    fn packet_available(&self, channel: u32) -> Option<usize> {
        let state = self.relay.state.lock();
        state
            .peers
            .get(&self.peer)?
            .channels
            .get(&channel)?
            .front()
            .map(|(_, packet)| packet.len())
    }

    fn read_packet(&self, channel: u32) -> Option<(u64, Bytes)> {
        let mut state = self.relay.state.lock();
        state
            .peers
            .get_mut(&self.peer)?
            .channels
            .get_mut(&channel)?
            .pop_front()
    }

    fn poll_session_request(&self) -> Option<u64> {
        let mut state = self.relay.state.lock();
        state.peers.get_mut(&self.peer)?.requests.pop_front()
    }

    fn accept_session(&self, peer: u64) -> bool {
        let mut state = self.relay.state.lock();
        if !state.peers.contains_key(&peer) {
            return false;
        }
        let Some(local) = state.peers.get_mut(&self.peer) else {
            return false;
        };
        local.requests.retain(|p| *p != peer);
        local.sessions.insert(peer);
        true
    }

    fn close_session(&self, peer: u64) {
        let mut state = self.relay.state.lock();
        if let Some(local) = state.peers.get_mut(&self.peer) {
            local.sessions.remove(&peer);
        }
        if let Some(remote) = state.peers.get_mut(&peer) {
            remote.sessions.remove(&self.peer);
        }
    }
}
