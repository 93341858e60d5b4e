//! Server side of the P2P transport
//!
//! All the clients write on the same server channel, so the backend routes each received packet
//! to the stream of its sender. A packet from a peer without a stream opens a pending
//! connection if the peer is the local one (loopback client); other peers must first go through
//! a session request.
use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::time::Duration;

use bevy_platform::collections::HashMap;
use bytes::{Buf, Bytes};
use networked_core::id::PeerId;
use networked_transport::{ClientBackend, Result, ServerBackend, Stream, TransportError};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::{P2pConfig, P2pNetworking};

#[derive(Default)]
struct RouterState {
    started: bool,
    inboxes: HashMap<u64, VecDeque<Bytes>>,
    /// peers with an inbox that were not accepted yet
    pending: VecDeque<u64>,
}

struct Router {
    net: Arc<dyn P2pNetworking>,
    config: P2pConfig,
    state: Mutex<RouterState>,
}

impl Router {
    /// Accept the session requests, then dispatch the received packets to the inboxes
    fn pump(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.started {
            return;
        }
        while let Some(peer) = self.net.poll_session_request() {
            if state.inboxes.contains_key(&peer) {
                continue;
            }
            if self.net.accept_session(peer) {
                info!(peer, "accepted p2p session");
                state.inboxes.insert(peer, VecDeque::new());
                state.pending.push_back(peer);
            } else {
                warn!(peer, "could not accept p2p session");
            }
        }
        let local = self.net.local_peer();
        while let Some((from, packet)) = self.net.read_packet(self.config.server_channel) {
            match state.inboxes.get_mut(&from) {
                Some(inbox) => inbox.push_back(packet),
                // the service raises no session request for packets sent to ourselves
                None if from == local => {
                    info!(peer = from, "loopback client connecting");
                    state.inboxes.insert(from, VecDeque::from([packet]));
                    state.pending.push_back(from);
                }
                None => debug!(from, "dropping packet from a peer without session"),
            }
        }
    }

    fn pop(&self, peer: u64) -> Option<Bytes> {
        self.state.lock().inboxes.get_mut(&peer)?.pop_front()
    }

    fn remove(&self, peer: u64) {
        let mut state = self.state.lock();
        state.inboxes.remove(&peer);
        state.pending.retain(|p| *p != peer);
    }
}

/// Server end of the connection with one peer
pub struct P2pServerStream {
    router: Arc<Router>,
    peer: u64,
    pending: Bytes,
    eof: bool,
    closed: bool,
}

impl Stream for P2pServerStream {
    fn can_read(&self) -> bool {
        !self.closed && !(self.eof && self.pending.is_empty())
    }

    fn data_available(&mut self) -> bool {
        if self.closed {
            return false;
        }
        if self.pending.is_empty() && !self.eof {
            self.router.pump();
            while self.pending.is_empty() && !self.eof {
                match self.router.pop(self.peer) {
                    // an empty packet ends the stream
                    Some(packet) if packet.is_empty() => {
                        debug!(peer = self.peer, "p2p client closed the connection");
                        self.eof = true;
                    }
                    Some(packet) => self.pending = packet,
                    None => break,
                }
            }
        }
        !self.pending.is_empty()
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if !self.data_available() {
            return Ok(0);
        }
        let len = buffer.len().min(self.pending.len());
        buffer[..len].copy_from_slice(&self.pending[..len]);
        self.pending.advance(len);
        Ok(len)
    }

    fn write(&mut self, buffer: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let channel = self.router.config.client_channel;
        for chunk in buffer.chunks(self.router.config.max_packet_len.max(1)) {
            self.router.net.send(self.peer, channel, chunk)?;
        }
        Ok(())
    }

    fn close(&mut self, _timeout: Duration) {
        if self.closed {
            return;
        }
        let _ = self
            .router
            .net
            .send(self.peer, self.router.config.client_channel, &[]);
        self.router.remove(self.peer);
        if self.peer != self.router.net.local_peer() {
            self.router.net.close_session(self.peer);
        }
        self.closed = true;
    }
}

impl ClientBackend for P2pServerStream {
    fn stream(&mut self) -> &mut dyn Stream {
        self
    }

    fn remote_id(&self) -> PeerId {
        PeerId::P2p(self.peer)
    }
}

pub struct P2pServerBackend {
    router: Arc<Router>,
}

impl P2pServerBackend {
    pub fn new(net: Arc<dyn P2pNetworking>, config: P2pConfig) -> Self {
        Self {
            router: Arc::new(Router {
                net,
                config,
                state: Mutex::new(RouterState::default()),
            }),
        }
    }
}

impl ServerBackend for P2pServerBackend {
    fn start(&mut self) -> Result<()> {
        self.router.state.lock().started = true;
        info!(
            peer = self.router.net.local_peer(),
            "p2p server started"
        );
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.router.state.lock();
        state.started = false;
        state.inboxes.clear();
        state.pending.clear();
        info!("p2p server stopped");
    }

    fn pending(&mut self) -> bool {
        self.router.pump();
        !self.router.state.lock().pending.is_empty()
    }

    fn accept_client(&mut self) -> Result<Box<dyn ClientBackend>> {
        if !self.router.state.lock().started {
            return Err(TransportError::NotStarted);
        }
        self.router.pump();
        let peer = self
            .router
            .state
            .lock()
            .pending
            .pop_front()
            .ok_or(TransportError::NoPendingConnection)?;
        trace!(peer, "accepted p2p client");
        Ok(Box::new(P2pServerStream {
            router: self.router.clone(),
            peer,
            pending: Bytes::new(),
            eof: false,
            closed: false,
        }))
    }

    fn on_disconnect(&mut self, client: PeerId) {
        let PeerId::P2p(peer) = client else {
            return;
        };
        self.router.remove(peer);
        if peer != self.router.net.local_peer() {
            self.router.net.close_session(peer);
        }
        debug!(peer, "p2p client disconnected");
    }
}
