//! Client side of the P2P transport
use alloc::sync::Arc;
use core::time::Duration;

use bytes::{Buf, Bytes};
use networked_core::id::PeerId;
use networked_transport::{ClientBackend, Result, Stream, TransportError};
use tracing::{debug, info, trace};

use crate::{P2pConfig, P2pNetworking};

/// Connection of a client to the server peer `server`.
///
/// `server` may be the local peer itself, when the server runs in the same process.
pub struct P2pClientBackend {
    net: Arc<dyn P2pNetworking>,
    server: u64,
    config: P2pConfig,
    pending: Bytes,
    eof: bool,
    closed: bool,
}

impl P2pClientBackend {
    pub fn new(net: Arc<dyn P2pNetworking>, server: u64, config: P2pConfig) -> Self {
        info!(local = net.local_peer(), server, "p2p client connecting");
        Self {
            net,
            server,
            config,
            pending: Bytes::new(),
            eof: false,
            closed: false,
        }
    }

    fn is_loopback(&self) -> bool {
        self.server == self.net.local_peer()
    }

    fn accept_server_session(&self) {
        // a co-located server would consume the requests meant for it
        if self.is_loopback() {
            return;
        }
        while let Some(peer) = self.net.poll_session_request() {
            if peer == self.server {
                self.net.accept_session(peer);
            } else {
                debug!(peer, "ignoring session request from a peer that is not the server");
            }
        }
    }
}

impl Stream for P2pClientBackend {
    fn can_read(&self) -> bool {
        !self.closed && !(self.eof && self.pending.is_empty())
    }

    fn data_available(&mut self) -> bool {
        if self.closed {
            return false;
        }
        if self.pending.is_empty() && !self.eof {
            self.accept_server_session();
        }
        while self.pending.is_empty() && !self.eof {
            let Some((from, packet)) = self.net.read_packet(self.config.client_channel) else {
                break;
            };
            if from != self.server {
                trace!(from, "dropping packet from a peer that is not the server");
                continue;
            }
            if packet.is_empty() {
                debug!("p2p server closed the connection");
                self.eof = true;
            } else {
                self.pending = packet;
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
        for chunk in buffer.chunks(self.config.max_packet_len.max(1)) {
            self.net.send(self.server, self.config.server_channel, chunk)?;
        }
        Ok(())
    }

    fn close(&mut self, _timeout: Duration) {
        if self.closed {
            return;
        }
        let _ = self.net.send(self.server, self.config.server_channel, &[]);
        if !self.is_loopback() {
            self.net.close_session(self.server);
        }
        self.closed = true;
    }
}

impl ClientBackend for P2pClientBackend {
    fn stream(&mut self) -> &mut dyn Stream {
        self
    }

    fn remote_id(&self) -> PeerId {
        PeerId::Server
    }
}
