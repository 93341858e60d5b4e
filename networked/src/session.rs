//! Tick drivers of the server and of the clients
//!
//! Every tick a session:
//! 1. sends the messages queued by the application since the last tick
//! 2. accepts the new connections (server), which receive a snapshot of every registered object
//! 3. applies the received messages to its [`ReplicationContext`]
//! 4. runs the network update of the objects and sweeps the recently forgotten ids
//! 5. sends the resulting updates
//!
//! A transport error tears the affected connection down. On the client, this resets the context.
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::time::Duration;

use networked_core::id::PeerId;
use networked_replication::config::ReplicationConfig;
use networked_replication::error::ReplicationError;
use networked_replication::registry::{ReplicationContext, Role};
use networked_transport::frame::DEFAULT_MAX_FRAME_LEN;
use networked_transport::{ClientBackend, ServerBackend};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::connection::Connection;
use crate::error::{Result, SessionError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Largest accepted message, in bytes
    pub max_frame_len: usize,
    /// How long a closing connection may wait for its queued bytes to be sent
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            close_timeout: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Connected(PeerId),
    Disconnected(PeerId),
}

/// Errors from remote input are logged by the context. Local misuse is kept in `fatal`, first
/// one wins, and reported once the tick has run to completion.
fn record_fatal(
    fatal: &mut Option<SessionError>,
    result: core::result::Result<(), ReplicationError>,
) {
    if let Err(e) = result {
        if e.is_fatal() && fatal.is_none() {
            error!("fatal replication error: {e}");
            *fatal = Some(e.into());
        }
    }
}

pub struct ClientSession {
    connection: Connection,
    context: ReplicationContext,
    config: SessionConfig,
    connected: bool,
}

impl ClientSession {
    /// Open a session over a connected backend
    pub fn connect(
        backend: Box<dyn ClientBackend>,
        config: SessionConfig,
        replication: ReplicationConfig,
    ) -> Result<Self> {
        let mut connection = Connection::new(backend, config.max_frame_len);
        connection.announce()?;
        Ok(Self {
            connection,
            context: ReplicationContext::new(Role::Client, replication),
            config,
            connected: true,
        })
    }

    pub fn context(&self) -> &ReplicationContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ReplicationContext {
        &mut self.context
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Run one network tick of `delta` seconds
    pub fn tick(&mut self, delta: f32) -> Result<()> {
        if !self.connected {
            return Err(SessionError::Disconnected(PeerId::Server));
        }
        let result = self.exchange(delta);
        if let Err(e) = &result {
            if !matches!(e, SessionError::Replication(_)) {
                error!("connection to the server lost: {e}");
                self.teardown();
            }
        }
        result
    }

    fn exchange(&mut self, delta: f32) -> Result<()> {
        self.flush()?;
        let mut fatal = None;
        for message in self.connection.receive()? {
            record_fatal(&mut fatal, self.context.receive(PeerId::Server, message));
        }
        self.context.network_update(delta);
        self.context.sweep_recently_forgotten();
        self.flush()?;
        fatal.map_or(Ok(()), Err)
    }

    fn flush(&mut self) -> Result<()> {
        for outgoing in self.context.drain_outgoing() {
            if outgoing.target.includes(PeerId::Server) {
                self.connection.send(&outgoing.message)?;
            } else {
                trace!(target = ?outgoing.target, "dropping message not addressed to the server");
            }
        }
        self.connection.flush()
    }

    /// Send the pending messages, then close the connection
    pub fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        if let Err(e) = self.flush() {
            warn!("could not flush before disconnecting: {e}");
        }
        self.connection.close(self.config.close_timeout);
        self.teardown();
        info!("disconnected from the server");
    }

    fn teardown(&mut self) {
        self.connected = false;
        self.context.reset();
    }
}

pub struct ServerSession {
    backend: Box<dyn ServerBackend>,
    connections: BTreeMap<PeerId, Connection>,
    context: ReplicationContext,
    config: SessionConfig,
    /// events of a tick that ended with an error, reported by the next one
    pending_events: Vec<SessionEvent>,
}

impl ServerSession {
    pub fn new(
        backend: Box<dyn ServerBackend>,
        config: SessionConfig,
        replication: ReplicationConfig,
    ) -> Self {
        Self {
            backend,
            connections: BTreeMap::new(),
            context: ReplicationContext::new(Role::Server, replication),
            config,
            pending_events: Vec::new(),
        }
    }

    pub fn context(&self) -> &ReplicationContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ReplicationContext {
        &mut self.context
    }

    pub fn start(&mut self) -> Result<()> {
        self.backend.start()?;
        Ok(())
    }

    /// Close every connection and stop accepting new ones
    pub fn stop(&mut self) {
        let peers: Vec<PeerId> = self.connections.keys().copied().collect();
        for peer in peers {
            self.drop_connection(peer);
        }
        self.backend.stop();
    }

    /// Connected peers, in order
    pub fn peers(&self) -> Vec<PeerId> {
        self.connections.keys().copied().collect()
    }

    /// Run one network tick of `delta` seconds.
    ///
    /// A fatal replication error does not interrupt the tick: it is returned once every message
    /// has been applied and sent, and the events of that tick are returned by the next call.
    pub fn tick(&mut self, delta: f32) -> Result<Vec<SessionEvent>> {
        let mut events = core::mem::take(&mut self.pending_events);
        let mut fatal = None;
        // before accepting, so that new clients do not get both the snapshot and the creation
        self.flush(&mut events);
        self.accept(&mut events);

        let mut dropped = Vec::new();
        for (peer, connection) in self.connections.iter_mut() {
            match connection.receive() {
                Ok(messages) => {
                    for message in messages {
                        record_fatal(&mut fatal, self.context.receive(*peer, message));
                    }
                }
                Err(e) => {
                    warn!(?peer, "dropping connection: {e}");
                    dropped.push(*peer);
                }
            }
        }
        for peer in dropped {
            self.drop_connection(peer);
            events.push(SessionEvent::Disconnected(peer));
        }

        self.context.network_update(delta);
        self.context.sweep_recently_forgotten();
        self.flush(&mut events);
        match fatal {
            Some(e) => {
                self.pending_events = events;
                Err(e)
            }
            None => Ok(events),
        }
    }

    fn accept(&mut self, events: &mut Vec<SessionEvent>) {
        while self.backend.pending() {
            let backend = match self.backend.accept_client() {
                Ok(backend) => backend,
                Err(e) => {
                    warn!("could not accept client: {e}");
                    break;
                }
            };
            let mut connection = Connection::new(backend, self.config.max_frame_len);
            let peer = connection.remote_id();
            let snapshot = self.context.snapshot_messages();
            debug!(?peer, objects = snapshot.len(), "sending snapshot to new client");
            let sent = snapshot
                .iter()
                .try_for_each(|message| connection.send(message))
                .and_then(|_| connection.flush());
            if let Err(e) = sent {
                warn!(?peer, "could not send snapshot: {e}");
                connection.close(self.config.close_timeout);
                self.backend.on_disconnect(peer);
                continue;
            }
            if let Some(mut previous) = self.connections.insert(peer, connection) {
                warn!(?peer, "replacing an existing connection");
                previous.close(self.config.close_timeout);
            }
            info!(?peer, "client connected");
            events.push(SessionEvent::Connected(peer));
        }
    }

    /// Send the queued messages to the connections they target
    fn flush(&mut self, events: &mut Vec<SessionEvent>) {
        let outgoing = self.context.drain_outgoing();
        let mut failed = Vec::new();
        for (peer, connection) in self.connections.iter_mut() {
            let sent = outgoing
                .iter()
                .filter(|outgoing| outgoing.target.includes(*peer))
                .try_for_each(|outgoing| connection.send(&outgoing.message))
                .and_then(|_| connection.flush());
            if let Err(e) = sent {
                warn!(?peer, "dropping connection: {e}");
                failed.push(*peer);
            }
        }
        for peer in failed {
            self.drop_connection(peer);
            events.push(SessionEvent::Disconnected(peer));
        }
    }

    fn drop_connection(&mut self, peer: PeerId) {
        if let Some(mut connection) = self.connections.remove(&peer) {
            connection.close(self.config.close_timeout);
        }
        self.backend.on_disconnect(peer);
        self.context.on_peer_disconnected(peer);
        info!(?peer, "client disconnected");
    }
}
