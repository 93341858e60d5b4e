//! In-process transport backed by crossbeam channels
//!
//! Used when the server and a client run in the same process, and in tests.
use alloc::boxed::Box;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

use bytes::{Buf, Bytes};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use networked_core::id::PeerId;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::{ClientBackend, ServerBackend, Stream};

/// One end of an in-process byte stream
#[derive(Debug)]
pub struct LocalStream {
    sender: Option<Sender<Bytes>>,
    receiver: Receiver<Bytes>,
    /// received bytes that were not read yet
    pending: Bytes,
    disconnected: bool,
}

impl LocalStream {
    pub fn new(sender: Sender<Bytes>, receiver: Receiver<Bytes>) -> Self {
        Self {
            sender: Some(sender),
            receiver,
            pending: Bytes::new(),
            disconnected: false,
        }
    }

    /// Create two connected ends
    pub fn pair() -> (Self, Self) {
        let (sender1, receiver1) = crossbeam_channel::unbounded();
        let (sender2, receiver2) = crossbeam_channel::unbounded();
        (Self::new(sender1, receiver2), Self::new(sender2, receiver1))
    }
}

impl Stream for LocalStream {
    fn can_read(&self) -> bool {
        self.sender.is_some() && !(self.disconnected && self.pending.is_empty())
    }

    fn data_available(&mut self) -> bool {
        while self.pending.is_empty() {
            match self.receiver.try_recv() {
                Ok(data) => self.pending = data,
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    return false;
                }
            }
        }
        true
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if !self.data_available() {
            return Ok(0);
        }
        let len = buffer.len().min(self.pending.len());
        buffer[..len].copy_from_slice(&self.pending[..len]);
        self.pending.advance(len);
        Ok(len)
    }

    fn write(&mut self, buffer: &[u8]) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(TransportError::Closed)?;
        sender
            .try_send(Bytes::copy_from_slice(buffer))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self, _timeout: Duration) {
        // writes are delivered synchronously, nothing to wait for
        self.sender = None;
    }
}

/// Client end of an in-process connection
#[derive(Debug)]
pub struct LocalClient {
    stream: LocalStream,
    remote: PeerId,
}

impl ClientBackend for LocalClient {
    fn stream(&mut self) -> &mut dyn Stream {
        &mut self.stream
    }

    fn remote_id(&self) -> PeerId {
        self.remote
    }
}

/// Opens connections to a [`LocalServerBackend`]
#[derive(Clone, Debug)]
pub struct LocalConnector {
    requests: Sender<(u64, LocalStream)>,
    next_id: Arc<AtomicU64>,
}

impl LocalConnector {
    /// Connect a new client. The server sees it as pending until it accepts it.
    pub fn connect(&self) -> Result<LocalClient> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (client, server) = LocalStream::pair();
        self.requests
            .try_send((id, server))
            .map_err(|_| TransportError::Closed)?;
        debug!(id, "local client connecting");
        Ok(LocalClient {
            stream: client,
            remote: PeerId::Server,
        })
    }
}

/// Server backend accepting [`LocalConnector`] connections
#[derive(Debug)]
pub struct LocalServerBackend {
    requests: Receiver<(u64, LocalStream)>,
    connector: LocalConnector,
    started: bool,
    next: Option<(u64, LocalStream)>,
}

impl Default for LocalServerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalServerBackend {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            requests: receiver,
            connector: LocalConnector {
                requests: sender,
                next_id: Arc::new(AtomicU64::new(1)),
            },
            started: false,
            next: None,
        }
    }

    pub fn connector(&self) -> LocalConnector {
        self.connector.clone()
    }
}

impl ServerBackend for LocalServerBackend {
    fn start(&mut self) -> Result<()> {
        info!("local server backend started");
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.started = false;
        self.next = None;
        // refuse the connections that were never accepted
        while self.requests.try_recv().is_ok() {}
        info!("local server backend stopped");
    }

    fn pending(&mut self) -> bool {
        if !self.started {
            return false;
        }
        if self.next.is_none() {
            self.next = self.requests.try_recv().ok();
        }
        self.next.is_some()
    }

    fn accept_client(&mut self) -> Result<Box<dyn ClientBackend>> {
        if !self.started {
            return Err(TransportError::NotStarted);
        }
        let (id, stream) = match self.next.take() {
            Some(next) => next,
            None => self
                .requests
                .try_recv()
                .map_err(|_| TransportError::NoPendingConnection)?,
        };
        let remote = PeerId::Local(id);
        info!(?remote, "accepted local client");
        Ok(Box::new(LocalClient { stream, remote }))
    }

    fn on_disconnect(&mut self, client: PeerId) {
        debug!(?client, "local client disconnected");
    }
}
