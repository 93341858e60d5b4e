//! Raw socket transport over TCP
//!
//! Sockets are non-blocking. Writes are buffered and flushed as far as the socket accepts;
//! the rest stays queued until the next flush.
use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::net::SocketAddr;
use core::time::Duration;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::time::Instant;

use networked_core::id::PeerId;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Result, TransportError};
use crate::{ClientBackend, ServerBackend, Stream};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Disable Nagle's algorithm
    pub nodelay: bool,
    /// Maximum number of bytes queued for sending before writes fail
    pub max_write_buffer: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            nodelay: true,
            max_write_buffer: 4 * 1024 * 1024,
        }
    }
}

/// A non-blocking TCP stream
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    write_buffer: Vec<u8>,
    max_write_buffer: usize,
    eof: bool,
    closed: bool,
}

impl TcpTransport {
    pub fn new(stream: TcpStream, config: &TcpConfig) -> Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(config.nodelay)?;
        Ok(Self {
            stream,
            write_buffer: Vec::new(),
            max_write_buffer: config.max_write_buffer,
            eof: false,
            closed: false,
        })
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Bytes waiting to be written to the socket
    pub fn buffered(&self) -> usize {
        self.write_buffer.len()
    }
}

impl Stream for TcpTransport {
    fn can_read(&self) -> bool {
        !self.closed && !self.eof
    }

    fn data_available(&mut self) -> bool {
        if !self.can_read() {
            return false;
        }
        let mut byte = [0u8; 1];
        match self.stream.peek(&mut byte) {
            Ok(0) => {
                debug!("tcp stream reached end of file");
                self.eof = true;
                false
            }
            Ok(_) => true,
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(e) => {
                warn!("tcp stream error: {e}");
                self.eof = true;
                false
            }
        }
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if buffer.is_empty() || self.eof {
            return Ok(0);
        }
        match self.stream.read(buffer) {
            Ok(0) => {
                self.eof = true;
                Ok(0)
            }
            Ok(read) => Ok(read),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                Ok(0)
            }
            Err(e) => {
                self.eof = true;
                Err(e.into())
            }
        }
    }

    fn write(&mut self, buffer: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.write_buffer.len() + buffer.len() > self.max_write_buffer {
            return Err(TransportError::WriteBufferFull {
                buffered: self.write_buffer.len(),
            });
        }
        self.write_buffer.extend_from_slice(buffer);
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        while !self.write_buffer.is_empty() {
            match self.stream.write(&self.write_buffer) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(written) => {
                    self.write_buffer.drain(..written);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn close(&mut self, timeout: Duration) {
        if self.closed {
            return;
        }
        let start = Instant::now();
        while !self.write_buffer.is_empty() && start.elapsed() < timeout {
            if let Err(e) = self.flush() {
                warn!("could not flush tcp stream before closing: {e}");
                break;
            }
            if !self.write_buffer.is_empty() {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        if !self.write_buffer.is_empty() {
            warn!(
                dropped = self.write_buffer.len(),
                "closing tcp stream with unsent bytes"
            );
        }
        let _ = self.stream.shutdown(Shutdown::Both);
        self.closed = true;
    }
}

/// A TCP connection, on either side
#[derive(Debug)]
pub struct TcpClient {
    transport: TcpTransport,
    remote: PeerId,
}

impl TcpClient {
    /// Connect to a server. Blocks until the TCP handshake completes.
    pub fn connect(addr: SocketAddr, config: &TcpConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        info!(%addr, "connected to tcp server");
        Ok(Self {
            transport: TcpTransport::new(stream, config)?,
            remote: PeerId::Server,
        })
    }
}

impl ClientBackend for TcpClient {
    fn stream(&mut self) -> &mut dyn Stream {
        &mut self.transport
    }

    fn remote_id(&self) -> PeerId {
        self.remote
    }
}

#[derive(Debug)]
pub struct TcpServerBackend {
    local_addr: SocketAddr,
    config: TcpConfig,
    listener: Option<TcpListener>,
    pending: VecDeque<(TcpStream, SocketAddr)>,
    next_id: u64,
}

impl TcpServerBackend {
    pub fn new(local_addr: SocketAddr, config: TcpConfig) -> Self {
        Self {
            local_addr,
            config,
            listener: None,
            pending: VecDeque::new(),
            next_id: 1,
        }
    }

    /// Address the listener is bound to. Resolves port 0 once started.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
            .unwrap_or(self.local_addr)
    }

    fn poll_listener(&mut self) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    trace!(%addr, "inbound tcp connection");
                    self.pending.push_back((stream, addr));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("tcp listener error: {e}");
                    break;
                }
            }
        }
    }
}

impl ServerBackend for TcpServerBackend {
    fn start(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }
        let listener = TcpListener::bind(self.local_addr)?;
        listener.set_nonblocking(true)?;
        info!("tcp server listening on {}", listener.local_addr()?);
        self.listener = Some(listener);
        Ok(())
    }

    fn stop(&mut self) {
        self.listener = None;
        self.pending.clear();
        info!("tcp server stopped");
    }

    fn pending(&mut self) -> bool {
        self.poll_listener();
        !self.pending.is_empty()
    }

    fn accept_client(&mut self) -> Result<Box<dyn ClientBackend>> {
        if self.listener.is_none() {
            return Err(TransportError::NotStarted);
        }
        self.poll_listener();
        let (stream, addr) = self
            .pending
            .pop_front()
            .ok_or(TransportError::NoPendingConnection)?;
        let remote = PeerId::Socket(self.next_id);
        self.next_id += 1;
        info!(%addr, ?remote, "accepted tcp client");
        Ok(Box::new(TcpClient {
            transport: TcpTransport::new(stream, &self.config)?,
            remote,
        }))
    }

    fn on_disconnect(&mut self, client: PeerId) {
        debug!(?client, "tcp client disconnected");
    }
}
