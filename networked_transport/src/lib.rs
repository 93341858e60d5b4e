/*! # Networked Transport

Duplex byte streams between the server and its clients.

A [`ServerBackend`] accepts inbound connections and turns each of them into a [`ClientBackend`];
the client side builds its [`ClientBackend`] directly (for example with [`tcp::TcpClient::connect`]).
Every operation is non-blocking: the replication tick polls [`Stream::data_available`] and never
waits on the network.

Messages are delimited on top of the byte stream by the [`frame`] module.
*/
extern crate alloc;

use alloc::boxed::Box;
use core::time::Duration;

use networked_core::id::PeerId;

pub mod error;
pub mod frame;
pub mod local;
pub mod tcp;

pub use error::{Result, TransportError};

/// A duplex byte stream
pub trait Stream: Send {
    /// False once the stream is closed and every received byte has been read
    fn can_read(&self) -> bool;

    /// True if [`Stream::read`] would return at least one byte. Never blocks.
    fn data_available(&mut self) -> bool;

    /// Read up to `buffer.len()` bytes. Returns 0 if nothing is available.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Queue `buffer` for sending
    fn write(&mut self, buffer: &[u8]) -> Result<()>;

    /// Push out the bytes queued by [`Stream::write`], as far as the backend allows without blocking
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Close the stream, waiting at most `timeout` for the queued bytes to be sent
    fn close(&mut self, timeout: Duration);
}

/// One end of a connection
pub trait ClientBackend: Send {
    fn stream(&mut self) -> &mut dyn Stream;

    /// The participant at the other end
    fn remote_id(&self) -> PeerId;
}

/// Accepts the inbound connections of the server
pub trait ServerBackend: Send {
    /// Start accepting connections. Starting a started backend does nothing.
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self);

    /// True if at least one inbound connection is waiting for [`ServerBackend::accept_client`]
    fn pending(&mut self) -> bool;

    fn accept_client(&mut self) -> Result<Box<dyn ClientBackend>>;

    /// The connection to `client` was dropped
    fn on_disconnect(&mut self, client: PeerId);
}

pub mod prelude {
    pub use crate::error::TransportError;
    pub use crate::frame::{FrameReader, write_frame};
    pub use crate::local::{LocalClient, LocalConnector, LocalServerBackend};
    pub use crate::tcp::{TcpClient, TcpConfig, TcpServerBackend};
    pub use crate::{ClientBackend, ServerBackend, Stream};
}
