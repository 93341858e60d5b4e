//! Replication messages over a framed stream
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::time::Duration;

use networked_core::id::PeerId;
use networked_replication::message::ReplicationMessage;
use networked_serde::SerializationError;
use networked_transport::frame::{FrameReader, write_frame};
use networked_transport::{ClientBackend, TransportError};
use tracing::trace;

use crate::error::Result;

/// One connection of a session: each frame carries one [`ReplicationMessage`]
pub struct Connection {
    backend: Box<dyn ClientBackend>,
    reader: FrameReader,
    remote: PeerId,
}

impl Connection {
    pub fn new(backend: Box<dyn ClientBackend>, max_frame_len: usize) -> Self {
        let remote = backend.remote_id();
        Self {
            backend,
            reader: FrameReader::new(max_frame_len),
            remote,
        }
    }

    pub fn remote_id(&self) -> PeerId {
        self.remote
    }

    pub fn is_open(&mut self) -> bool {
        self.backend.stream().can_read()
    }

    pub fn send(&mut self, message: &ReplicationMessage) -> Result<()> {
        let bytes = networked_serde::encode(message)?;
        trace!(remote = ?self.remote, kind = message.kind(), len = bytes.len(), "send message");
        write_frame(self.backend.stream(), &bytes, self.reader.max_len())?;
        Ok(())
    }

    /// Write an empty frame, which makes the connection visible to the remote
    /// without carrying a message
    pub fn announce(&mut self) -> Result<()> {
        write_frame(self.backend.stream(), &[], self.reader.max_len())?;
        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.backend.stream().flush()?;
        Ok(())
    }

    /// Every message fully received since the last call.
    ///
    /// Fails once the remote closed the stream and every message was read, or if a frame
    /// is malformed.
    pub fn receive(&mut self) -> Result<Vec<ReplicationMessage>> {
        let stream = self.backend.stream();
        let frames = self.reader.read_frames(stream)?;
        if frames.is_empty() && !stream.can_read() {
            return Err(TransportError::Closed.into());
        }
        let mut messages = Vec::with_capacity(frames.len());
        for frame in frames {
            let mut offset = 0;
            let message = networked_serde::decode::<ReplicationMessage>(&frame, &mut offset)?;
            if offset != frame.len() {
                return Err(SerializationError::LengthMismatch {
                    expected: frame.len(),
                    consumed: offset,
                }
                .into());
            }
            messages.push(message);
        }
        Ok(messages)
    }

    pub fn close(&mut self, timeout: Duration) {
        self.backend.stream().close(timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use networked_core::id::NetworkId;
    use networked_transport::ServerBackend;
    use networked_transport::frame::DEFAULT_MAX_FRAME_LEN;
    use networked_transport::local::LocalServerBackend;
    use test_log::test;

    fn pair() -> (Connection, Connection) {
        let mut server = LocalServerBackend::new();
        server.start().unwrap();
        let client = server.connector().connect().unwrap();
        let accepted = server.accept_client().unwrap();
        (
            Connection::new(Box::new(client), DEFAULT_MAX_FRAME_LEN),
            Connection::new(accepted, DEFAULT_MAX_FRAME_LEN),
        )
    }

    #[test]
    fn test_messages_round_trip() {
        let (mut client, mut server) = pair();
        assert_eq!(client.remote_id(), PeerId::Server);
        assert_eq!(server.remote_id(), PeerId::Local(1));
        let messages = [
            ReplicationMessage::DeleteRequest {
                network_id: NetworkId(3),
                ack: true,
            },
            ReplicationMessage::Forget {
                network_id: NetworkId(4),
                deleting: false,
            },
        ];
        for message in messages.iter() {
            client.send(message).unwrap();
        }
        assert_eq!(server.receive().unwrap(), messages.to_vec());
        assert!(server.receive().unwrap().is_empty());
    }

    #[test]
    fn test_closed_connection() {
        let (mut client, mut server) = pair();
        client
            .send(&ReplicationMessage::DeleteConfirmed {
                network_id: NetworkId(1),
            })
            .unwrap();
        client.close(Duration::ZERO);
        // pending messages are still delivered
        assert_eq!(server.receive().unwrap().len(), 1);
        assert!(matches!(
            server.receive(),
            Err(SessionError::Transport(TransportError::Closed))
        ));
        assert!(!server.is_open());
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let (mut client, mut server) = pair();
        let mut bytes = networked_serde::encode(&ReplicationMessage::DeleteConfirmed {
            network_id: NetworkId(1),
        })
        .unwrap()
        .to_vec();
        bytes.push(0);
        write_frame(client.backend.stream(), &bytes, DEFAULT_MAX_FRAME_LEN).unwrap();
        assert!(matches!(
            server.receive(),
            Err(SessionError::Serialization(
                SerializationError::LengthMismatch { .. }
            ))
        ));
    }
}
