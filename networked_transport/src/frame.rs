//! Message framing on top of a byte [`Stream`]
//!
//! Each frame is `[u32 LE payload length][payload]`. A length above the configured maximum is a
//! malformed frame: the stream can not be resynchronized and must be dropped.
//!
//! Empty frames carry no message. A client writes one when it connects, so that transports which
//! only discover a peer through its first packet see it right away.
use alloc::vec::Vec;

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use crate::Stream;
use crate::error::{Result, TransportError};

pub const DEFAULT_MAX_FRAME_LEN: usize = 1 << 20;

const HEADER_LEN: usize = 4;
const READ_CHUNK: usize = 4096;

/// Queue `payload` on the stream as a single frame
pub fn write_frame(stream: &mut dyn Stream, payload: &[u8], max_len: usize) -> Result<()> {
    let too_large = TransportError::FrameTooLarge {
        len: payload.len(),
        max: max_len,
    };
    if payload.len() > max_len {
        return Err(too_large);
    }
    let len = u32::try_from(payload.len()).map_err(|_| too_large)?;
    let mut header = [0u8; HEADER_LEN];
    LittleEndian::write_u32(&mut header, len);
    stream.write(&header)?;
    stream.write(payload)
}

/// Reassembles frames from the bytes read on a stream
#[derive(Debug)]
pub struct FrameReader {
    buffer: BytesMut,
    chunk: Vec<u8>,
    max_len: usize,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameReader {
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            chunk: alloc::vec![0; READ_CHUNK],
            max_len,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Bytes received that are not part of a complete frame yet
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Read every byte currently available on the stream. Returns the number of bytes read.
    pub fn fill(&mut self, stream: &mut dyn Stream) -> Result<usize> {
        let mut total = 0;
        while stream.data_available() {
            let read = stream.read(&mut self.chunk)?;
            if read == 0 {
                break;
            }
            self.buffer.extend_from_slice(&self.chunk[..read]);
            total += read;
        }
        if total > 0 {
            trace!(total, buffered = self.buffer.len(), "read bytes from stream");
        }
        Ok(total)
    }

    /// Next complete frame, if one was fully received
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }
        let len = LittleEndian::read_u32(&self.buffer[..HEADER_LEN]) as usize;
        if len > self.max_len {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_len,
            });
        }
        if self.buffer.len() < HEADER_LEN + len {
            return Ok(None);
        }
        self.buffer.advance(HEADER_LEN);
        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    /// Read the stream, then return every complete non-empty frame
    pub fn read_frames(&mut self, stream: &mut dyn Stream) -> Result<Vec<Bytes>> {
        self.fill(stream)?;
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            if frame.is_empty() {
                trace!("skipping empty frame");
                continue;
            }
            frames.push(frame);
        }
        Ok(frames)
    }
}
