use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;
use std::io::Cursor;

use crate::{Result, SerializationError};

/// Cursor over a received buffer.
///
/// The position of the reader is the offset of the next byte to decode.
pub struct Reader(Cursor<Bytes>);

impl From<Bytes> for Reader {
    fn from(value: Bytes) -> Self {
        Self(Cursor::new(value))
    }
}

impl From<Vec<u8>> for Reader {
    fn from(value: Vec<u8>) -> Self {
        Self(Cursor::new(Bytes::from(value)))
    }
}

impl From<&[u8]> for Reader {
    fn from(value: &[u8]) -> Self {
        Self(Cursor::new(Bytes::copy_from_slice(value)))
    }
}

impl Reader {
    /// Offset of the next byte to read
    pub fn position(&self) -> usize {
        self.0.position() as usize
    }

    /// Number of bytes that have not been read yet
    pub fn remaining(&self) -> usize {
        self.0.get_ref().len().saturating_sub(self.position())
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    fn ensure(&self, need: usize) -> Result<()> {
        let have = self.remaining();
        if have < need {
            return Err(SerializationError::BufferTooShort { need, have });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(ReadBytesExt::read_u8(&mut self.0)?)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(ReadBytesExt::read_u16::<LittleEndian>(&mut self.0)?)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(ReadBytesExt::read_i32::<LittleEndian>(&mut self.0)?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(ReadBytesExt::read_u32::<LittleEndian>(&mut self.0)?)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(ReadBytesExt::read_u64::<LittleEndian>(&mut self.0)?)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.ensure(4)?;
        Ok(ReadBytesExt::read_f32::<LittleEndian>(&mut self.0)?)
    }

    /// Split off the next `len` bytes without copying them.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len)?;
        let start = self.position();
        let bytes = self.0.get_ref().slice(start..start + len);
        self.0.set_position((start + len) as u64);
        Ok(bytes)
    }
}
