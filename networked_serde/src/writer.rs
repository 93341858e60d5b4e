use byteorder::{LittleEndian, WriteBytesExt};
use bytes::Bytes;
use std::io::{Cursor, Write};

use crate::Result;

/// Growable buffer that values are appended to.
pub struct Writer(Cursor<Vec<u8>>);

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

impl Default for Writer {
    fn default() -> Self {
        // TODO: benchmark how much capacity a typical snapshot needs
        Self::with_capacity(20)
    }
}

impl Writer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Cursor::new(Vec::with_capacity(capacity)))
    }

    /// Number of bytes written so far
    pub fn len(&self) -> usize {
        self.0.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.get_ref().is_empty()
    }

    /// Reset the writer but keeps the underlying allocation
    pub fn reset(&mut self) {
        self.0.get_mut().clear();
        self.0.set_position(0);
    }

    /// Overwrite 4 bytes previously written at `position` with `value`.
    ///
    /// Used to back-patch length prefixes once the payload size is known.
    pub fn patch_i32(&mut self, position: usize, value: i32) {
        self.0.get_mut()[position..position + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        WriteBytesExt::write_u8(&mut self.0, value)?;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        WriteBytesExt::write_u16::<LittleEndian>(&mut self.0, value)?;
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        WriteBytesExt::write_i32::<LittleEndian>(&mut self.0, value)?;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        WriteBytesExt::write_u32::<LittleEndian>(&mut self.0, value)?;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        WriteBytesExt::write_u64::<LittleEndian>(&mut self.0, value)?;
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        WriteBytesExt::write_f32::<LittleEndian>(&mut self.0, value)?;
        Ok(())
    }

    pub fn write_slice(&mut self, value: &[u8]) -> Result<()> {
        self.0.write_all(value)?;
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.get_ref()
    }

    /// Consume the writer to get the written bytes
    pub fn to_bytes(self) -> Bytes {
        Bytes::from(self.0.into_inner())
    }
}
