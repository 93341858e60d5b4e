/*! # Networked Serde

Binary codec used by the replication layer.

Every value is written little-endian into a flat byte buffer, with no padding or alignment:
the encoding of a sequence of values is the concatenation of their encodings.
Decoding goes through a [`Reader`] which tracks the offset, so that decoding a value advances
the offset by exactly the number of bytes produced by the matching encode.
*/

mod error;
mod impls;
pub mod reader;
pub mod writer;

pub use error::{Result, SerializationError};
pub use reader::Reader;
pub use writer::Writer;

use bytes::Bytes;

/// A type that can be written to and read from the binary wire format.
pub trait ToBytes {
    /// Number of bytes written by [`ToBytes::to_bytes`]
    fn bytes_len(&self) -> usize;

    fn to_bytes(&self, writer: &mut Writer) -> Result<()>;

    fn from_bytes(reader: &mut Reader) -> Result<Self>
    where
        Self: Sized;
}

/// Encode a single value into a standalone buffer.
pub fn encode<T: ToBytes>(value: &T) -> Result<Bytes> {
    let mut writer = Writer::with_capacity(value.bytes_len());
    value.to_bytes(&mut writer)?;
    Ok(writer.to_bytes())
}

/// Decode a value from `buffer` starting at `offset`.
///
/// On success `offset` is advanced by the number of bytes consumed. On failure it is left untouched.
pub fn decode<T: ToBytes>(buffer: &[u8], offset: &mut usize) -> Result<T> {
    if *offset > buffer.len() {
        return Err(SerializationError::BufferTooShort {
            need: *offset,
            have: buffer.len(),
        });
    }
    let mut reader = Reader::from(&buffer[*offset..]);
    let value = T::from_bytes(&mut reader)?;
    *offset += reader.position();
    Ok(value)
}
