//! [`ToBytes`] implementations for the primitive variable kinds
use bevy_color::Srgba;
use bevy_math::{Quat, Vec3};
use bytes::Bytes;

use crate::{Reader, Result, SerializationError, ToBytes, Writer};

impl ToBytes for u8 {
    fn bytes_len(&self) -> usize {
        1
    }

    fn to_bytes(&self, writer: &mut Writer) -> Result<()> {
        writer.write_u8(*self)
    }

    fn from_bytes(reader: &mut Reader) -> Result<Self> {
        reader.read_u8()
    }
}

impl ToBytes for u16 {
    fn bytes_len(&self) -> usize {
        2
    }

    fn to_bytes(&self, writer: &mut Writer) -> Result<()> {
        writer.write_u16(*self)
    }

    fn from_bytes(reader: &mut Reader) -> Result<Self> {
        reader.read_u16()
    }
}

impl ToBytes for i32 {
    fn bytes_len(&self) -> usize {
        4
    }

    fn to_bytes(&self, writer: &mut Writer) -> Result<()> {
        writer.write_i32(*self)
    }

    fn from_bytes(reader: &mut Reader) -> Result<Self> {
        reader.read_i32()
    }
}

impl ToBytes for u32 {
    fn bytes_len(&self) -> usize {
        4
    }

    fn to_bytes(&self, writer: &mut Writer) -> Result<()> {
        writer.write_u32(*self)
    }

    fn from_bytes(reader: &mut Reader) -> Result<Self> {
        reader.read_u32()
    }
}

impl ToBytes for u64 {
    fn bytes_len(&self) -> usize {
        8
    }

    fn to_bytes(&self, writer: &mut Writer) -> Result<()> {
        writer.write_u64(*self)
    }

    fn from_bytes(reader: &mut Reader) -> Result<Self> {
        reader.read_u64()
    }
}

impl ToBytes for bool {
    fn bytes_len(&self) -> usize {
        1
    }

    fn to_bytes(&self, writer: &mut Writer) -> Result<()> {
        writer.write_u8(u8::from(*self))
    }

    fn from_bytes(reader: &mut Reader) -> Result<Self> {
        Ok(reader.read_u8()? != 0)
    }
}

impl ToBytes for f32 {
    fn bytes_len(&self) -> usize {
        4
    }

    fn to_bytes(&self, writer: &mut Writer) -> Result<()> {
        // go through the bit pattern so that NaN payloads survive untouched
        writer.write_u32(self.to_bits())
    }

    fn from_bytes(reader: &mut Reader) -> Result<Self> {
        Ok(f32::from_bits(reader.read_u32()?))
    }
}

/// `[i32 byte length][utf-8 bytes]`
impl ToBytes for String {
    fn bytes_len(&self) -> usize {
        4 + self.len()
    }

    fn to_bytes(&self, writer: &mut Writer) -> Result<()> {
        let len = i32::try_from(self.len())
            .map_err(|_| SerializationError::InvalidLength(self.len() as i64))?;
        writer.write_i32(len)?;
        writer.write_slice(self.as_bytes())
    }

    fn from_bytes(reader: &mut Reader) -> Result<Self> {
        let len = reader.read_i32()?;
        let len = usize::try_from(len).map_err(|_| SerializationError::InvalidLength(len as i64))?;
        let bytes = reader.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SerializationError::InvalidUtf8)
    }
}

/// `[u32 byte length][bytes]`
impl ToBytes for Bytes {
    fn bytes_len(&self) -> usize {
        4 + self.len()
    }

    fn to_bytes(&self, writer: &mut Writer) -> Result<()> {
        let len = u32::try_from(self.len())
            .map_err(|_| SerializationError::InvalidLength(self.len() as i64))?;
        writer.write_u32(len)?;
        writer.write_slice(self)
    }

    fn from_bytes(reader: &mut Reader) -> Result<Self> {
        let len = reader.read_u32()? as usize;
        reader.read_bytes(len)
    }
}

impl ToBytes for Vec3 {
    fn bytes_len(&self) -> usize {
        12
    }

    fn to_bytes(&self, writer: &mut Writer) -> Result<()> {
        self.x.to_bytes(writer)?;
        self.y.to_bytes(writer)?;
        self.z.to_bytes(writer)
    }

    fn from_bytes(reader: &mut Reader) -> Result<Self> {
        Ok(Vec3::new(
            f32::from_bytes(reader)?,
            f32::from_bytes(reader)?,
            f32::from_bytes(reader)?,
        ))
    }
}

/// Written as `x, y, z, w`
impl ToBytes for Quat {
    fn bytes_len(&self) -> usize {
        16
    }

    fn to_bytes(&self, writer: &mut Writer) -> Result<()> {
        self.x.to_bytes(writer)?;
        self.y.to_bytes(writer)?;
        self.z.to_bytes(writer)?;
        self.w.to_bytes(writer)
    }

    fn from_bytes(reader: &mut Reader) -> Result<Self> {
        Ok(Quat::from_xyzw(
            f32::from_bytes(reader)?,
            f32::from_bytes(reader)?,
            f32::from_bytes(reader)?,
            f32::from_bytes(reader)?,
        ))
    }
}

/// Written as `r, g, b, a`
impl ToBytes for Srgba {
    fn bytes_len(&self) -> usize {
        16
    }

    fn to_bytes(&self, writer: &mut Writer) -> Result<()> {
        self.red.to_bytes(writer)?;
        self.green.to_bytes(writer)?;
        self.blue.to_bytes(writer)?;
        self.alpha.to_bytes(writer)
    }

    fn from_bytes(reader: &mut Reader) -> Result<Self> {
        Ok(Srgba::new(
            f32::from_bytes(reader)?,
            f32::from_bytes(reader)?,
            f32::from_bytes(reader)?,
            f32::from_bytes(reader)?,
        ))
    }
}

impl<T: ToBytes> ToBytes for Option<T> {
    fn bytes_len(&self) -> usize {
        1 + self.as_ref().map_or(0, ToBytes::bytes_len)
    }

    fn to_bytes(&self, writer: &mut Writer) -> Result<()> {
        match self {
            None => writer.write_u8(0),
            Some(value) => {
                writer.write_u8(1)?;
                value.to_bytes(writer)
            }
        }
    }

    fn from_bytes(reader: &mut Reader) -> Result<Self> {
        match reader.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::from_bytes(reader)?)),
            _ => Err(SerializationError::InvalidValue),
        }
    }
}
