//! A-XDR decoder for DLMS/COSEM

use crate::axdr::types::{AxdrTag, LengthEncoding};
use crate::error::{DlmsError, DlmsResult};
use dlms_core::datatypes::{BitString, DataObject};

/// Nesting limit for arrays and structures
const MAX_DEPTH: usize = 32;

/// A-XDR decoder reading from a borrowed buffer
pub struct AxdrDecoder<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> AxdrDecoder<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Decode a tagged `Data` value.
    pub fn decode_data_object(&mut self) -> DlmsResult<DataObject> {
        self.decode_data_object_at(0)
    }

    fn decode_data_object_at(&mut self, depth: usize) -> DlmsResult<DataObject> {
        let tag = AxdrTag::from_u8(self.decode_u8()?)?;
        Ok(match tag {
            AxdrTag::Null => DataObject::Null,
            AxdrTag::Boolean => DataObject::Boolean(self.decode_bool()?),
            AxdrTag::BitString => DataObject::BitString(self.decode_bit_string()?),
            AxdrTag::Integer8 => DataObject::Integer8(self.decode_i8()?),
            AxdrTag::Integer16 => DataObject::Integer16(self.decode_i16()?),
            AxdrTag::Integer32 => DataObject::Integer32(i32::from_be_bytes(self.decode_array()?)),
            AxdrTag::Integer64 => DataObject::Integer64(i64::from_be_bytes(self.decode_array()?)),
            AxdrTag::Unsigned8 => DataObject::Unsigned8(self.decode_u8()?),
            AxdrTag::Unsigned16 => DataObject::Unsigned16(self.decode_u16()?),
            AxdrTag::Unsigned32 => DataObject::Unsigned32(self.decode_u32()?),
            AxdrTag::Unsigned64 => DataObject::Unsigned64(u64::from_be_bytes(self.decode_array()?)),
            AxdrTag::Float32 => {
                DataObject::Float32(f32::from_bits(u32::from_be_bytes(self.decode_array()?)))
            }
            AxdrTag::Float64 => {
                DataObject::Float64(f64::from_bits(u64::from_be_bytes(self.decode_array()?)))
            }
            AxdrTag::Enumerate => DataObject::Enumerate(self.decode_u8()?),
            AxdrTag::Bcd => DataObject::Bcd(self.decode_u8()?),
            AxdrTag::OctetString => DataObject::OctetString(self.decode_octet_string()?),
            AxdrTag::VisibleString => DataObject::VisibleString(self.decode_octet_string()?),
            AxdrTag::Utf8String => DataObject::Utf8String(self.decode_octet_string()?),
            AxdrTag::Array => DataObject::Array(self.decode_sequence(depth)?),
            AxdrTag::Structure => DataObject::Structure(self.decode_sequence(depth)?),
        })
    }

    fn decode_sequence(&mut self, depth: usize) -> DlmsResult<Vec<DataObject>> {
        if depth >= MAX_DEPTH {
            return Err(DlmsError::ProtocolDecode(
                "Data nesting exceeds supported depth".to_string(),
            ));
        }
        let count = self.decode_length()?;
        // Every element occupies at least one byte.
        if count > self.remaining() {
            return Err(DlmsError::ProtocolDecode("Truncated A-XDR sequence".to_string()));
        }
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.decode_data_object_at(depth + 1)?);
        }
        Ok(items)
    }

    pub fn decode_u8(&mut self) -> DlmsResult<u8> {
        let [b] = self.decode_array::<1>()?;
        Ok(b)
    }

    pub fn decode_i8(&mut self) -> DlmsResult<i8> {
        Ok(self.decode_u8()? as i8)
    }

    /// Any non-zero byte reads as `true`.
    pub fn decode_bool(&mut self) -> DlmsResult<bool> {
        Ok(self.decode_u8()? != 0)
    }

    pub fn decode_u16(&mut self) -> DlmsResult<u16> {
        Ok(u16::from_be_bytes(self.decode_array()?))
    }

    pub fn decode_i16(&mut self) -> DlmsResult<i16> {
        Ok(i16::from_be_bytes(self.decode_array()?))
    }

    pub fn decode_u32(&mut self) -> DlmsResult<u32> {
        Ok(u32::from_be_bytes(self.decode_array()?))
    }

    pub fn decode_length(&mut self) -> DlmsResult<usize> {
        let (length, consumed) = LengthEncoding::decode(&self.buffer[self.position..])?;
        self.position += consumed;
        Ok(length)
    }

    /// Length-prefixed octet string (no tag).
    pub fn decode_octet_string(&mut self) -> DlmsResult<Vec<u8>> {
        let length = self.decode_length()?;
        Ok(self.decode_bytes(length)?.to_vec())
    }

    pub fn decode_bit_string(&mut self) -> DlmsResult<BitString> {
        let num_bits = self.decode_length()?;
        let bytes = self.decode_bytes(num_bits.div_ceil(8))?.to_vec();
        BitString::new(bytes, num_bits)
    }

    /// `OPTIONAL` marker followed by the value when present.
    pub fn decode_optional<T>(
        &mut self,
        decode: impl FnOnce(&mut Self) -> DlmsResult<T>,
    ) -> DlmsResult<Option<T>> {
        if self.decode_bool()? {
            decode(self).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn decode_bytes(&mut self, length: usize) -> DlmsResult<&'a [u8]> {
        let end = self
            .position
            .checked_add(length)
            .filter(|&end| end <= self.buffer.len())
            .ok_or_else(|| DlmsError::ProtocolDecode("Truncated A-XDR value".to_string()))?;
        let bytes = &self.buffer[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    fn decode_array<const N: usize>(&mut self) -> DlmsResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.decode_bytes(N)?);
        Ok(out)
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.buffer.get(self.position).copied()
    }

    /// Everything not yet consumed.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buffer[self.position..];
        self.position = self.buffer.len();
        rest
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

/// Decode exactly one `Data` value; trailing bytes are an error.
pub fn decode_data(bytes: &[u8]) -> DlmsResult<DataObject> {
    let mut decoder = AxdrDecoder::new(bytes);
    let value = decoder.decode_data_object()?;
    if !decoder.is_empty() {
        return Err(DlmsError::ProtocolDecode(format!(
            "{} trailing byte(s) after Data",
            decoder.remaining()
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axdr::encoder::encode_data;

    #[test]
    fn test_decode_nested_structure() {
        let bytes = [0x02, 0x02, 0x12, 0x00, 0x08, 0x01, 0x01, 0x03, 0xFF];
        let value = decode_data(&bytes).unwrap();
        assert_eq!(
            value,
            DataObject::Structure(vec![
                DataObject::Unsigned16(8),
                DataObject::Array(vec![DataObject::Boolean(true)]),
            ])
        );
    }

    #[test]
    fn test_decode_matches_encoder_for_mixed_value() {
        let value = DataObject::Structure(vec![
            DataObject::Integer64(-5),
            DataObject::Float64(1.5),
            DataObject::VisibleString(b"meter".to_vec()),
            DataObject::Null,
        ]);
        assert_eq!(decode_data(&encode_data(&value)).unwrap(), value);
    }

    #[test]
    fn test_decode_truncated_and_trailing() {
        assert!(decode_data(&[0x09, 0x05, 0x01]).is_err());
        assert!(decode_data(&[0x11, 0x01, 0x00]).is_err());
        assert!(decode_data(&[0x01, 0x7F]).is_err());
    }

    #[test]
    fn test_decode_rejects_deep_nesting() {
        let mut bytes = Vec::new();
        for _ in 0..40 {
            bytes.extend_from_slice(&[0x01, 0x01]);
        }
        bytes.push(0x00);
        assert!(decode_data(&bytes).is_err());
    }

    #[test]
    fn test_decode_optional() {
        let mut decoder = AxdrDecoder::new(&[0x01, 0x07, 0x00]);
        assert_eq!(decoder.decode_optional(|d| d.decode_u8()).unwrap(), Some(7));
        assert_eq!(decoder.decode_optional(|d| d.decode_u8()).unwrap(), None);
        assert!(decoder.is_empty());
    }
}
