//! A-XDR encoder for DLMS/COSEM

use crate::axdr::types::{AxdrTag, LengthEncoding};
use dlms_core::datatypes::{BitString, DataObject};

/// A-XDR encoder accumulating into an owned buffer
///
/// The xDLMS PDU encoders in `dlms-application` drive the primitive
/// methods directly; `encode_data_object` writes a full `Data` CHOICE.
#[derive(Debug, Default)]
pub struct AxdrEncoder {
    buffer: Vec<u8>,
}

impl AxdrEncoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encode a tagged `Data` value.
    pub fn encode_data_object(&mut self, obj: &DataObject) {
        match obj {
            DataObject::Null => self.encode_tag(AxdrTag::Null),
            DataObject::Boolean(b) => {
                self.encode_tag(AxdrTag::Boolean);
                self.encode_bool(*b);
            }
            DataObject::BitString(bs) => {
                self.encode_tag(AxdrTag::BitString);
                self.encode_bit_string(bs);
            }
            DataObject::Integer8(v) => {
                self.encode_tag(AxdrTag::Integer8);
                self.encode_u8(*v as u8);
            }
            DataObject::Integer16(v) => {
                self.encode_tag(AxdrTag::Integer16);
                self.encode_bytes(&v.to_be_bytes());
            }
            DataObject::Integer32(v) => {
                self.encode_tag(AxdrTag::Integer32);
                self.encode_bytes(&v.to_be_bytes());
            }
            DataObject::Integer64(v) => {
                self.encode_tag(AxdrTag::Integer64);
                self.encode_bytes(&v.to_be_bytes());
            }
            DataObject::Unsigned8(v) => {
                self.encode_tag(AxdrTag::Unsigned8);
                self.encode_u8(*v);
            }
            DataObject::Unsigned16(v) => {
                self.encode_tag(AxdrTag::Unsigned16);
                self.encode_u16(*v);
            }
            DataObject::Unsigned32(v) => {
                self.encode_tag(AxdrTag::Unsigned32);
                self.encode_u32(*v);
            }
            DataObject::Unsigned64(v) => {
                self.encode_tag(AxdrTag::Unsigned64);
                self.encode_bytes(&v.to_be_bytes());
            }
            DataObject::Float32(v) => {
                self.encode_tag(AxdrTag::Float32);
                self.encode_bytes(&v.to_bits().to_be_bytes());
            }
            DataObject::Float64(v) => {
                self.encode_tag(AxdrTag::Float64);
                self.encode_bytes(&v.to_bits().to_be_bytes());
            }
            DataObject::Enumerate(v) => {
                self.encode_tag(AxdrTag::Enumerate);
                self.encode_u8(*v);
            }
            DataObject::Bcd(v) => {
                self.encode_tag(AxdrTag::Bcd);
                self.encode_u8(*v);
            }
            DataObject::OctetString(s) => {
                self.encode_tag(AxdrTag::OctetString);
                self.encode_octet_string(s);
            }
            DataObject::VisibleString(s) => {
                self.encode_tag(AxdrTag::VisibleString);
                self.encode_octet_string(s);
            }
            DataObject::Utf8String(s) => {
                self.encode_tag(AxdrTag::Utf8String);
                self.encode_octet_string(s);
            }
            DataObject::Array(items) => {
                self.encode_tag(AxdrTag::Array);
                self.encode_sequence(items);
            }
            DataObject::Structure(items) => {
                self.encode_tag(AxdrTag::Structure);
                self.encode_sequence(items);
            }
        }
    }

    fn encode_sequence(&mut self, items: &[DataObject]) {
        self.encode_length(items.len());
        for item in items {
            self.encode_data_object(item);
        }
    }

    pub fn encode_tag(&mut self, tag: AxdrTag) {
        self.buffer.push(tag.to_u8());
    }

    pub fn encode_bool(&mut self, value: bool) {
        self.buffer.push(u8::from(value));
    }

    pub fn encode_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn encode_i8(&mut self, value: i8) {
        self.buffer.push(value as u8);
    }

    pub fn encode_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn encode_i16(&mut self, value: i16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn encode_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Variable-length count or length prefix.
    pub fn encode_length(&mut self, length: usize) {
        LengthEncoding::encode_into(length, &mut self.buffer);
    }

    /// Length-prefixed octet string (no tag).
    pub fn encode_octet_string(&mut self, value: &[u8]) {
        self.encode_length(value.len());
        self.buffer.extend_from_slice(value);
    }

    /// Bit count followed by the packed bits (no tag).
    pub fn encode_bit_string(&mut self, bits: &BitString) {
        self.encode_length(bits.num_bits());
        let used = bits.num_bits().div_ceil(8);
        self.buffer.extend_from_slice(&bits.as_bytes()[..used]);
    }

    /// `OPTIONAL` marker: 0x00 when absent, 0x01 followed by the value when present.
    pub fn encode_optional<T>(&mut self, value: Option<&T>, encode: impl FnOnce(&mut Self, &T)) {
        match value {
            Some(v) => {
                self.buffer.push(0x01);
                encode(self, v);
            }
            None => self.buffer.push(0x00),
        }
    }

    pub fn encode_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

/// Encode a single `Data` value into a fresh buffer.
pub fn encode_data(value: &DataObject) -> Vec<u8> {
    let mut encoder = AxdrEncoder::new();
    encoder.encode_data_object(value);
    encoder.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scalars() {
        assert_eq!(encode_data(&DataObject::Null), vec![0x00]);
        assert_eq!(encode_data(&DataObject::Boolean(true)), vec![0x03, 0x01]);
        assert_eq!(
            encode_data(&DataObject::Integer32(0x12345678)),
            vec![0x05, 0x12, 0x34, 0x56, 0x78]
        );
        assert_eq!(encode_data(&DataObject::Unsigned16(0x0102)), vec![0x12, 0x01, 0x02]);
    }

    #[test]
    fn test_encode_structure_of_octet_strings() {
        let value = DataObject::Structure(vec![
            DataObject::OctetString(vec![0xAA]),
            DataObject::Enumerate(3),
        ]);
        assert_eq!(encode_data(&value), vec![0x02, 0x02, 0x09, 0x01, 0xAA, 0x16, 0x03]);
    }

    #[test]
    fn test_encode_long_octet_string_uses_long_length() {
        let bytes = encode_data(&DataObject::OctetString(vec![0u8; 200]));
        assert_eq!(&bytes[..3], &[0x09, 0x81, 200]);
        assert_eq!(bytes.len(), 203);
    }

    #[test]
    fn test_encode_bit_string() {
        let bits = BitString::new(vec![0b1010_0000], 3).unwrap();
        assert_eq!(encode_data(&DataObject::BitString(bits)), vec![0x04, 0x03, 0xA0]);
    }
}
