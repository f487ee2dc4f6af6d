//! A-XDR types for DLMS/COSEM

use crate::error::{DlmsError, DlmsResult};

/// A-XDR tag values of the `Data` CHOICE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxdrTag {
    Null = 0x00,
    Array = 0x01,
    Structure = 0x02,
    Boolean = 0x03,
    BitString = 0x04,
    Integer32 = 0x05,
    Unsigned32 = 0x06,
    OctetString = 0x09,
    VisibleString = 0x0A,
    Utf8String = 0x0C,
    Bcd = 0x0D,
    Integer8 = 0x0F,
    Integer16 = 0x10,
    Unsigned8 = 0x11,
    Unsigned16 = 0x12,
    Integer64 = 0x14,
    Unsigned64 = 0x15,
    Enumerate = 0x16,
    Float32 = 0x17,
    Float64 = 0x18,
}

impl AxdrTag {
    pub fn from_u8(value: u8) -> DlmsResult<Self> {
        Ok(match value {
            0x00 => AxdrTag::Null,
            0x01 => AxdrTag::Array,
            0x02 => AxdrTag::Structure,
            0x03 => AxdrTag::Boolean,
            0x04 => AxdrTag::BitString,
            0x05 => AxdrTag::Integer32,
            0x06 => AxdrTag::Unsigned32,
            0x09 => AxdrTag::OctetString,
            0x0A => AxdrTag::VisibleString,
            0x0C => AxdrTag::Utf8String,
            0x0D => AxdrTag::Bcd,
            0x0F => AxdrTag::Integer8,
            0x10 => AxdrTag::Integer16,
            0x11 => AxdrTag::Unsigned8,
            0x12 => AxdrTag::Unsigned16,
            0x14 => AxdrTag::Integer64,
            0x15 => AxdrTag::Unsigned64,
            0x16 => AxdrTag::Enumerate,
            0x17 => AxdrTag::Float32,
            0x18 => AxdrTag::Float64,
            _ => {
                return Err(DlmsError::ProtocolDecode(format!(
                    "Unknown A-XDR tag: 0x{:02X}",
                    value
                )));
            }
        })
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Variable-length length field shared by A-XDR and BER
///
/// Short form is a single byte below 0x80; long form is `0x80 | n` followed
/// by `n` big-endian length bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthEncoding;

impl LengthEncoding {
    /// Append the encoding of `length` to `out`.
    pub fn encode_into(length: usize, out: &mut Vec<u8>) {
        if length < 0x80 {
            out.push(length as u8);
            return;
        }
        let be = length.to_be_bytes();
        let skip = be.iter().take_while(|&&b| b == 0).count();
        out.push(0x80 | (be.len() - skip) as u8);
        out.extend_from_slice(&be[skip..]);
    }

    pub fn encode(length: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(3);
        Self::encode_into(length, &mut out);
        out
    }

    /// Decode a length at the start of `data`, returning `(length, bytes consumed)`.
    pub fn decode(data: &[u8]) -> DlmsResult<(usize, usize)> {
        let first = *data
            .first()
            .ok_or_else(|| DlmsError::ProtocolDecode("Missing length byte".to_string()))?;
        if first & 0x80 == 0 {
            return Ok((first as usize, 1));
        }
        let count = (first & 0x7F) as usize;
        if count == 0 || count > 4 {
            return Err(DlmsError::ProtocolDecode(format!(
                "Unsupported length-of-length: {}",
                count
            )));
        }
        let bytes = data.get(1..1 + count).ok_or_else(|| {
            DlmsError::ProtocolDecode("Truncated long-form length".to_string())
        })?;
        let length = bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
        Ok((length, 1 + count))
    }
}
