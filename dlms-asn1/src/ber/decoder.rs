//! BER decoder for ASN.1 structures

use crate::axdr::types::LengthEncoding;
use crate::ber::types::{decode_oid, BerTag, OBJECT_IDENTIFIER, OCTET_STRING};
use crate::error::{DlmsError, DlmsResult};

/// Sequential TLV reader over a borrowed buffer
pub struct BerDecoder<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BerDecoder<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position >= self.buffer.len()
    }

    /// Read the next TLV, returning its tag and content octets.
    pub fn read_tlv(&mut self) -> DlmsResult<(BerTag, &'a [u8])> {
        let tag_byte = *self
            .buffer
            .get(self.position)
            .ok_or_else(|| DlmsError::Asn1Encoding("Missing BER tag".to_string()))?;
        let tag = BerTag::from_byte(tag_byte)?;
        let (length, consumed) = LengthEncoding::decode(&self.buffer[self.position + 1..])
            .map_err(|e| DlmsError::Asn1Encoding(e.to_string()))?;
        let start = self.position + 1 + consumed;
        let end = start
            .checked_add(length)
            .filter(|&end| end <= self.buffer.len())
            .ok_or_else(|| {
                DlmsError::Asn1Encoding(format!("BER value of tag 0x{:02X} is truncated", tag_byte))
            })?;
        self.position = end;
        Ok((tag, &self.buffer[start..end]))
    }

    /// Read a TLV and require it to carry `expected`.
    pub fn expect_tlv(&mut self, expected: BerTag) -> DlmsResult<&'a [u8]> {
        let (tag, content) = self.read_tlv()?;
        if tag != expected {
            return Err(DlmsError::Asn1Encoding(format!(
                "Expected tag 0x{:02X}, found 0x{:02X}",
                expected.to_byte(),
                tag.to_byte()
            )));
        }
        Ok(content)
    }
}

/// Content of `tag { OBJECT IDENTIFIER }` as arcs.
pub fn decode_explicit_oid(content: &[u8]) -> DlmsResult<Vec<u32>> {
    let mut inner = BerDecoder::new(content);
    decode_oid(inner.expect_tlv(OBJECT_IDENTIFIER)?)
}

/// Content of `tag { OCTET STRING }`.
pub fn decode_explicit_octet_string(content: &[u8]) -> DlmsResult<Vec<u8>> {
    let mut inner = BerDecoder::new(content);
    Ok(inner.expect_tlv(OCTET_STRING)?.to_vec())
}

/// Small non-negative INTEGER content.
pub fn decode_integer(content: &[u8]) -> DlmsResult<u8> {
    match content {
        [value] if *value < 0x80 => Ok(*value),
        [0x00, value] => Ok(*value),
        _ => Err(DlmsError::Asn1Encoding(format!(
            "Unsupported INTEGER content: {:02X?}",
            content
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_sequence_of_tlvs() {
        let data = [0x80, 0x01, 0x00, 0xA1, 0x03, 0x02, 0x01, 0x0D];
        let mut decoder = BerDecoder::new(&data);
        let (tag, content) = decoder.read_tlv().unwrap();
        assert_eq!(tag.to_byte(), 0x80);
        assert_eq!(content, &[0x00]);
        let (tag, content) = decoder.read_tlv().unwrap();
        assert_eq!(tag.to_byte(), 0xA1);
        assert_eq!(decode_integer(BerDecoder::new(content).read_tlv().unwrap().1).unwrap(), 13);
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_truncated_value() {
        let mut decoder = BerDecoder::new(&[0x04, 0x05, 0x01]);
        assert!(decoder.read_tlv().is_err());
    }
}
