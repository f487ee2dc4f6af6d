//! BER encoder for ASN.1 structures

use crate::axdr::types::LengthEncoding;
use crate::ber::types::{encode_oid, BerTag, OBJECT_IDENTIFIER, OCTET_STRING};
use crate::error::DlmsResult;

/// BER encoder for definite-length TLV structures
///
/// Constructed values are built with a nested encoder and written through
/// [`BerEncoder::encode_constructed`], so lengths are always exact.
#[derive(Debug, Default)]
pub struct BerEncoder {
    buffer: Vec<u8>,
}

impl BerEncoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encode a TLV (Tag-Length-Value) triplet
    pub fn encode_tlv(&mut self, tag: BerTag, value: &[u8]) {
        self.buffer.push(tag.to_byte());
        LengthEncoding::encode_into(value.len(), &mut self.buffer);
        self.buffer.extend_from_slice(value);
    }

    /// Encode a constructed value whose content is produced by `build`.
    pub fn encode_constructed(
        &mut self,
        tag: BerTag,
        build: impl FnOnce(&mut BerEncoder) -> DlmsResult<()>,
    ) -> DlmsResult<()> {
        let mut inner = BerEncoder::new();
        build(&mut inner)?;
        self.encode_tlv(tag, &inner.buffer);
        Ok(())
    }

    /// `tag { OBJECT IDENTIFIER }`, the explicit-tagged form used by ACSE.
    pub fn encode_explicit_oid(&mut self, tag: BerTag, arcs: &[u32]) -> DlmsResult<()> {
        let content = encode_oid(arcs)?;
        self.encode_constructed(tag, |inner| {
            inner.encode_tlv(OBJECT_IDENTIFIER, &content);
            Ok(())
        })
    }

    /// Implicitly tagged OBJECT IDENTIFIER.
    pub fn encode_implicit_oid(&mut self, tag: BerTag, arcs: &[u32]) -> DlmsResult<()> {
        let content = encode_oid(arcs)?;
        self.encode_tlv(tag, &content);
        Ok(())
    }

    /// `tag { OCTET STRING }`.
    pub fn encode_explicit_octet_string(&mut self, tag: BerTag, value: &[u8]) -> DlmsResult<()> {
        self.encode_constructed(tag, |inner| {
            inner.encode_tlv(OCTET_STRING, value);
            Ok(())
        })
    }

    /// Small non-negative INTEGER content (one octet for values below 128).
    pub fn encode_integer(&mut self, tag: BerTag, value: u8) {
        if value < 0x80 {
            self.encode_tlv(tag, &[value]);
        } else {
            self.encode_tlv(tag, &[0x00, value]);
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}
