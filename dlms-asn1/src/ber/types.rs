//! BER encoding types (tag and object identifier)

use crate::error::{DlmsError, DlmsResult};

/// BER Tag Class (bits 8-7 of the identifier octet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BerTagClass {
    Universal = 0,
    Application = 1,
    ContextSpecific = 2,
    Private = 3,
}

impl BerTagClass {
    pub fn from_bits(bits: u8) -> Self {
        match (bits >> 6) & 0x03 {
            0 => BerTagClass::Universal,
            1 => BerTagClass::Application,
            2 => BerTagClass::ContextSpecific,
            _ => BerTagClass::Private,
        }
    }

    pub fn to_bits(self) -> u8 {
        (self as u8) << 6
    }
}

/// BER Tag
///
/// Only the single-octet form (numbers 0-30) is used by the ACSE APDUs;
/// the high-tag-number form is rejected on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BerTag {
    class: BerTagClass,
    constructed: bool,
    number: u8,
}

impl BerTag {
    pub const fn new(class: BerTagClass, constructed: bool, number: u8) -> Self {
        Self {
            class,
            constructed,
            number,
        }
    }

    pub const fn universal(constructed: bool, number: u8) -> Self {
        Self::new(BerTagClass::Universal, constructed, number)
    }

    pub const fn application(constructed: bool, number: u8) -> Self {
        Self::new(BerTagClass::Application, constructed, number)
    }

    pub const fn context_specific(constructed: bool, number: u8) -> Self {
        Self::new(BerTagClass::ContextSpecific, constructed, number)
    }

    pub fn class(&self) -> BerTagClass {
        self.class
    }

    pub fn is_constructed(&self) -> bool {
        self.constructed
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn to_byte(self) -> u8 {
        self.class.to_bits() | if self.constructed { 0x20 } else { 0 } | (self.number & 0x1F)
    }

    pub fn from_byte(byte: u8) -> DlmsResult<Self> {
        let number = byte & 0x1F;
        if number == 0x1F {
            return Err(DlmsError::Asn1Encoding(format!(
                "High tag number form not supported: 0x{:02X}",
                byte
            )));
        }
        Ok(Self {
            class: BerTagClass::from_bits(byte),
            constructed: byte & 0x20 != 0,
            number,
        })
    }
}

/// Universal OCTET STRING
pub const OCTET_STRING: BerTag = BerTag::universal(false, 4);
/// Universal INTEGER
pub const INTEGER: BerTag = BerTag::universal(false, 2);
/// Universal OBJECT IDENTIFIER
pub const OBJECT_IDENTIFIER: BerTag = BerTag::universal(false, 6);

/// Encode object identifier content octets (no tag or length).
pub fn encode_oid(arcs: &[u32]) -> DlmsResult<Vec<u8>> {
    if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] > 39) {
        return Err(DlmsError::Asn1Encoding(format!("Invalid OID: {:?}", arcs)));
    }
    let mut out = Vec::with_capacity(arcs.len() + 2);
    push_base128(arcs[0] * 40 + arcs[1], &mut out);
    for &arc in &arcs[2..] {
        push_base128(arc, &mut out);
    }
    Ok(out)
}

fn push_base128(value: u32, out: &mut Vec<u8>) {
    let mut groups = [0u8; 5];
    let mut n = 0;
    let mut v = value;
    loop {
        groups[n] = (v & 0x7F) as u8;
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        out.push(groups[i] | if i > 0 { 0x80 } else { 0 });
    }
}

/// Decode object identifier content octets into arcs.
pub fn decode_oid(content: &[u8]) -> DlmsResult<Vec<u32>> {
    let mut values = Vec::new();
    let mut current: u32 = 0;
    let mut pending = false;
    for &byte in content {
        if current > (u32::MAX >> 7) {
            return Err(DlmsError::Asn1Encoding("OID arc overflow".to_string()));
        }
        current = (current << 7) | u32::from(byte & 0x7F);
        pending = byte & 0x80 != 0;
        if !pending {
            values.push(current);
            current = 0;
        }
    }
    if pending || values.is_empty() {
        return Err(DlmsError::Asn1Encoding("Truncated OID".to_string()));
    }
    let first = values[0];
    let (a, b) = if first < 80 { (first / 40, first % 40) } else { (2, first - 80) };
    let mut arcs = Vec::with_capacity(values.len() + 1);
    arcs.push(a);
    arcs.push(b);
    arcs.extend_from_slice(&values[1..]);
    Ok(arcs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_bytes() {
        assert_eq!(BerTag::application(true, 0).to_byte(), 0x60);
        assert_eq!(BerTag::context_specific(true, 30).to_byte(), 0xBE);
        assert_eq!(BerTag::context_specific(false, 10).to_byte(), 0x8A);
        let tag = BerTag::from_byte(0xA1).unwrap();
        assert_eq!(tag.class(), BerTagClass::ContextSpecific);
        assert!(tag.is_constructed());
        assert_eq!(tag.number(), 1);
        assert!(BerTag::from_byte(0xBF).is_err());
    }

    #[test]
    fn test_dlms_context_oid() {
        let content = encode_oid(&[2, 16, 756, 5, 8, 1, 1]).unwrap();
        assert_eq!(content, vec![0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x01]);
        assert_eq!(decode_oid(&content).unwrap(), vec![2, 16, 756, 5, 8, 1, 1]);
        assert!(decode_oid(&[0x60, 0x85]).is_err());
    }
}
