//! Bit string value carried in `DataObject::BitString` and the conformance block

use crate::error::{DlmsError, DlmsResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bit string, most significant bit of the first byte is bit 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitString {
    #[serde(with = "serde_bytes")]
    bytes: Vec<u8>,
    num_bits: usize,
}

impl BitString {
    /// Build a bit string over `bytes` holding `num_bits` significant bits.
    ///
    /// # Errors
    /// Returns `InvalidData` if `bytes` cannot hold `num_bits` bits.
    pub fn new(bytes: Vec<u8>, num_bits: usize) -> DlmsResult<Self> {
        if num_bits > bytes.len() * 8 {
            return Err(DlmsError::InvalidData(format!(
                "{} bytes cannot hold {} bits",
                bytes.len(),
                num_bits
            )));
        }
        Ok(Self { bytes, num_bits })
    }

    /// All-zero bit string of the given width.
    pub fn zeroed(num_bits: usize) -> Self {
        Self {
            bytes: vec![0u8; num_bits.div_ceil(8)],
            num_bits,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Read the bit at `index`.
    pub fn get_bit(&self, index: usize) -> DlmsResult<bool> {
        self.check_index(index)?;
        Ok((self.bytes[index / 8] >> (7 - index % 8)) & 1 == 1)
    }

    /// Write the bit at `index`.
    pub fn set_bit(&mut self, index: usize, value: bool) -> DlmsResult<()> {
        self.check_index(index)?;
        let mask = 1u8 << (7 - index % 8);
        if value {
            self.bytes[index / 8] |= mask;
        } else {
            self.bytes[index / 8] &= !mask;
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> DlmsResult<()> {
        if index >= self.num_bits {
            return Err(DlmsError::InvalidData(format!(
                "Bit index {} out of bounds (num_bits: {})",
                index, self.num_bits
            )));
        }
        Ok(())
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.num_bits {
            let bit = (self.bytes[i / 8] >> (7 - i % 8)) & 1;
            write!(f, "{}", bit)?;
        }
        Ok(())
    }
}
