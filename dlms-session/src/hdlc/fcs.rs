//! Frame Check Sequence (FCS) calculation for HDLC
//!
//! CRC-16/X.25: reflected polynomial 0x8408, initial value 0xFFFF, final
//! complement, transmitted least significant byte first. Running the
//! calculation over data followed by its transmitted FCS leaves the
//! residue 0xF0B8.

use crate::error::{DlmsError, DlmsResult};
use once_cell::sync::Lazy;

const INITIAL_FCS: u16 = 0xFFFF;
const GOOD_FCS: u16 = 0xF0B8;
const KEY: u16 = 0x8408; // Bit-reversed 0x1021

/// Precomputed FCS table
static FCS_TABLE: Lazy<[u16; 256]> = Lazy::new(|| {
    let mut table = [0u16; 256];
    for (b, entry) in table.iter_mut().enumerate() {
        let mut v = b as u16;
        for _ in 0..8 {
            v = if (v & 1) == 1 { (v >> 1) ^ KEY } else { v >> 1 };
        }
        *entry = v;
    }
    table
});

/// Frame Check Sequence calculator
#[derive(Debug, Clone)]
pub struct FcsCalc {
    fcs_value: u16,
}

impl FcsCalc {
    pub fn new() -> Self {
        Self {
            fcs_value: INITIAL_FCS,
        }
    }

    /// Reset the FCS value to initial state
    pub fn reset(&mut self) {
        self.fcs_value = INITIAL_FCS;
    }

    /// Update the FCS value with a single byte
    pub fn update(&mut self, data: u8) {
        self.fcs_value = (self.fcs_value >> 8) ^ FCS_TABLE[((self.fcs_value ^ data as u16) & 0xFF) as usize];
    }

    /// Update the FCS value with multiple bytes
    pub fn update_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.update(byte);
        }
    }

    /// Check sequence to transmit after the data fed so far (little-endian)
    pub fn fcs_value_bytes(&self) -> [u8; 2] {
        (self.fcs_value ^ 0xFFFF).to_le_bytes()
    }

    /// Validate data that was fed together with its trailing check sequence
    pub fn validate(&self) -> DlmsResult<()> {
        if self.fcs_value != GOOD_FCS {
            Err(DlmsError::FrameInvalid(format!(
                "FCS has wrong value: 0x{:04X}, expected 0x{:04X}",
                self.fcs_value, GOOD_FCS
            )))
        } else {
            Ok(())
        }
    }

    pub fn value(&self) -> u16 {
        self.fcs_value
    }

    /// Check sequence bytes for `data`.
    pub fn checksum(data: &[u8]) -> [u8; 2] {
        let mut calc = Self::new();
        calc.update_bytes(data);
        calc.fcs_value_bytes()
    }

    /// Verify `data` whose last two bytes are its check sequence.
    pub fn verify(data_with_fcs: &[u8]) -> DlmsResult<()> {
        let mut calc = Self::new();
        calc.update_bytes(data_with_fcs);
        calc.validate()
    }
}

impl Default for FcsCalc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fcs_check_value() {
        // CRC-16/X.25 check value over "123456789"
        let fcs = FcsCalc::checksum(b"123456789");
        assert_eq!(u16::from_le_bytes(fcs), 0x906E);
    }

    #[test]
    fn test_fcs_residue() {
        let data = [0xA0, 0x07, 0x03, 0x21, 0x93];
        let mut framed = data.to_vec();
        framed.extend_from_slice(&FcsCalc::checksum(&data));
        assert!(FcsCalc::verify(&framed).is_ok());

        framed[2] ^= 0x40;
        assert!(matches!(FcsCalc::verify(&framed), Err(DlmsError::FrameInvalid(_))));
    }

    #[test]
    fn test_snrm_reference_frame() {
        // 7E A0 07 03 21 93 0F 01 7E
        assert_eq!(FcsCalc::checksum(&[0xA0, 0x07, 0x03, 0x21, 0x93]), [0x0F, 0x01]);
    }

    #[test]
    fn test_fcs_reset() {
        let mut calc = FcsCalc::new();
        calc.update(0x01);
        calc.reset();
        assert_eq!(calc.value(), INITIAL_FCS);
    }
}
