//! HDLC parameter negotiation (SNRM/UA information field)
//!
//! ```text
//! 81 80 len | 05 n max-info-tx | 06 n max-info-rx | 07 n window-tx | 08 n window-rx
//! ```
//!
//! Values are 1, 2 or 4 bytes, big-endian. Every field is optional; a missing
//! field takes the default of 128 bytes or a window of 1.

use crate::error::{DlmsError, DlmsResult};
use serde::{Deserialize, Serialize};

const FORMAT_IDENTIFIER: u8 = 0x81;
const GROUP_IDENTIFIER: u8 = 0x80;
const MAX_INFO_TX: u8 = 0x05;
const MAX_INFO_RX: u8 = 0x06;
const WINDOW_TX: u8 = 0x07;
const WINDOW_RX: u8 = 0x08;

/// Default maximum information field length
pub const DEFAULT_MAX_INFORMATION_LENGTH: u16 = 128;
/// Default window size
pub const DEFAULT_WINDOW_SIZE: u8 = 1;

/// HDLC link parameters, seen from the side that holds them
///
/// `*_tx` limits what this side sends, `*_rx` what it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HdlcParameters {
    pub max_information_field_length_tx: u16,
    pub max_information_field_length_rx: u16,
    pub window_size_tx: u8,
    pub window_size_rx: u8,
}

impl Default for HdlcParameters {
    fn default() -> Self {
        Self {
            max_information_field_length_tx: DEFAULT_MAX_INFORMATION_LENGTH,
            max_information_field_length_rx: DEFAULT_MAX_INFORMATION_LENGTH,
            window_size_tx: DEFAULT_WINDOW_SIZE,
            window_size_rx: DEFAULT_WINDOW_SIZE,
        }
    }
}

impl HdlcParameters {
    pub fn new(max_information_length: u16, window_size: u8) -> Self {
        Self {
            max_information_field_length_tx: max_information_length,
            max_information_field_length_rx: max_information_length,
            window_size_tx: window_size,
            window_size_rx: window_size,
        }
    }

    /// The same limits seen from the peer.
    pub fn reversed(&self) -> Self {
        Self {
            max_information_field_length_tx: self.max_information_field_length_rx,
            max_information_field_length_rx: self.max_information_field_length_tx,
            window_size_tx: self.window_size_rx,
            window_size_rx: self.window_size_tx,
        }
    }

    /// Per-direction minimum of our capability and the peer's proposal.
    ///
    /// `proposal` is expressed from the peer's side, as carried in its frame.
    pub fn negotiate(&self, proposal: &HdlcParameters) -> Self {
        let peer = proposal.reversed();
        Self {
            max_information_field_length_tx: self
                .max_information_field_length_tx
                .min(peer.max_information_field_length_tx),
            max_information_field_length_rx: self
                .max_information_field_length_rx
                .min(peer.max_information_field_length_rx),
            window_size_tx: self.window_size_tx.min(peer.window_size_tx),
            window_size_rx: self.window_size_rx.min(peer.window_size_rx),
        }
    }

    /// Encode as the negotiation information field
    pub fn encode(&self) -> Vec<u8> {
        let mut group = Vec::with_capacity(20);
        push_parameter(&mut group, MAX_INFO_TX, self.max_information_field_length_tx as u32);
        push_parameter(&mut group, MAX_INFO_RX, self.max_information_field_length_rx as u32);
        push_parameter(&mut group, WINDOW_TX, self.window_size_tx as u32);
        push_parameter(&mut group, WINDOW_RX, self.window_size_rx as u32);

        let mut out = Vec::with_capacity(group.len() + 3);
        out.push(FORMAT_IDENTIFIER);
        out.push(GROUP_IDENTIFIER);
        out.push(group.len() as u8);
        out.extend_from_slice(&group);
        out
    }

    /// Decode a negotiation information field; empty means all defaults.
    ///
    /// # Errors
    /// `FrameInvalid` for wrong identifiers, truncated fields, value widths
    /// other than 1, 2 or 4, zero values or values out of range.
    pub fn decode(info_field: &[u8]) -> DlmsResult<Self> {
        let mut parameters = Self::default();
        if info_field.is_empty() {
            return Ok(parameters);
        }
        let (&[format, group, length], rest) = info_field
            .split_first_chunk::<3>()
            .ok_or_else(|| malformed("header truncated"))?;
        if format != FORMAT_IDENTIFIER || group != GROUP_IDENTIFIER {
            return Err(malformed(&format!("identifiers 0x{:02X} 0x{:02X}", format, group)));
        }
        if length as usize != rest.len() {
            return Err(malformed(&format!(
                "group length {} with {} byte(s) present",
                length,
                rest.len()
            )));
        }

        let mut pos = 0;
        while pos < rest.len() {
            let id = rest[pos];
            let width = *rest.get(pos + 1).ok_or_else(|| malformed("parameter length missing"))? as usize;
            if !matches!(width, 1 | 2 | 4) {
                return Err(malformed(&format!("parameter 0x{:02X} has width {}", id, width)));
            }
            let bytes = rest
                .get(pos + 2..pos + 2 + width)
                .ok_or_else(|| malformed("parameter value truncated"))?;
            let value = bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
            if value == 0 {
                return Err(malformed(&format!("parameter 0x{:02X} is zero", id)));
            }
            match id {
                MAX_INFO_TX => parameters.max_information_field_length_tx = to_length(value)?,
                MAX_INFO_RX => parameters.max_information_field_length_rx = to_length(value)?,
                WINDOW_TX => parameters.window_size_tx = to_window(value)?,
                WINDOW_RX => parameters.window_size_rx = to_window(value)?,
                other => log::debug!("Ignoring HDLC parameter 0x{:02X}", other),
            }
            pos += 2 + width;
        }
        Ok(parameters)
    }
}

fn malformed(reason: &str) -> DlmsError {
    DlmsError::FrameInvalid(format!("Malformed HDLC parameters: {}", reason))
}

fn push_parameter(out: &mut Vec<u8>, id: u8, value: u32) {
    out.push(id);
    if value <= 0xFF {
        out.push(1);
        out.push(value as u8);
    } else if value <= 0xFFFF {
        out.push(2);
        out.extend_from_slice(&(value as u16).to_be_bytes());
    } else {
        out.push(4);
        out.extend_from_slice(&value.to_be_bytes());
    }
}

fn to_length(value: u32) -> DlmsResult<u16> {
    u16::try_from(value).map_err(|_| malformed(&format!("information length {}", value)))
}

fn to_window(value: u32) -> DlmsResult<u8> {
    match u8::try_from(value) {
        Ok(window) if window <= 7 => Ok(window),
        _ => Err(malformed(&format!("window size {}", value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hdlc_parameters_default() {
        let params = HdlcParameters::default();
        assert_eq!(params.max_information_field_length_tx, 128);
        assert_eq!(params.window_size_tx, 1);
        assert_eq!(HdlcParameters::decode(&[]).unwrap(), params);
    }

    #[test]
    fn test_encode_layout() {
        let params = HdlcParameters {
            max_information_field_length_tx: 512,
            max_information_field_length_rx: 128,
            window_size_tx: 1,
            window_size_rx: 1,
        };
        assert_eq!(
            params.encode(),
            vec![
                0x81, 0x80, 0x0D, 0x05, 0x02, 0x02, 0x00, 0x06, 0x01, 0x80, 0x07, 0x01, 0x01, 0x08,
                0x01, 0x01
            ]
        );
        assert_eq!(HdlcParameters::decode(&params.encode()).unwrap(), params);
    }

    #[test]
    fn test_decode_four_byte_windows() {
        let field = [
            0x81, 0x80, 0x14, 0x05, 0x02, 0x00, 0xF8, 0x06, 0x02, 0x00, 0xF8, 0x07, 0x04, 0x00,
            0x00, 0x00, 0x01, 0x08, 0x04, 0x00, 0x00, 0x00, 0x01,
        ];
        let params = HdlcParameters::decode(&field).unwrap();
        assert_eq!(params, HdlcParameters::new(248, 1));
    }

    #[test]
    fn test_negotiation_takes_minimum_per_direction() {
        let server = HdlcParameters {
            max_information_field_length_tx: 256,
            max_information_field_length_rx: 256,
            window_size_tx: 1,
            window_size_rx: 1,
        };
        // Client sends up to 128 but can receive 1024
        let client_proposal = HdlcParameters {
            max_information_field_length_tx: 128,
            max_information_field_length_rx: 1024,
            window_size_tx: 7,
            window_size_rx: 7,
        };
        let negotiated = server.negotiate(&client_proposal);
        assert_eq!(negotiated.max_information_field_length_tx, 256);
        assert_eq!(negotiated.max_information_field_length_rx, 128);
        assert_eq!(negotiated.window_size_tx, 1);
        assert_eq!(negotiated.window_size_rx, 1);
    }

    #[test]
    fn test_malformed_parameters() {
        assert!(HdlcParameters::decode(&[0x81]).is_err());
        assert!(HdlcParameters::decode(&[0x82, 0x80, 0x00]).is_err());
        assert!(HdlcParameters::decode(&[0x81, 0x80, 0x03, 0x05, 0x01]).is_err());
        assert!(HdlcParameters::decode(&[0x81, 0x80, 0x05, 0x05, 0x03, 0x00, 0x00, 0x80]).is_err());
        assert!(HdlcParameters::decode(&[0x81, 0x80, 0x03, 0x05, 0x01, 0x00]).is_err());
        assert!(HdlcParameters::decode(&[0x81, 0x80, 0x03, 0x07, 0x01, 0x09]).is_err());
    }
}
