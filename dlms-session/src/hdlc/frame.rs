//! HDLC frame structure and encoding/decoding
//!
//! ```text
//! 7E | format (2) | dst | src | control | [HCS (2) | information] | FCS (2) | 7E
//! ```
//!
//! The frame format is `1010 S LLL LLLLLLLL`: type 3, the segmentation bit
//! and an 11-bit length counting every byte between the flags. The HCS
//! covers format, addresses and control; the FCS covers everything before it.

use crate::error::{DlmsError, DlmsResult};
use crate::hdlc::address::{HdlcAddress, HdlcAddressPair};
use crate::hdlc::fcs::FcsCalc;
use std::fmt;

/// HDLC frame flag
pub const FLAG: u8 = 0x7E;

/// Logical Link Control (LLC) header of requests
pub const LLC_REQUEST: [u8; 3] = [0xE6, 0xE6, 0x00];

/// Logical Link Control (LLC) header of responses
pub const LLC_RESPONSE: [u8; 3] = [0xE6, 0xE7, 0x00];

/// Largest length the 11-bit frame format field can express
pub const MAX_FRAME_LENGTH: usize = 0x07FF;

const FORMAT_TYPE_3: u8 = 0xA0;
const SEGMENTATION_BIT: u8 = 0x08;
const POLL_FINAL_BIT: u8 = 0x10;

/// HDLC frame type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Information,
    ReceiveReady,
    ReceiveNotReady,
    SetNormalResponseMode,
    Disconnect,
    UnnumberedAcknowledge,
    DisconnectMode,
    FrameReject,
    UnnumberedInformation,
}

impl FrameType {
    /// Get frame type from control byte, ignoring the poll/final bit
    pub fn from_control_byte(control_byte: u8) -> Option<Self> {
        if control_byte & 0x01 == 0 {
            return Some(FrameType::Information);
        }
        match control_byte & 0x0F {
            0x01 => return Some(FrameType::ReceiveReady),
            0x05 => return Some(FrameType::ReceiveNotReady),
            _ => {}
        }
        match control_byte & !POLL_FINAL_BIT {
            0x83 => Some(FrameType::SetNormalResponseMode),
            0x43 => Some(FrameType::Disconnect),
            0x63 => Some(FrameType::UnnumberedAcknowledge),
            0x0F => Some(FrameType::DisconnectMode),
            0x87 => Some(FrameType::FrameReject),
            0x03 => Some(FrameType::UnnumberedInformation),
            _ => None,
        }
    }

    fn is_numbered(&self) -> bool {
        matches!(
            self,
            FrameType::Information | FrameType::ReceiveReady | FrameType::ReceiveNotReady
        )
    }
}

/// HDLC frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdlcFrame {
    frame_type: FrameType,
    address_pair: HdlcAddressPair,
    send_sequence: u8,
    receive_sequence: u8,
    poll_final: bool,
    segmented: bool,
    information_field: Vec<u8>,
}

impl HdlcFrame {
    /// Unnumbered frame (SNRM, UA, DISC, DM, FRMR, UI)
    pub fn new(address_pair: HdlcAddressPair, frame_type: FrameType, information_field: Vec<u8>) -> Self {
        Self {
            frame_type,
            address_pair,
            send_sequence: 0,
            receive_sequence: 0,
            poll_final: true,
            segmented: false,
            information_field,
        }
    }

    /// Information frame with N(S) and N(R) (mod 8)
    pub fn new_information(
        address_pair: HdlcAddressPair,
        information_field: Vec<u8>,
        send_sequence: u8,
        receive_sequence: u8,
        segmented: bool,
    ) -> Self {
        Self {
            frame_type: FrameType::Information,
            address_pair,
            send_sequence: send_sequence & 0x07,
            receive_sequence: receive_sequence & 0x07,
            poll_final: true,
            segmented,
            information_field,
        }
    }

    /// Receive Ready acknowledging everything before N(R)
    pub fn new_receive_ready(address_pair: HdlcAddressPair, receive_sequence: u8) -> Self {
        Self {
            frame_type: FrameType::ReceiveReady,
            address_pair,
            send_sequence: 0,
            receive_sequence: receive_sequence & 0x07,
            poll_final: true,
            segmented: false,
            information_field: Vec::new(),
        }
    }

    pub fn control_byte(&self) -> u8 {
        let pf = if self.poll_final { POLL_FINAL_BIT } else { 0 };
        let nr = self.receive_sequence << 5;
        match self.frame_type {
            FrameType::Information => nr | pf | (self.send_sequence << 1),
            FrameType::ReceiveReady => nr | pf | 0x01,
            FrameType::ReceiveNotReady => nr | pf | 0x05,
            FrameType::SetNormalResponseMode => 0x83 | pf,
            FrameType::Disconnect => 0x43 | pf,
            FrameType::UnnumberedAcknowledge => 0x63 | pf,
            FrameType::DisconnectMode => 0x0F | pf,
            FrameType::FrameReject => 0x87 | pf,
            FrameType::UnnumberedInformation => 0x03 | pf,
        }
    }

    fn header_length(&self) -> usize {
        2 + self.address_pair.destination().byte_length() + self.address_pair.source().byte_length() + 1
    }

    /// Bytes between the flags
    pub fn length(&self) -> usize {
        let checks = if self.information_field.is_empty() { 2 } else { 4 };
        self.header_length() + checks + self.information_field.len()
    }

    /// Encode the frame including both flags.
    pub fn encode(&self) -> DlmsResult<Vec<u8>> {
        let length = self.length();
        if length > MAX_FRAME_LENGTH {
            return Err(DlmsError::FrameInvalid(format!(
                "Frame length {} exceeds {}",
                length, MAX_FRAME_LENGTH
            )));
        }

        let mut result = Vec::with_capacity(length + 2);
        result.push(FLAG);
        let segmentation = if self.segmented { SEGMENTATION_BIT } else { 0 };
        result.push(FORMAT_TYPE_3 | segmentation | ((length >> 8) as u8 & 0x07));
        result.push((length & 0xFF) as u8);
        result.extend_from_slice(&self.address_pair.destination().encode());
        result.extend_from_slice(&self.address_pair.source().encode());
        result.push(self.control_byte());

        if !self.information_field.is_empty() {
            let hcs = FcsCalc::checksum(&result[1..]);
            result.extend_from_slice(&hcs);
            result.extend_from_slice(&self.information_field);
        }
        let fcs = FcsCalc::checksum(&result[1..]);
        result.extend_from_slice(&fcs);
        result.push(FLAG);
        Ok(result)
    }

    /// Decode the bytes between the flags of one frame.
    ///
    /// # Errors
    /// `FrameInvalid` for a bad format, length, address, control byte, HCS or FCS.
    pub fn decode(frame: &[u8]) -> DlmsResult<Self> {
        if frame.len() < 7 {
            return Err(DlmsError::FrameInvalid(format!("Frame too short: {} byte(s)", frame.len())));
        }
        if (frame[0] & 0xF0) != FORMAT_TYPE_3 {
            return Err(DlmsError::FrameInvalid(format!("Illegal frame format 0x{:02X}", frame[0])));
        }
        let segmented = (frame[0] & SEGMENTATION_BIT) != 0;
        let length = (u16::from_be_bytes([frame[0], frame[1]]) & MAX_FRAME_LENGTH as u16) as usize;
        if length != frame.len() {
            return Err(DlmsError::FrameInvalid(format!(
                "Frame format length {} does not match {} received byte(s)",
                length,
                frame.len()
            )));
        }

        let mut pos = 2;
        let (destination, n) = HdlcAddress::read_from(&frame[pos..])?;
        pos += n;
        let (source, n) = HdlcAddress::read_from(&frame[pos..])?;
        pos += n;

        let control = *frame
            .get(pos)
            .ok_or_else(|| DlmsError::FrameInvalid("Frame too short for control field".to_string()))?;
        pos += 1;
        let frame_type = FrameType::from_control_byte(control)
            .ok_or_else(|| DlmsError::FrameInvalid(format!("Control field unknown: 0x{:02X}", control)))?;

        FcsCalc::verify(frame)?;
        let information_field = if frame.len() == pos + 2 {
            Vec::new()
        } else {
            if frame.len() < pos + 4 {
                return Err(DlmsError::FrameInvalid("Frame too short for HCS".to_string()));
            }
            FcsCalc::verify(&frame[..pos + 2])
                .map_err(|e| DlmsError::FrameInvalid(format!("HCS mismatch: {}", e)))?;
            frame[pos + 2..frame.len() - 2].to_vec()
        };

        let (send_sequence, receive_sequence) = if frame_type.is_numbered() {
            ((control >> 1) & 0x07, control >> 5)
        } else {
            (0, 0)
        };

        Ok(Self {
            frame_type,
            address_pair: HdlcAddressPair::new(source, destination),
            send_sequence,
            receive_sequence,
            poll_final: (control & POLL_FINAL_BIT) != 0,
            segmented,
            information_field,
        })
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    pub fn information_field(&self) -> &[u8] {
        &self.information_field
    }

    pub fn into_information_field(self) -> Vec<u8> {
        self.information_field
    }

    /// N(S), meaningful for I frames
    pub fn send_sequence(&self) -> u8 {
        self.send_sequence
    }

    /// N(R), meaningful for I, RR and RNR frames
    pub fn receive_sequence(&self) -> u8 {
        self.receive_sequence
    }

    pub fn is_poll_final(&self) -> bool {
        self.poll_final
    }

    /// More segments of the same message follow
    pub fn is_segmented(&self) -> bool {
        self.segmented
    }

    pub fn address_pair(&self) -> HdlcAddressPair {
        self.address_pair
    }
}

impl fmt::Display for HdlcFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} src={} dst={}",
            self.frame_type,
            self.address_pair.source(),
            self.address_pair.destination()
        )?;
        if self.frame_type.is_numbered() {
            write!(f, " N(S)={} N(R)={}", self.send_sequence, self.receive_sequence)?;
        }
        if self.segmented {
            write!(f, " segmented")?;
        }
        write!(f, " info={}", self.information_field.len())
    }
}
