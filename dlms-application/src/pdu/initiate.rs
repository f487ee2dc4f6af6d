//! xDLMS initiate negotiation
//!
//! The InitiateRequest travels in the AARQ user-information, the
//! InitiateResponse (or a ConfirmedServiceError) in the AARE. Both carry the
//! DLMS version, the 24-bit conformance block and a maximum receive PDU size.

use super::types::{expect_end, expect_tag, unknown_choice};
use dlms_asn1::{AxdrDecoder, AxdrEncoder};
use dlms_core::{DlmsError, DlmsResult};
use std::fmt;

/// DLMS protocol version number
pub const DLMS_VERSION_6: u8 = 6;

/// Largest max-receive-pdu-size that fits the u16 field
pub const MAX_PDU_SIZE: u16 = u16::MAX;

/// vaa-name of the current association when it uses logical names
pub const VAA_NAME_LN: u16 = 0x0007;
/// vaa-name of the current association when it uses short names
pub const VAA_NAME_SN: u16 = 0xFA00;

pub const INITIATE_REQUEST_TAG: u8 = 0x01;
pub const INITIATE_RESPONSE_TAG: u8 = 0x08;
pub const CONFIRMED_SERVICE_ERROR_TAG: u8 = 0x0E;

/// `[APPLICATION 31]` header of the conformance block: tag, length 4, no unused bits
const CONFORMANCE_HEADER: [u8; 4] = [0x5F, 0x1F, 0x04, 0x00];

/// Conformance block
///
/// Bit 0 of the ASN.1 BIT STRING is the most significant bit of the first of
/// the three bytes, so named bit `n` is mask `1 << (23 - n)` here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Conformance(u32);

impl Conformance {
    pub const GENERAL_PROTECTION: Self = Self::bit(1);
    pub const GENERAL_BLOCK_TRANSFER: Self = Self::bit(2);
    pub const READ: Self = Self::bit(3);
    pub const WRITE: Self = Self::bit(4);
    pub const UNCONFIRMED_WRITE: Self = Self::bit(5);
    pub const ATTRIBUTE0_SUPPORTED_WITH_SET: Self = Self::bit(8);
    pub const PRIORITY_MGMT_SUPPORTED: Self = Self::bit(9);
    pub const ATTRIBUTE0_SUPPORTED_WITH_GET: Self = Self::bit(10);
    pub const BLOCK_TRANSFER_WITH_GET_OR_READ: Self = Self::bit(11);
    pub const BLOCK_TRANSFER_WITH_SET_OR_WRITE: Self = Self::bit(12);
    pub const BLOCK_TRANSFER_WITH_ACTION: Self = Self::bit(13);
    pub const MULTIPLE_REFERENCES: Self = Self::bit(14);
    pub const INFORMATION_REPORT: Self = Self::bit(15);
    pub const DATA_NOTIFICATION: Self = Self::bit(16);
    pub const ACCESS: Self = Self::bit(17);
    pub const PARAMETERIZED_ACCESS: Self = Self::bit(18);
    pub const GET: Self = Self::bit(19);
    pub const SET: Self = Self::bit(20);
    pub const SELECTIVE_ACCESS: Self = Self::bit(21);
    pub const EVENT_NOTIFICATION: Self = Self::bit(22);
    pub const ACTION: Self = Self::bit(23);

    const MASK: u32 = 0x00FF_FFFF;

    const fn bit(n: u32) -> Self {
        Self(1 << (23 - n))
    }

    pub const fn empty() -> Self {
        Self(0)
    }

    /// From the 24-bit value, extra high bits dropped.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::MASK)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Services a logical-name server typically offers.
    pub fn logical_name_default() -> Self {
        Self::GET
            | Self::SET
            | Self::ACTION
            | Self::SELECTIVE_ACCESS
            | Self::BLOCK_TRANSFER_WITH_GET_OR_READ
            | Self::BLOCK_TRANSFER_WITH_ACTION
            | Self::MULTIPLE_REFERENCES
            | Self::ATTRIBUTE0_SUPPORTED_WITH_GET
            | Self::PRIORITY_MGMT_SUPPORTED
    }

    /// Services a short-name server typically offers.
    pub fn short_name_default() -> Self {
        Self::READ
            | Self::WRITE
            | Self::PARAMETERIZED_ACCESS
            | Self::BLOCK_TRANSFER_WITH_GET_OR_READ
            | Self::MULTIPLE_REFERENCES
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersect(&self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    fn encode_into(&self, encoder: &mut AxdrEncoder) {
        encoder.encode_bytes(&CONFORMANCE_HEADER);
        encoder.encode_bytes(&self.0.to_be_bytes()[1..]);
    }

    fn decode_from(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let header = decoder.decode_bytes(CONFORMANCE_HEADER.len())?;
        if header != CONFORMANCE_HEADER {
            return Err(DlmsError::ProtocolDecode(format!(
                "Bad conformance header {:02X?}",
                header
            )));
        }
        let bytes = decoder.decode_bytes(3)?;
        Ok(Self(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])))
    }
}

impl std::ops::BitOr for Conformance {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for Conformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}", self.0)
    }
}

/// InitiateRequest
#[derive(Debug, Clone, PartialEq)]
pub struct InitiateRequest {
    /// Dedicated key for the association; only meaningful when ciphered
    pub dedicated_key: Option<Vec<u8>>,
    pub response_allowed: bool,
    pub proposed_quality_of_service: Option<i8>,
    pub proposed_dlms_version_number: u8,
    pub proposed_conformance: Conformance,
    pub client_max_receive_pdu_size: u16,
}

impl InitiateRequest {
    pub fn new(proposed_conformance: Conformance, client_max_receive_pdu_size: u16) -> Self {
        Self {
            dedicated_key: None,
            response_allowed: true,
            proposed_quality_of_service: None,
            proposed_dlms_version_number: DLMS_VERSION_6,
            proposed_conformance,
            client_max_receive_pdu_size,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = AxdrEncoder::with_capacity(16);
        encoder.encode_u8(INITIATE_REQUEST_TAG);
        encoder.encode_optional(self.dedicated_key.as_ref(), |e, key| e.encode_octet_string(key));
        // DEFAULT TRUE: only the non-default value is transmitted.
        let response_allowed = (!self.response_allowed).then_some(false);
        encoder.encode_optional(response_allowed.as_ref(), |e, v| e.encode_bool(*v));
        encoder.encode_optional(self.proposed_quality_of_service.as_ref(), |e, q| e.encode_i8(*q));
        encoder.encode_u8(self.proposed_dlms_version_number);
        self.proposed_conformance.encode_into(&mut encoder);
        encoder.encode_u16(self.client_max_receive_pdu_size);
        encoder.into_bytes()
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut decoder = AxdrDecoder::new(data);
        expect_tag(&mut decoder, INITIATE_REQUEST_TAG, "InitiateRequest")?;
        let dedicated_key = decoder.decode_optional(|d| d.decode_octet_string())?;
        let response_allowed = decoder.decode_optional(|d| d.decode_bool())?.unwrap_or(true);
        let proposed_quality_of_service = decoder.decode_optional(|d| d.decode_i8())?;
        let proposed_dlms_version_number = decoder.decode_u8()?;
        let proposed_conformance = Conformance::decode_from(&mut decoder)?;
        let client_max_receive_pdu_size = decoder.decode_u16()?;
        expect_end(&decoder, "InitiateRequest")?;
        Ok(Self {
            dedicated_key,
            response_allowed,
            proposed_quality_of_service,
            proposed_dlms_version_number,
            proposed_conformance,
            client_max_receive_pdu_size,
        })
    }
}

/// InitiateResponse
#[derive(Debug, Clone, PartialEq)]
pub struct InitiateResponse {
    pub negotiated_quality_of_service: Option<i8>,
    pub negotiated_dlms_version_number: u8,
    pub negotiated_conformance: Conformance,
    pub server_max_receive_pdu_size: u16,
    pub vaa_name: u16,
}

impl InitiateResponse {
    pub fn new(negotiated_conformance: Conformance, server_max_receive_pdu_size: u16, vaa_name: u16) -> Self {
        Self {
            negotiated_quality_of_service: None,
            negotiated_dlms_version_number: DLMS_VERSION_6,
            negotiated_conformance,
            server_max_receive_pdu_size,
            vaa_name,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = AxdrEncoder::with_capacity(16);
        encoder.encode_u8(INITIATE_RESPONSE_TAG);
        encoder.encode_optional(self.negotiated_quality_of_service.as_ref(), |e, q| e.encode_i8(*q));
        encoder.encode_u8(self.negotiated_dlms_version_number);
        self.negotiated_conformance.encode_into(&mut encoder);
        encoder.encode_u16(self.server_max_receive_pdu_size);
        encoder.encode_u16(self.vaa_name);
        encoder.into_bytes()
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut decoder = AxdrDecoder::new(data);
        expect_tag(&mut decoder, INITIATE_RESPONSE_TAG, "InitiateResponse")?;
        let negotiated_quality_of_service = decoder.decode_optional(|d| d.decode_i8())?;
        let negotiated_dlms_version_number = decoder.decode_u8()?;
        let negotiated_conformance = Conformance::decode_from(&mut decoder)?;
        let server_max_receive_pdu_size = decoder.decode_u16()?;
        let vaa_name = decoder.decode_u16()?;
        expect_end(&decoder, "InitiateResponse")?;
        Ok(Self {
            negotiated_quality_of_service,
            negotiated_dlms_version_number,
            negotiated_conformance,
            server_max_receive_pdu_size,
            vaa_name,
        })
    }
}

/// Initiate service error carried in a ConfirmedServiceError
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiateError {
    Other = 0,
    DlmsVersionTooLow = 1,
    IncompatibleConformance = 2,
    PduSizeTooShort = 3,
    RefusedByVdeHandler = 4,
}

impl InitiateError {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(InitiateError::Other),
            1 => Some(InitiateError::DlmsVersionTooLow),
            2 => Some(InitiateError::IncompatibleConformance),
            3 => Some(InitiateError::PduSizeTooShort),
            4 => Some(InitiateError::RefusedByVdeHandler),
            _ => None,
        }
    }
}

/// ConfirmedServiceError for a failed initiate
///
/// Only the `initiateError [1]` / `initiate [6]` branch is modelled; it is
/// what a server puts in a rejecting AARE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedServiceError {
    pub error: InitiateError,
}

impl ConfirmedServiceError {
    const INITIATE_ERROR: u8 = 1;
    const SERVICE_ERROR_INITIATE: u8 = 6;

    pub fn new(error: InitiateError) -> Self {
        Self { error }
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![
            CONFIRMED_SERVICE_ERROR_TAG,
            Self::INITIATE_ERROR,
            Self::SERVICE_ERROR_INITIATE,
            self.error as u8,
        ]
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut decoder = AxdrDecoder::new(data);
        expect_tag(&mut decoder, CONFIRMED_SERVICE_ERROR_TAG, "ConfirmedServiceError")?;
        let choice = decoder.decode_u8()?;
        if choice != Self::INITIATE_ERROR {
            return Err(unknown_choice("ConfirmedServiceError", choice));
        }
        let service_error = decoder.decode_u8()?;
        if service_error != Self::SERVICE_ERROR_INITIATE {
            return Err(unknown_choice("ServiceError", service_error));
        }
        let value = decoder.decode_u8()?;
        let error = InitiateError::from_u8(value)
            .ok_or_else(|| DlmsError::ProtocolDecode(format!("Unknown initiate error {}", value)))?;
        expect_end(&decoder, "ConfirmedServiceError")?;
        Ok(Self { error })
    }
}
