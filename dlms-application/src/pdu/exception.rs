//! Exception-response: the server's answer to a request it will not process

use super::types::{expect_end, expect_tag};
use dlms_asn1::{AxdrDecoder, AxdrEncoder};
use dlms_core::{DlmsError, DlmsResult};

pub const EXCEPTION_RESPONSE_TAG: u8 = 0xD8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    ServiceNotAllowed = 1,
    ServiceUnknown = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceError {
    OperationNotPossible,
    ServiceNotSupported,
    OtherReason,
    PduTooLong,
    DecipheringError,
    /// Carries the invocation counter the server expects next.
    InvocationCounterError(u32),
}

impl ServiceError {
    fn choice(&self) -> u8 {
        match self {
            ServiceError::OperationNotPossible => 1,
            ServiceError::ServiceNotSupported => 2,
            ServiceError::OtherReason => 3,
            ServiceError::PduTooLong => 4,
            ServiceError::DecipheringError => 5,
            ServiceError::InvocationCounterError(_) => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionResponse {
    pub state_error: StateError,
    pub service_error: ServiceError,
}

impl ExceptionResponse {
    pub fn new(state_error: StateError, service_error: ServiceError) -> Self {
        Self {
            state_error,
            service_error,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = AxdrEncoder::with_capacity(7);
        encoder.encode_u8(EXCEPTION_RESPONSE_TAG);
        encoder.encode_u8(self.state_error as u8);
        encoder.encode_u8(self.service_error.choice());
        if let ServiceError::InvocationCounterError(counter) = self.service_error {
            encoder.encode_u32(counter);
        }
        encoder.into_bytes()
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut decoder = AxdrDecoder::new(data);
        expect_tag(&mut decoder, EXCEPTION_RESPONSE_TAG, "exception-response")?;
        let state_error = match decoder.decode_u8()? {
            1 => StateError::ServiceNotAllowed,
            2 => StateError::ServiceUnknown,
            other => {
                return Err(DlmsError::ProtocolDecode(format!("Unknown state-error {}", other)));
            }
        };
        let service_error = match decoder.decode_u8()? {
            1 => ServiceError::OperationNotPossible,
            2 => ServiceError::ServiceNotSupported,
            3 => ServiceError::OtherReason,
            4 => ServiceError::PduTooLong,
            5 => ServiceError::DecipheringError,
            6 => ServiceError::InvocationCounterError(decoder.decode_u32()?),
            other => {
                return Err(DlmsError::ProtocolDecode(format!("Unknown service-error {}", other)));
            }
        };
        expect_end(&decoder, "exception-response")?;
        Ok(Self::new(state_error, service_error))
    }
}
