//! xDLMS PDUs for DLMS/COSEM
//!
//! All PDUs are A-XDR encoded and open with a tag byte. Request and response
//! families (GET, SET, ACTION) follow the tag with a choice byte selecting
//! the variant and an Invoke-Id-And-Priority byte; the short-name READ and
//! WRITE services carry neither.
//!
//! [`CosemPdu`] dispatches on the tag to the concrete type.

mod action;
mod exception;
mod get;
mod initiate;
mod set;
mod sn;
mod types;

pub use action::{
    ActionRequest, ActionResponse, ActionResponseWithOptionalData, ACTION_REQUEST_TAG,
    ACTION_RESPONSE_TAG,
};
pub use exception::{ExceptionResponse, ServiceError, StateError, EXCEPTION_RESPONSE_TAG};
pub use get::{DataBlockResult, GetRequest, GetResponse, GET_REQUEST_TAG, GET_RESPONSE_TAG};
pub use initiate::{
    Conformance, ConfirmedServiceError, InitiateError, InitiateRequest, InitiateResponse,
    CONFIRMED_SERVICE_ERROR_TAG, DLMS_VERSION_6, INITIATE_REQUEST_TAG, INITIATE_RESPONSE_TAG,
    MAX_PDU_SIZE, VAA_NAME_LN, VAA_NAME_SN,
};
pub use set::{SetRequest, SetResponse, SET_REQUEST_TAG, SET_RESPONSE_TAG};
pub use sn::{
    ReadRequest, ReadResponse, ReadResult, VariableAccessSpecification, WriteRequest,
    WriteResponse, READ_REQUEST_TAG, READ_RESPONSE_TAG, WRITE_REQUEST_TAG, WRITE_RESPONSE_TAG,
};
pub use types::{
    decode_data, encode_data, ActionResult, AttributeReference, CosemAttributeDescriptor, CosemMethodDescriptor,
    DataAccessResult, GetDataResult, InvokeIdAndPriority, SelectiveAccessDescriptor,
};

use dlms_core::{DlmsError, DlmsResult};

/// Any plaintext xDLMS PDU
#[derive(Debug, Clone, PartialEq)]
pub enum CosemPdu {
    InitiateRequest(InitiateRequest),
    InitiateResponse(InitiateResponse),
    ConfirmedServiceError(ConfirmedServiceError),
    GetRequest(GetRequest),
    GetResponse(GetResponse),
    SetRequest(SetRequest),
    SetResponse(SetResponse),
    ActionRequest(ActionRequest),
    ActionResponse(ActionResponse),
    ReadRequest(ReadRequest),
    ReadResponse(ReadResponse),
    WriteRequest(WriteRequest),
    WriteResponse(WriteResponse),
    ExceptionResponse(ExceptionResponse),
}

impl CosemPdu {
    pub fn tag(&self) -> u8 {
        match self {
            CosemPdu::InitiateRequest(_) => INITIATE_REQUEST_TAG,
            CosemPdu::InitiateResponse(_) => INITIATE_RESPONSE_TAG,
            CosemPdu::ConfirmedServiceError(_) => CONFIRMED_SERVICE_ERROR_TAG,
            CosemPdu::GetRequest(_) => GET_REQUEST_TAG,
            CosemPdu::GetResponse(_) => GET_RESPONSE_TAG,
            CosemPdu::SetRequest(_) => SET_REQUEST_TAG,
            CosemPdu::SetResponse(_) => SET_RESPONSE_TAG,
            CosemPdu::ActionRequest(_) => ACTION_REQUEST_TAG,
            CosemPdu::ActionResponse(_) => ACTION_RESPONSE_TAG,
            CosemPdu::ReadRequest(_) => READ_REQUEST_TAG,
            CosemPdu::ReadResponse(_) => READ_RESPONSE_TAG,
            CosemPdu::WriteRequest(_) => WRITE_REQUEST_TAG,
            CosemPdu::WriteResponse(_) => WRITE_RESPONSE_TAG,
            CosemPdu::ExceptionResponse(_) => EXCEPTION_RESPONSE_TAG,
        }
    }

    /// Short name of the PDU kind for log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            CosemPdu::InitiateRequest(_) => "initiate-request",
            CosemPdu::InitiateResponse(_) => "initiate-response",
            CosemPdu::ConfirmedServiceError(_) => "confirmed-service-error",
            CosemPdu::GetRequest(_) => "get-request",
            CosemPdu::GetResponse(_) => "get-response",
            CosemPdu::SetRequest(_) => "set-request",
            CosemPdu::SetResponse(_) => "set-response",
            CosemPdu::ActionRequest(_) => "action-request",
            CosemPdu::ActionResponse(_) => "action-response",
            CosemPdu::ReadRequest(_) => "read-request",
            CosemPdu::ReadResponse(_) => "read-response",
            CosemPdu::WriteRequest(_) => "write-request",
            CosemPdu::WriteResponse(_) => "write-response",
            CosemPdu::ExceptionResponse(_) => "exception-response",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            CosemPdu::InitiateRequest(pdu) => pdu.encode(),
            CosemPdu::InitiateResponse(pdu) => pdu.encode(),
            CosemPdu::ConfirmedServiceError(pdu) => pdu.encode(),
            CosemPdu::GetRequest(pdu) => pdu.encode(),
            CosemPdu::GetResponse(pdu) => pdu.encode(),
            CosemPdu::SetRequest(pdu) => pdu.encode(),
            CosemPdu::SetResponse(pdu) => pdu.encode(),
            CosemPdu::ActionRequest(pdu) => pdu.encode(),
            CosemPdu::ActionResponse(pdu) => pdu.encode(),
            CosemPdu::ReadRequest(pdu) => pdu.encode(),
            CosemPdu::ReadResponse(pdu) => pdu.encode(),
            CosemPdu::WriteRequest(pdu) => pdu.encode(),
            CosemPdu::WriteResponse(pdu) => pdu.encode(),
            CosemPdu::ExceptionResponse(pdu) => pdu.encode(),
        }
    }

    /// # Errors
    /// `ProtocolDecode` for an unknown tag or a malformed body.
    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let tag = *data
            .first()
            .ok_or_else(|| DlmsError::ProtocolDecode("Empty xDLMS PDU".to_string()))?;
        Ok(match tag {
            INITIATE_REQUEST_TAG => CosemPdu::InitiateRequest(InitiateRequest::decode(data)?),
            INITIATE_RESPONSE_TAG => CosemPdu::InitiateResponse(InitiateResponse::decode(data)?),
            CONFIRMED_SERVICE_ERROR_TAG => {
                CosemPdu::ConfirmedServiceError(ConfirmedServiceError::decode(data)?)
            }
            GET_REQUEST_TAG => CosemPdu::GetRequest(GetRequest::decode(data)?),
            GET_RESPONSE_TAG => CosemPdu::GetResponse(GetResponse::decode(data)?),
            SET_REQUEST_TAG => CosemPdu::SetRequest(SetRequest::decode(data)?),
            SET_RESPONSE_TAG => CosemPdu::SetResponse(SetResponse::decode(data)?),
            ACTION_REQUEST_TAG => CosemPdu::ActionRequest(ActionRequest::decode(data)?),
            ACTION_RESPONSE_TAG => CosemPdu::ActionResponse(ActionResponse::decode(data)?),
            READ_REQUEST_TAG => CosemPdu::ReadRequest(ReadRequest::decode(data)?),
            READ_RESPONSE_TAG => CosemPdu::ReadResponse(ReadResponse::decode(data)?),
            WRITE_REQUEST_TAG => CosemPdu::WriteRequest(WriteRequest::decode(data)?),
            WRITE_RESPONSE_TAG => CosemPdu::WriteResponse(WriteResponse::decode(data)?),
            EXCEPTION_RESPONSE_TAG => CosemPdu::ExceptionResponse(ExceptionResponse::decode(data)?),
            other => {
                return Err(DlmsError::ProtocolDecode(format!(
                    "Unknown xDLMS tag 0x{:02X}",
                    other
                )));
            }
        })
    }

    /// Whether this PDU uses logical-name referencing.
    pub fn is_logical_name_service(&self) -> bool {
        matches!(
            self,
            CosemPdu::GetRequest(_)
                | CosemPdu::GetResponse(_)
                | CosemPdu::SetRequest(_)
                | CosemPdu::SetResponse(_)
                | CosemPdu::ActionRequest(_)
                | CosemPdu::ActionResponse(_)
        )
    }

    /// Whether this PDU uses short-name referencing.
    pub fn is_short_name_service(&self) -> bool {
        matches!(
            self,
            CosemPdu::ReadRequest(_)
                | CosemPdu::ReadResponse(_)
                | CosemPdu::WriteRequest(_)
                | CosemPdu::WriteResponse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_dispatches_on_tag() {
        let pdu = CosemPdu::decode(&[0xD8, 0x01, 0x02]).unwrap();
        assert_eq!(pdu.kind(), "exception-response");
        assert_eq!(pdu.tag(), EXCEPTION_RESPONSE_TAG);
        assert_eq!(pdu.encode(), vec![0xD8, 0x01, 0x02]);

        let read = CosemPdu::decode(&[0x05, 0x01, 0x02, 0x00, 0x08]).unwrap();
        assert!(read.is_short_name_service());
        assert!(!read.is_logical_name_service());
    }

    #[test]
    fn test_decode_unknown_tag() {
        assert!(matches!(CosemPdu::decode(&[0x42]), Err(DlmsError::ProtocolDecode(_))));
        assert!(CosemPdu::decode(&[]).is_err());
    }
}
