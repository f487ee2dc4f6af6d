//! SET-Request and SET-Response
//!
//! Block-wise SET (choices 2, 3 and 4 of the request) is not offered; a
//! server answers it with an exception-response.

use super::types::{
    decode_sequence, encode_sequence, expect_end, expect_tag, unknown_choice, AttributeReference,
    DataAccessResult, InvokeIdAndPriority,
};
use dlms_asn1::{AxdrDecoder, AxdrEncoder};
use dlms_core::{DataObject, DlmsError, DlmsResult};

pub const SET_REQUEST_TAG: u8 = 0xC1;
pub const SET_RESPONSE_TAG: u8 = 0xC5;

#[derive(Debug, Clone, PartialEq)]
pub enum SetRequest {
    Normal {
        invoke_id_and_priority: InvokeIdAndPriority,
        attribute: AttributeReference,
        value: DataObject,
    },
    WithList {
        invoke_id_and_priority: InvokeIdAndPriority,
        attributes: Vec<AttributeReference>,
        values: Vec<DataObject>,
    },
}

impl SetRequest {
    pub fn invoke_id_and_priority(&self) -> InvokeIdAndPriority {
        match self {
            SetRequest::Normal { invoke_id_and_priority, .. }
            | SetRequest::WithList { invoke_id_and_priority, .. } => *invoke_id_and_priority,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = AxdrEncoder::new();
        encoder.encode_u8(SET_REQUEST_TAG);
        match self {
            SetRequest::Normal {
                invoke_id_and_priority,
                attribute,
                value,
            } => {
                encoder.encode_u8(1);
                encoder.encode_u8(invoke_id_and_priority.value());
                attribute.encode_into(&mut encoder);
                encoder.encode_data_object(value);
            }
            SetRequest::WithList {
                invoke_id_and_priority,
                attributes,
                values,
            } => {
                encoder.encode_u8(4);
                encoder.encode_u8(invoke_id_and_priority.value());
                encode_sequence(&mut encoder, attributes, |e, a| a.encode_into(e));
                encode_sequence(&mut encoder, values, |e, v| e.encode_data_object(v));
            }
        }
        encoder.into_bytes()
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut decoder = AxdrDecoder::new(data);
        expect_tag(&mut decoder, SET_REQUEST_TAG, "SET-Request")?;
        let choice = decoder.decode_u8()?;
        let invoke_id_and_priority = InvokeIdAndPriority::from_byte(decoder.decode_u8()?);
        let request = match choice {
            1 => SetRequest::Normal {
                invoke_id_and_priority,
                attribute: AttributeReference::decode_from(&mut decoder)?,
                value: decoder.decode_data_object()?,
            },
            4 => {
                let attributes = decode_sequence(&mut decoder, AttributeReference::decode_from)?;
                let values = decode_sequence(&mut decoder, |d| d.decode_data_object())?;
                if attributes.len() != values.len() {
                    return Err(DlmsError::ProtocolDecode(format!(
                        "SET-Request-With-List has {} attribute(s) but {} value(s)",
                        attributes.len(),
                        values.len()
                    )));
                }
                SetRequest::WithList {
                    invoke_id_and_priority,
                    attributes,
                    values,
                }
            }
            other => return Err(unknown_choice("SET-Request", other)),
        };
        expect_end(&decoder, "SET-Request")?;
        Ok(request)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetResponse {
    Normal {
        invoke_id_and_priority: InvokeIdAndPriority,
        result: DataAccessResult,
    },
    WithList {
        invoke_id_and_priority: InvokeIdAndPriority,
        results: Vec<DataAccessResult>,
    },
}

impl SetResponse {
    pub fn invoke_id_and_priority(&self) -> InvokeIdAndPriority {
        match self {
            SetResponse::Normal { invoke_id_and_priority, .. }
            | SetResponse::WithList { invoke_id_and_priority, .. } => *invoke_id_and_priority,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = AxdrEncoder::new();
        encoder.encode_u8(SET_RESPONSE_TAG);
        match self {
            SetResponse::Normal { invoke_id_and_priority, result } => {
                encoder.encode_u8(1);
                encoder.encode_u8(invoke_id_and_priority.value());
                encoder.encode_u8(result.value());
            }
            SetResponse::WithList { invoke_id_and_priority, results } => {
                encoder.encode_u8(5);
                encoder.encode_u8(invoke_id_and_priority.value());
                encode_sequence(&mut encoder, results, |e, r| e.encode_u8(r.value()));
            }
        }
        encoder.into_bytes()
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut decoder = AxdrDecoder::new(data);
        expect_tag(&mut decoder, SET_RESPONSE_TAG, "SET-Response")?;
        let choice = decoder.decode_u8()?;
        let invoke_id_and_priority = InvokeIdAndPriority::from_byte(decoder.decode_u8()?);
        let response = match choice {
            1 => SetResponse::Normal {
                invoke_id_and_priority,
                result: DataAccessResult::decode_from(&mut decoder)?,
            },
            5 => SetResponse::WithList {
                invoke_id_and_priority,
                results: decode_sequence(&mut decoder, DataAccessResult::decode_from)?,
            },
            other => return Err(unknown_choice("SET-Response", other)),
        };
        expect_end(&decoder, "SET-Response")?;
        Ok(response)
    }
}
