//! ACTION-Request and ACTION-Response

use super::types::{
    decode_sequence, encode_sequence, expect_end, expect_tag, unknown_choice, ActionResult,
    CosemMethodDescriptor, GetDataResult, InvokeIdAndPriority,
};
use dlms_asn1::{AxdrDecoder, AxdrEncoder};
use dlms_core::{DataObject, DlmsError, DlmsResult};

pub const ACTION_REQUEST_TAG: u8 = 0xC3;
pub const ACTION_RESPONSE_TAG: u8 = 0xC7;

#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    Normal {
        invoke_id_and_priority: InvokeIdAndPriority,
        method: CosemMethodDescriptor,
        parameters: Option<DataObject>,
    },
    /// Acknowledges pblock `block_number` of a long action response.
    NextPblock {
        invoke_id_and_priority: InvokeIdAndPriority,
        block_number: u32,
    },
    WithList {
        invoke_id_and_priority: InvokeIdAndPriority,
        methods: Vec<CosemMethodDescriptor>,
        parameters: Vec<DataObject>,
    },
}

impl ActionRequest {
    pub fn invoke_id_and_priority(&self) -> InvokeIdAndPriority {
        match self {
            ActionRequest::Normal { invoke_id_and_priority, .. }
            | ActionRequest::NextPblock { invoke_id_and_priority, .. }
            | ActionRequest::WithList { invoke_id_and_priority, .. } => *invoke_id_and_priority,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = AxdrEncoder::new();
        encoder.encode_u8(ACTION_REQUEST_TAG);
        match self {
            ActionRequest::Normal {
                invoke_id_and_priority,
                method,
                parameters,
            } => {
                encoder.encode_u8(1);
                encoder.encode_u8(invoke_id_and_priority.value());
                method.encode_into(&mut encoder);
                encoder.encode_optional(parameters.as_ref(), |e, p| e.encode_data_object(p));
            }
            ActionRequest::NextPblock {
                invoke_id_and_priority,
                block_number,
            } => {
                encoder.encode_u8(2);
                encoder.encode_u8(invoke_id_and_priority.value());
                encoder.encode_u32(*block_number);
            }
            ActionRequest::WithList {
                invoke_id_and_priority,
                methods,
                parameters,
            } => {
                encoder.encode_u8(3);
                encoder.encode_u8(invoke_id_and_priority.value());
                encode_sequence(&mut encoder, methods, |e, m| m.encode_into(e));
                encode_sequence(&mut encoder, parameters, |e, p| e.encode_data_object(p));
            }
        }
        encoder.into_bytes()
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut decoder = AxdrDecoder::new(data);
        expect_tag(&mut decoder, ACTION_REQUEST_TAG, "ACTION-Request")?;
        let choice = decoder.decode_u8()?;
        let invoke_id_and_priority = InvokeIdAndPriority::from_byte(decoder.decode_u8()?);
        let request = match choice {
            1 => ActionRequest::Normal {
                invoke_id_and_priority,
                method: CosemMethodDescriptor::decode_from(&mut decoder)?,
                parameters: decoder.decode_optional(|d| d.decode_data_object())?,
            },
            2 => ActionRequest::NextPblock {
                invoke_id_and_priority,
                block_number: decoder.decode_u32()?,
            },
            3 => {
                let methods = decode_sequence(&mut decoder, CosemMethodDescriptor::decode_from)?;
                let parameters = decode_sequence(&mut decoder, |d| d.decode_data_object())?;
                if methods.len() != parameters.len() {
                    return Err(DlmsError::ProtocolDecode(format!(
                        "ACTION-Request-With-List has {} method(s) but {} parameter(s)",
                        methods.len(),
                        parameters.len()
                    )));
                }
                ActionRequest::WithList {
                    invoke_id_and_priority,
                    methods,
                    parameters,
                }
            }
            other => return Err(unknown_choice("ACTION-Request", other)),
        };
        expect_end(&decoder, "ACTION-Request")?;
        Ok(request)
    }
}

/// Action-Response-With-Optional-Data
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResponseWithOptionalData {
    pub result: ActionResult,
    pub return_parameters: Option<GetDataResult>,
}

impl ActionResponseWithOptionalData {
    pub fn new(result: ActionResult, return_parameters: Option<GetDataResult>) -> Self {
        Self {
            result,
            return_parameters,
        }
    }

    pub fn success(data: Option<DataObject>) -> Self {
        Self::new(ActionResult::Success, data.map(GetDataResult::Data))
    }

    pub fn failure(result: ActionResult) -> Self {
        Self::new(result, None)
    }

    /// SEQUENCE OF Action-Response-With-Optional-Data, the raw data of a
    /// long ACTION with-list.
    pub fn encode_list(responses: &[Self]) -> Vec<u8> {
        let mut encoder = AxdrEncoder::new();
        encode_sequence(&mut encoder, responses, |e, r| r.encode_into(e));
        encoder.into_bytes()
    }

    pub fn decode_list(data: &[u8]) -> DlmsResult<Vec<Self>> {
        let mut decoder = AxdrDecoder::new(data);
        let responses = decode_sequence(&mut decoder, Self::decode_from)?;
        expect_end(&decoder, "Action-Response list")?;
        Ok(responses)
    }

    fn encode_into(&self, encoder: &mut AxdrEncoder) {
        encoder.encode_u8(self.result.value());
        encoder.encode_optional(self.return_parameters.as_ref(), |e, r| r.encode_into(e));
    }

    fn decode_from(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let result = ActionResult::decode_from(decoder)?;
        let return_parameters = decoder.decode_optional(GetDataResult::decode_from)?;
        Ok(Self::new(result, return_parameters))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionResponse {
    Normal {
        invoke_id_and_priority: InvokeIdAndPriority,
        response: ActionResponseWithOptionalData,
    },
    WithPblock {
        invoke_id_and_priority: InvokeIdAndPriority,
        last_block: bool,
        block_number: u32,
        raw_data: Vec<u8>,
    },
    WithList {
        invoke_id_and_priority: InvokeIdAndPriority,
        responses: Vec<ActionResponseWithOptionalData>,
    },
}

impl ActionResponse {
    pub fn invoke_id_and_priority(&self) -> InvokeIdAndPriority {
        match self {
            ActionResponse::Normal { invoke_id_and_priority, .. }
            | ActionResponse::WithPblock { invoke_id_and_priority, .. }
            | ActionResponse::WithList { invoke_id_and_priority, .. } => *invoke_id_and_priority,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = AxdrEncoder::new();
        encoder.encode_u8(ACTION_RESPONSE_TAG);
        match self {
            ActionResponse::Normal {
                invoke_id_and_priority,
                response,
            } => {
                encoder.encode_u8(1);
                encoder.encode_u8(invoke_id_and_priority.value());
                response.encode_into(&mut encoder);
            }
            ActionResponse::WithPblock {
                invoke_id_and_priority,
                last_block,
                block_number,
                raw_data,
            } => {
                encoder.encode_u8(2);
                encoder.encode_u8(invoke_id_and_priority.value());
                encoder.encode_bool(*last_block);
                encoder.encode_u32(*block_number);
                encoder.encode_octet_string(raw_data);
            }
            ActionResponse::WithList {
                invoke_id_and_priority,
                responses,
            } => {
                encoder.encode_u8(3);
                encoder.encode_u8(invoke_id_and_priority.value());
                encode_sequence(&mut encoder, responses, |e, r| r.encode_into(e));
            }
        }
        encoder.into_bytes()
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut decoder = AxdrDecoder::new(data);
        expect_tag(&mut decoder, ACTION_RESPONSE_TAG, "ACTION-Response")?;
        let choice = decoder.decode_u8()?;
        let invoke_id_and_priority = InvokeIdAndPriority::from_byte(decoder.decode_u8()?);
        let response = match choice {
            1 => ActionResponse::Normal {
                invoke_id_and_priority,
                response: ActionResponseWithOptionalData::decode_from(&mut decoder)?,
            },
            2 => ActionResponse::WithPblock {
                invoke_id_and_priority,
                last_block: decoder.decode_bool()?,
                block_number: decoder.decode_u32()?,
                raw_data: decoder.decode_octet_string()?,
            },
            3 => ActionResponse::WithList {
                invoke_id_and_priority,
                responses: decode_sequence(&mut decoder, ActionResponseWithOptionalData::decode_from)?,
            },
            other => return Err(unknown_choice("ACTION-Response", other)),
        };
        expect_end(&decoder, "ACTION-Response")?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlms_core::ObisCode;

    fn reply_to_hls() -> CosemMethodDescriptor {
        CosemMethodDescriptor::new(15, ObisCode::new(0, 0, 40, 0, 0, 255), 1)
    }

    #[test]
    fn test_action_request_normal_wire_format() {
        let request = ActionRequest::Normal {
            invoke_id_and_priority: InvokeIdAndPriority::new(1, true),
            method: reply_to_hls(),
            parameters: Some(DataObject::OctetString(vec![0x10, 0xAA])),
        };
        let encoded = request.encode();
        assert_eq!(hex::encode_upper(&encoded), "C301C1000F0000280000FF0101090210AA");
        assert_eq!(ActionRequest::decode(&encoded).unwrap(), request);
    }

    #[test]
    fn test_action_request_variants() {
        let next = ActionRequest::NextPblock {
            invoke_id_and_priority: InvokeIdAndPriority::new(4, true),
            block_number: 3,
        };
        assert_eq!(hex::encode_upper(next.encode()), "C302C400000003");
        assert_eq!(ActionRequest::decode(&next.encode()).unwrap(), next);

        let list = ActionRequest::WithList {
            invoke_id_and_priority: InvokeIdAndPriority::new(4, true),
            methods: vec![reply_to_hls(), reply_to_hls()],
            parameters: vec![DataObject::Null, DataObject::Integer8(0)],
        };
        assert_eq!(ActionRequest::decode(&list.encode()).unwrap(), list);
    }

    #[test]
    fn test_action_response_variants() {
        let normal = ActionResponse::Normal {
            invoke_id_and_priority: InvokeIdAndPriority::new(1, true),
            response: ActionResponseWithOptionalData::success(Some(DataObject::OctetString(vec![1]))),
        };
        assert_eq!(hex::encode_upper(normal.encode()), "C701C1000100090101");
        assert_eq!(ActionResponse::decode(&normal.encode()).unwrap(), normal);

        let failed = ActionResponse::Normal {
            invoke_id_and_priority: InvokeIdAndPriority::new(1, true),
            response: ActionResponseWithOptionalData::failure(ActionResult::OtherReason),
        };
        assert_eq!(hex::encode_upper(failed.encode()), "C701C1FA00");

        let pblock = ActionResponse::WithPblock {
            invoke_id_and_priority: InvokeIdAndPriority::new(1, true),
            last_block: true,
            block_number: 2,
            raw_data: vec![9; 4],
        };
        assert_eq!(ActionResponse::decode(&pblock.encode()).unwrap(), pblock);

        let list = ActionResponse::WithList {
            invoke_id_and_priority: InvokeIdAndPriority::new(1, true),
            responses: vec![
                ActionResponseWithOptionalData::success(None),
                ActionResponseWithOptionalData::failure(ActionResult::ObjectUndefined),
            ],
        };
        assert_eq!(ActionResponse::decode(&list.encode()).unwrap(), list);
    }
}
