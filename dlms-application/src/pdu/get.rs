//! GET-Request and GET-Response
//!
//! ```text
//! C0 01 invoke descriptor(9) access-selection?        normal
//! C0 02 invoke block-number(4)                        next
//! C0 03 invoke count {descriptor access-selection?}*  with-list
//!
//! C4 01 invoke Get-Data-Result                        normal
//! C4 02 invoke last-block block-number(4) result      with-datablock
//! C4 03 invoke count Get-Data-Result*                 with-list
//! ```

use super::types::{
    decode_sequence, encode_sequence, expect_end, expect_tag, unknown_choice, AttributeReference,
    DataAccessResult, GetDataResult, InvokeIdAndPriority,
};
use dlms_asn1::{AxdrDecoder, AxdrEncoder};
use dlms_core::DlmsResult;

pub const GET_REQUEST_TAG: u8 = 0xC0;
pub const GET_RESPONSE_TAG: u8 = 0xC4;

#[derive(Debug, Clone, PartialEq)]
pub enum GetRequest {
    Normal {
        invoke_id_and_priority: InvokeIdAndPriority,
        attribute: AttributeReference,
    },
    Next {
        invoke_id_and_priority: InvokeIdAndPriority,
        block_number: u32,
    },
    WithList {
        invoke_id_and_priority: InvokeIdAndPriority,
        attributes: Vec<AttributeReference>,
    },
}

impl GetRequest {
    pub fn invoke_id_and_priority(&self) -> InvokeIdAndPriority {
        match self {
            GetRequest::Normal { invoke_id_and_priority, .. }
            | GetRequest::Next { invoke_id_and_priority, .. }
            | GetRequest::WithList { invoke_id_and_priority, .. } => *invoke_id_and_priority,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = AxdrEncoder::new();
        encoder.encode_u8(GET_REQUEST_TAG);
        match self {
            GetRequest::Normal { invoke_id_and_priority, attribute } => {
                encoder.encode_u8(1);
                encoder.encode_u8(invoke_id_and_priority.value());
                attribute.encode_into(&mut encoder);
            }
            GetRequest::Next { invoke_id_and_priority, block_number } => {
                encoder.encode_u8(2);
                encoder.encode_u8(invoke_id_and_priority.value());
                encoder.encode_u32(*block_number);
            }
            GetRequest::WithList { invoke_id_and_priority, attributes } => {
                encoder.encode_u8(3);
                encoder.encode_u8(invoke_id_and_priority.value());
                encode_sequence(&mut encoder, attributes, |e, a| a.encode_into(e));
            }
        }
        encoder.into_bytes()
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut decoder = AxdrDecoder::new(data);
        expect_tag(&mut decoder, GET_REQUEST_TAG, "GET-Request")?;
        let choice = decoder.decode_u8()?;
        let invoke_id_and_priority = InvokeIdAndPriority::from_byte(decoder.decode_u8()?);
        let request = match choice {
            1 => GetRequest::Normal {
                invoke_id_and_priority,
                attribute: AttributeReference::decode_from(&mut decoder)?,
            },
            2 => GetRequest::Next {
                invoke_id_and_priority,
                block_number: decoder.decode_u32()?,
            },
            3 => GetRequest::WithList {
                invoke_id_and_priority,
                attributes: decode_sequence(&mut decoder, AttributeReference::decode_from)?,
            },
            other => return Err(unknown_choice("GET-Request", other)),
        };
        expect_end(&decoder, "GET-Request")?;
        Ok(request)
    }
}

/// Result carried by one GET data block
#[derive(Debug, Clone, PartialEq)]
pub enum DataBlockResult {
    RawData(Vec<u8>),
    DataAccessResult(DataAccessResult),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GetResponse {
    Normal {
        invoke_id_and_priority: InvokeIdAndPriority,
        result: GetDataResult,
    },
    WithDataBlock {
        invoke_id_and_priority: InvokeIdAndPriority,
        last_block: bool,
        block_number: u32,
        result: DataBlockResult,
    },
    WithList {
        invoke_id_and_priority: InvokeIdAndPriority,
        results: Vec<GetDataResult>,
    },
}

impl GetResponse {
    pub fn invoke_id_and_priority(&self) -> InvokeIdAndPriority {
        match self {
            GetResponse::Normal { invoke_id_and_priority, .. }
            | GetResponse::WithDataBlock { invoke_id_and_priority, .. }
            | GetResponse::WithList { invoke_id_and_priority, .. } => *invoke_id_and_priority,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = AxdrEncoder::new();
        encoder.encode_u8(GET_RESPONSE_TAG);
        match self {
            GetResponse::Normal { invoke_id_and_priority, result } => {
                encoder.encode_u8(1);
                encoder.encode_u8(invoke_id_and_priority.value());
                result.encode_into(&mut encoder);
            }
            GetResponse::WithDataBlock {
                invoke_id_and_priority,
                last_block,
                block_number,
                result,
            } => {
                encoder.encode_u8(2);
                encoder.encode_u8(invoke_id_and_priority.value());
                encoder.encode_bool(*last_block);
                encoder.encode_u32(*block_number);
                match result {
                    DataBlockResult::RawData(raw) => {
                        encoder.encode_u8(0);
                        encoder.encode_octet_string(raw);
                    }
                    DataBlockResult::DataAccessResult(code) => {
                        encoder.encode_u8(1);
                        encoder.encode_u8(code.value());
                    }
                }
            }
            GetResponse::WithList { invoke_id_and_priority, results } => {
                encoder.encode_u8(3);
                encoder.encode_u8(invoke_id_and_priority.value());
                encode_sequence(&mut encoder, results, |e, r| r.encode_into(e));
            }
        }
        encoder.into_bytes()
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut decoder = AxdrDecoder::new(data);
        expect_tag(&mut decoder, GET_RESPONSE_TAG, "GET-Response")?;
        let choice = decoder.decode_u8()?;
        let invoke_id_and_priority = InvokeIdAndPriority::from_byte(decoder.decode_u8()?);
        let response = match choice {
            1 => GetResponse::Normal {
                invoke_id_and_priority,
                result: GetDataResult::decode_from(&mut decoder)?,
            },
            2 => {
                let last_block = decoder.decode_bool()?;
                let block_number = decoder.decode_u32()?;
                let result = match decoder.decode_u8()? {
                    0 => DataBlockResult::RawData(decoder.decode_octet_string()?),
                    1 => DataBlockResult::DataAccessResult(DataAccessResult::decode_from(&mut decoder)?),
                    other => return Err(unknown_choice("DataBlock-G result", other)),
                };
                GetResponse::WithDataBlock {
                    invoke_id_and_priority,
                    last_block,
                    block_number,
                    result,
                }
            }
            3 => GetResponse::WithList {
                invoke_id_and_priority,
                results: decode_sequence(&mut decoder, GetDataResult::decode_from)?,
            },
            other => return Err(unknown_choice("GET-Response", other)),
        };
        expect_end(&decoder, "GET-Response")?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::{CosemAttributeDescriptor, SelectiveAccessDescriptor};
    use dlms_core::{DataObject, DlmsError, ObisCode};

    fn clock_time() -> AttributeReference {
        AttributeReference::new(CosemAttributeDescriptor::new(8, ObisCode::new(0, 0, 1, 0, 0, 255), 2))
    }

    #[test]
    fn test_get_request_normal_wire_format() {
        let request = GetRequest::Normal {
            invoke_id_and_priority: InvokeIdAndPriority::new(1, true),
            attribute: clock_time(),
        };
        let encoded = request.encode();
        assert_eq!(hex::encode_upper(&encoded), "C001C100080000010000FF0200");
        assert_eq!(GetRequest::decode(&encoded).unwrap(), request);
    }

    #[test]
    fn test_get_request_with_selection_and_list() {
        let selection = SelectiveAccessDescriptor::new(
            2,
            DataObject::Structure(vec![DataObject::Unsigned32(1), DataObject::Unsigned32(10)]),
        );
        let request = GetRequest::WithList {
            invoke_id_and_priority: InvokeIdAndPriority::new(3, false),
            attributes: vec![clock_time(), clock_time().with_selection(selection)],
        };
        assert_eq!(GetRequest::decode(&request.encode()).unwrap(), request);
    }

    #[test]
    fn test_get_request_next() {
        let encoded = [0xC0, 0x02, 0xC1, 0x00, 0x00, 0x00, 0x02];
        let request = GetRequest::decode(&encoded).unwrap();
        assert_eq!(
            request,
            GetRequest::Next {
                invoke_id_and_priority: InvokeIdAndPriority::from_byte(0xC1),
                block_number: 2
            }
        );
        assert_eq!(request.encode(), encoded);
    }

    #[test]
    fn test_get_response_variants() {
        let normal = GetResponse::Normal {
            invoke_id_and_priority: InvokeIdAndPriority::new(1, true),
            result: GetDataResult::Data(DataObject::Unsigned16(0x1234)),
        };
        assert_eq!(hex::encode_upper(normal.encode()), "C401C100121234");

        let block = GetResponse::WithDataBlock {
            invoke_id_and_priority: InvokeIdAndPriority::new(1, true),
            last_block: false,
            block_number: 1,
            result: DataBlockResult::RawData(vec![1, 2, 3]),
        };
        assert_eq!(hex::encode_upper(block.encode()), "C402C100000000010003010203");
        assert_eq!(GetResponse::decode(&block.encode()).unwrap(), block);

        let list = GetResponse::WithList {
            invoke_id_and_priority: InvokeIdAndPriority::new(2, true),
            results: vec![
                GetDataResult::Data(DataObject::Boolean(true)),
                GetDataResult::DataAccessResult(DataAccessResult::ObjectUndefined),
            ],
        };
        assert_eq!(GetResponse::decode(&list.encode()).unwrap(), list);
    }

    #[test]
    fn test_get_decode_errors() {
        assert!(matches!(GetRequest::decode(&[0xC0, 0x07, 0xC1]), Err(DlmsError::ProtocolDecode(_))));
        assert!(GetRequest::decode(&[0xC4, 0x01, 0xC1]).is_err());
        assert!(GetResponse::decode(&[0xC4, 0x01, 0xC1, 0x00]).is_err());
    }
}
