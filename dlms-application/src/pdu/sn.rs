//! Short-name READ and WRITE
//!
//! SN services have no invoke id. A request lists one or more
//! variable-access specifications and the response carries one result per
//! entry, in order.

use super::types::{decode_sequence, encode_sequence, expect_end, expect_tag, unknown_choice, DataAccessResult};
use dlms_asn1::{AxdrDecoder, AxdrEncoder};
use dlms_core::{DataObject, DlmsError, DlmsResult};

pub const READ_REQUEST_TAG: u8 = 0x05;
pub const WRITE_REQUEST_TAG: u8 = 0x06;
pub const READ_RESPONSE_TAG: u8 = 0x0C;
pub const WRITE_RESPONSE_TAG: u8 = 0x0D;

/// Variable-Access-Specification
#[derive(Debug, Clone, PartialEq)]
pub enum VariableAccessSpecification {
    VariableName(u16),
    ParameterizedAccess {
        variable_name: u16,
        selector: u8,
        parameter: DataObject,
    },
    /// Requests block `block_number` of a long read response.
    BlockNumberAccess { block_number: u16 },
}

impl VariableAccessSpecification {
    fn encode_into(&self, encoder: &mut AxdrEncoder) {
        match self {
            VariableAccessSpecification::VariableName(name) => {
                encoder.encode_u8(2);
                encoder.encode_u16(*name);
            }
            VariableAccessSpecification::ParameterizedAccess {
                variable_name,
                selector,
                parameter,
            } => {
                encoder.encode_u8(4);
                encoder.encode_u16(*variable_name);
                encoder.encode_u8(*selector);
                encoder.encode_data_object(parameter);
            }
            VariableAccessSpecification::BlockNumberAccess { block_number } => {
                encoder.encode_u8(5);
                encoder.encode_u16(*block_number);
            }
        }
    }

    fn decode_from(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        match decoder.decode_u8()? {
            2 => Ok(VariableAccessSpecification::VariableName(decoder.decode_u16()?)),
            4 => Ok(VariableAccessSpecification::ParameterizedAccess {
                variable_name: decoder.decode_u16()?,
                selector: decoder.decode_u8()?,
                parameter: decoder.decode_data_object()?,
            }),
            5 => Ok(VariableAccessSpecification::BlockNumberAccess {
                block_number: decoder.decode_u16()?,
            }),
            other => Err(unknown_choice("Variable-Access-Specification", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    pub variables: Vec<VariableAccessSpecification>,
}

impl ReadRequest {
    pub fn new(variables: Vec<VariableAccessSpecification>) -> Self {
        Self { variables }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = AxdrEncoder::new();
        encoder.encode_u8(READ_REQUEST_TAG);
        encode_sequence(&mut encoder, &self.variables, |e, v| v.encode_into(e));
        encoder.into_bytes()
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut decoder = AxdrDecoder::new(data);
        expect_tag(&mut decoder, READ_REQUEST_TAG, "ReadRequest")?;
        let variables = decode_sequence(&mut decoder, VariableAccessSpecification::decode_from)?;
        expect_end(&decoder, "ReadRequest")?;
        Ok(Self { variables })
    }
}

/// One entry of a ReadResponse
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    Data(DataObject),
    DataAccessError(DataAccessResult),
    DataBlockResult {
        last_block: bool,
        block_number: u16,
        raw_data: Vec<u8>,
    },
    BlockNumber(u16),
}

impl ReadResult {
    fn encode_into(&self, encoder: &mut AxdrEncoder) {
        match self {
            ReadResult::Data(data) => {
                encoder.encode_u8(0);
                encoder.encode_data_object(data);
            }
            ReadResult::DataAccessError(code) => {
                encoder.encode_u8(1);
                encoder.encode_u8(code.value());
            }
            ReadResult::DataBlockResult {
                last_block,
                block_number,
                raw_data,
            } => {
                encoder.encode_u8(2);
                encoder.encode_bool(*last_block);
                encoder.encode_u16(*block_number);
                encoder.encode_octet_string(raw_data);
            }
            ReadResult::BlockNumber(block_number) => {
                encoder.encode_u8(3);
                encoder.encode_u16(*block_number);
            }
        }
    }

    fn decode_from(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        match decoder.decode_u8()? {
            0 => Ok(ReadResult::Data(decoder.decode_data_object()?)),
            1 => Ok(ReadResult::DataAccessError(DataAccessResult::decode_from(decoder)?)),
            2 => Ok(ReadResult::DataBlockResult {
                last_block: decoder.decode_bool()?,
                block_number: decoder.decode_u16()?,
                raw_data: decoder.decode_octet_string()?,
            }),
            3 => Ok(ReadResult::BlockNumber(decoder.decode_u16()?)),
            other => Err(unknown_choice("ReadResponse", other)),
        }
    }
}

impl ReadResult {
    /// SEQUENCE OF Read-Result, the raw data of a long READ.
    pub fn encode_list(results: &[Self]) -> Vec<u8> {
        let mut encoder = AxdrEncoder::new();
        encode_sequence(&mut encoder, results, |e, r| r.encode_into(e));
        encoder.into_bytes()
    }

    pub fn decode_list(data: &[u8]) -> DlmsResult<Vec<Self>> {
        let mut decoder = AxdrDecoder::new(data);
        let results = decode_sequence(&mut decoder, Self::decode_from)?;
        expect_end(&decoder, "Read-Result list")?;
        Ok(results)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadResponse {
    pub results: Vec<ReadResult>,
}

impl ReadResponse {
    pub fn new(results: Vec<ReadResult>) -> Self {
        Self { results }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = AxdrEncoder::new();
        encoder.encode_u8(READ_RESPONSE_TAG);
        encode_sequence(&mut encoder, &self.results, |e, r| r.encode_into(e));
        encoder.into_bytes()
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut decoder = AxdrDecoder::new(data);
        expect_tag(&mut decoder, READ_RESPONSE_TAG, "ReadResponse")?;
        let results = decode_sequence(&mut decoder, ReadResult::decode_from)?;
        expect_end(&decoder, "ReadResponse")?;
        Ok(Self { results })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub variables: Vec<VariableAccessSpecification>,
    pub values: Vec<DataObject>,
}

impl WriteRequest {
    pub fn new(variables: Vec<VariableAccessSpecification>, values: Vec<DataObject>) -> Self {
        Self { variables, values }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = AxdrEncoder::new();
        encoder.encode_u8(WRITE_REQUEST_TAG);
        encode_sequence(&mut encoder, &self.variables, |e, v| v.encode_into(e));
        encode_sequence(&mut encoder, &self.values, |e, v| e.encode_data_object(v));
        encoder.into_bytes()
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut decoder = AxdrDecoder::new(data);
        expect_tag(&mut decoder, WRITE_REQUEST_TAG, "WriteRequest")?;
        let variables = decode_sequence(&mut decoder, VariableAccessSpecification::decode_from)?;
        let values = decode_sequence(&mut decoder, |d| d.decode_data_object())?;
        expect_end(&decoder, "WriteRequest")?;
        if variables.len() != values.len() {
            return Err(DlmsError::ProtocolDecode(format!(
                "WriteRequest has {} variable(s) but {} value(s)",
                variables.len(),
                values.len()
            )));
        }
        Ok(Self { variables, values })
    }
}

/// WriteResponse; `Success` travels as the `success [0] NULL` choice.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResponse {
    pub results: Vec<DataAccessResult>,
}

impl WriteResponse {
    pub fn new(results: Vec<DataAccessResult>) -> Self {
        Self { results }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = AxdrEncoder::new();
        encoder.encode_u8(WRITE_RESPONSE_TAG);
        encode_sequence(&mut encoder, &self.results, |e, result| match result {
            DataAccessResult::Success => e.encode_u8(0),
            error => {
                e.encode_u8(1);
                e.encode_u8(error.value());
            }
        });
        encoder.into_bytes()
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut decoder = AxdrDecoder::new(data);
        expect_tag(&mut decoder, WRITE_RESPONSE_TAG, "WriteResponse")?;
        let results = decode_sequence(&mut decoder, |d| match d.decode_u8()? {
            0 => Ok(DataAccessResult::Success),
            1 => DataAccessResult::decode_from(d),
            other => Err(unknown_choice("WriteResponse", other)),
        })?;
        expect_end(&decoder, "WriteResponse")?;
        Ok(Self { results })
    }
}
