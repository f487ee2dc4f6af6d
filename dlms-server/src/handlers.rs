//! xDLMS request handlers
//!
//! Each handler turns one request into either a complete response PDU or a
//! long response for the association loop to send block by block. Handlers
//! read the association's state but never change it, and never touch the
//! session.

use crate::directory::LogicalDevice;
use dlms_application::block_transfer::{Block, BlockService};
use dlms_application::pdu::{
    encode_data, ActionRequest, ActionResponse, ActionResponseWithOptionalData, ActionResult,
    AttributeReference, CosemAttributeDescriptor, CosemMethodDescriptor, CosemPdu,
    DataAccessResult, DataBlockResult, GetDataResult, GetRequest, GetResponse,
    InvokeIdAndPriority, ReadRequest, ReadResponse, ReadResult, SelectiveAccessDescriptor,
    SetRequest, SetResponse, VariableAccessSpecification, WriteRequest, WriteResponse,
};
use dlms_application::ConnectionState;
use dlms_core::{DataObject, DlmsError, DlmsResult};
use dlms_interface::{AccessRequest, CosemObject, ShortNameMember};
use dlms_security::SecurityPolicy;

/// Everything a handler needs to know about the requesting association
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub device: &'a LogicalDevice,
    pub client_id: u16,
    pub connection_id: u64,
    pub authenticated: bool,
    pub security_policy: SecurityPolicy,
    pub max_pdu_size: u16,
    pub ciphered: bool,
}

impl<'a> RequestContext<'a> {
    pub fn new(device: &'a LogicalDevice, state: &ConnectionState, client_id: u16, connection_id: u64) -> Self {
        Self {
            device,
            client_id,
            connection_id,
            authenticated: state.is_authenticated(),
            security_policy: state.security_suite().security_policy(),
            max_pdu_size: state.negotiated_max_pdu_size(),
            ciphered: state.is_ciphered(),
        }
    }

    fn access_request(&self, selection: Option<SelectiveAccessDescriptor>) -> AccessRequest {
        AccessRequest::new(self.device.id(), self.client_id, self.connection_id)
            .authenticated(self.authenticated)
            .with_security_policy(self.security_policy)
            .with_selection(selection)
    }

    fn exceeds(&self, service: BlockService, encoded_len: usize) -> bool {
        service.needs_block_transfer(encoded_len, self.max_pdu_size, self.ciphered)
    }
}

/// Which request a long response answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOrigin {
    Get(InvokeIdAndPriority),
    Action(InvokeIdAndPriority),
    Read,
}

impl BlockOrigin {
    pub fn service(self) -> BlockService {
        match self {
            BlockOrigin::Get(_) => BlockService::Get,
            BlockOrigin::Action(_) => BlockService::Action,
            BlockOrigin::Read => BlockService::Read,
        }
    }

    /// Response PDU carrying `block`.
    pub fn block_response(self, block: &Block<'_>) -> DlmsResult<CosemPdu> {
        Ok(match self {
            BlockOrigin::Get(invoke_id_and_priority) => CosemPdu::GetResponse(GetResponse::WithDataBlock {
                invoke_id_and_priority,
                last_block: block.last,
                block_number: block.number,
                result: DataBlockResult::RawData(block.data.to_vec()),
            }),
            BlockOrigin::Action(invoke_id_and_priority) => CosemPdu::ActionResponse(ActionResponse::WithPblock {
                invoke_id_and_priority,
                last_block: block.last,
                block_number: block.number,
                raw_data: block.data.to_vec(),
            }),
            BlockOrigin::Read => {
                let block_number = u16::try_from(block.number).map_err(|_| {
                    DlmsError::Protocol(format!("READ block number {} out of range", block.number))
                })?;
                CosemPdu::ReadResponse(ReadResponse::new(vec![ReadResult::DataBlockResult {
                    last_block: block.last,
                    block_number,
                    raw_data: block.data.to_vec(),
                }]))
            }
        })
    }

    /// Block number acknowledged by `request`, if it is this transfer's follow-up.
    pub fn acknowledged_block(self, request: &CosemPdu) -> Option<u32> {
        match (self, request) {
            (
                BlockOrigin::Get(expected),
                CosemPdu::GetRequest(GetRequest::Next {
                    invoke_id_and_priority,
                    block_number,
                }),
            ) if invoke_id_and_priority.invoke_id() == expected.invoke_id() => Some(*block_number),
            (
                BlockOrigin::Action(expected),
                CosemPdu::ActionRequest(ActionRequest::NextPblock {
                    invoke_id_and_priority,
                    block_number,
                }),
            ) if invoke_id_and_priority.invoke_id() == expected.invoke_id() => Some(*block_number),
            (BlockOrigin::Read, CosemPdu::ReadRequest(read)) => match read.variables.as_slice() {
                [VariableAccessSpecification::BlockNumberAccess { block_number }] => Some(u32::from(*block_number)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Outcome of one request
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Pdu(CosemPdu),
    /// Encoded result too long for one PDU
    Blocks { origin: BlockOrigin, data: Vec<u8> },
}

pub fn handle_get(context: &RequestContext<'_>, request: GetRequest) -> Reply {
    match request {
        GetRequest::Normal {
            invoke_id_and_priority,
            attribute,
        } => match get_attribute(context, attribute) {
            GetDataResult::Data(value) => {
                let encoded = encode_data(&value);
                if context.exceeds(BlockService::Get, encoded.len()) {
                    Reply::Blocks {
                        origin: BlockOrigin::Get(invoke_id_and_priority),
                        data: encoded,
                    }
                } else {
                    Reply::Pdu(CosemPdu::GetResponse(GetResponse::Normal {
                        invoke_id_and_priority,
                        result: GetDataResult::Data(value),
                    }))
                }
            }
            result => Reply::Pdu(CosemPdu::GetResponse(GetResponse::Normal {
                invoke_id_and_priority,
                result,
            })),
        },
        GetRequest::Next {
            invoke_id_and_priority,
            block_number,
        } => {
            log::warn!("get-request-next for block {} without a long GET", block_number);
            Reply::Pdu(CosemPdu::GetResponse(GetResponse::WithDataBlock {
                invoke_id_and_priority,
                last_block: true,
                block_number,
                result: DataBlockResult::DataAccessResult(DataAccessResult::NoLongGetInProgress),
            }))
        }
        GetRequest::WithList {
            invoke_id_and_priority,
            attributes,
        } => {
            let results: Vec<GetDataResult> = attributes
                .into_iter()
                .map(|attribute| get_attribute(context, attribute))
                .collect();
            let encoded = GetDataResult::encode_list(&results);
            if context.exceeds(BlockService::Get, encoded.len()) {
                Reply::Blocks {
                    origin: BlockOrigin::Get(invoke_id_and_priority),
                    data: encoded,
                }
            } else {
                Reply::Pdu(CosemPdu::GetResponse(GetResponse::WithList {
                    invoke_id_and_priority,
                    results,
                }))
            }
        }
    }
}

fn get_attribute(context: &RequestContext<'_>, attribute: AttributeReference) -> GetDataResult {
    let request = context.access_request(attribute.access_selection);
    match context.device.get(&request, &attribute.descriptor) {
        Ok(value) => GetDataResult::Data(value),
        Err(code) => GetDataResult::DataAccessResult(code),
    }
}

pub fn handle_set(context: &RequestContext<'_>, request: SetRequest) -> Reply {
    let response = match request {
        SetRequest::Normal {
            invoke_id_and_priority,
            attribute,
            value,
        } => SetResponse::Normal {
            invoke_id_and_priority,
            result: set_attribute(context, attribute, value),
        },
        SetRequest::WithList {
            invoke_id_and_priority,
            attributes,
            values,
        } => {
            let mut values = values.into_iter();
            let results = attributes
                .into_iter()
                .map(|attribute| match values.next() {
                    Some(value) => set_attribute(context, attribute, value),
                    None => DataAccessResult::OtherReason,
                })
                .collect();
            SetResponse::WithList {
                invoke_id_and_priority,
                results,
            }
        }
    };
    Reply::Pdu(CosemPdu::SetResponse(response))
}

fn set_attribute(context: &RequestContext<'_>, attribute: AttributeReference, value: DataObject) -> DataAccessResult {
    let request = context.access_request(attribute.access_selection);
    context.device.set(&request, &attribute.descriptor, value)
}

/// ACTION on any method but reply-to-HLS, which the association loop answers.
pub fn handle_action(context: &RequestContext<'_>, request: ActionRequest) -> Reply {
    match request {
        ActionRequest::Normal {
            invoke_id_and_priority,
            method,
            parameters,
        } => {
            let response = invoke(context, &method, parameters);
            if let Some(GetDataResult::Data(value)) = &response.return_parameters {
                let encoded = encode_data(value);
                if context.exceeds(BlockService::Action, encoded.len()) {
                    return Reply::Blocks {
                        origin: BlockOrigin::Action(invoke_id_and_priority),
                        data: encoded,
                    };
                }
            }
            Reply::Pdu(CosemPdu::ActionResponse(ActionResponse::Normal {
                invoke_id_and_priority,
                response,
            }))
        }
        ActionRequest::NextPblock {
            invoke_id_and_priority,
            block_number,
        } => {
            log::warn!("action-request-next-pblock for block {} without a long ACTION", block_number);
            Reply::Pdu(CosemPdu::ActionResponse(ActionResponse::Normal {
                invoke_id_and_priority,
                response: ActionResponseWithOptionalData::failure(ActionResult::NoLongActionInProgress),
            }))
        }
        ActionRequest::WithList {
            invoke_id_and_priority,
            methods,
            parameters,
        } => {
            let mut parameters = parameters.into_iter();
            let responses: Vec<ActionResponseWithOptionalData> = methods
                .iter()
                .map(|method| {
                    let parameter = parameters.next().filter(|p| !p.is_null());
                    invoke(context, method, parameter)
                })
                .collect();
            let encoded = ActionResponseWithOptionalData::encode_list(&responses);
            if context.exceeds(BlockService::Action, encoded.len()) {
                Reply::Blocks {
                    origin: BlockOrigin::Action(invoke_id_and_priority),
                    data: encoded,
                }
            } else {
                Reply::Pdu(CosemPdu::ActionResponse(ActionResponse::WithList {
                    invoke_id_and_priority,
                    responses,
                }))
            }
        }
    }
}

fn invoke(
    context: &RequestContext<'_>,
    method: &CosemMethodDescriptor,
    parameters: Option<DataObject>,
) -> ActionResponseWithOptionalData {
    let request = context.access_request(None);
    match context.device.invoke_method(&request, method, parameters) {
        Ok(value) => ActionResponseWithOptionalData::success(value),
        Err(code) => ActionResponseWithOptionalData::failure(code),
    }
}

pub fn handle_read(context: &RequestContext<'_>, request: ReadRequest) -> Reply {
    let results: Vec<ReadResult> = request
        .variables
        .into_iter()
        .map(|variable| match variable {
            VariableAccessSpecification::VariableName(name) => read_variable(context, name, None),
            VariableAccessSpecification::ParameterizedAccess {
                variable_name,
                selector,
                parameter,
            } => read_variable(
                context,
                variable_name,
                Some(SelectiveAccessDescriptor::new(selector, parameter)),
            ),
            VariableAccessSpecification::BlockNumberAccess { block_number } => {
                log::warn!("READ of block {} without a long READ", block_number);
                ReadResult::DataAccessError(DataAccessResult::NoLongGetInProgress)
            }
        })
        .collect();
    let encoded = ReadResult::encode_list(&results);
    if context.exceeds(BlockService::Read, encoded.len()) {
        Reply::Blocks {
            origin: BlockOrigin::Read,
            data: encoded,
        }
    } else {
        Reply::Pdu(CosemPdu::ReadResponse(ReadResponse::new(results)))
    }
}

/// READ of an attribute, or invocation of a method with the parameter of a
/// parameterized access.
fn read_variable(
    context: &RequestContext<'_>,
    variable_name: u16,
    selection: Option<SelectiveAccessDescriptor>,
) -> ReadResult {
    let Some((object, member)) = context.device.resolve_short_name(variable_name) else {
        return ReadResult::DataAccessError(DataAccessResult::ObjectUndefined);
    };
    match member {
        ShortNameMember::Attribute(attribute_id) => {
            let request = context.access_request(selection);
            match context.device.get(&request, &attribute_of(&object, attribute_id)) {
                Ok(value) => ReadResult::Data(value),
                Err(code) => ReadResult::DataAccessError(code),
            }
        }
        ShortNameMember::Method(method_id) => {
            let parameters = selection.map(|s| s.access_parameters);
            let request = context.access_request(None);
            match context.device.invoke_method(&request, &method_of(&object, method_id), parameters) {
                Ok(value) => ReadResult::Data(value.unwrap_or_default()),
                Err(code) => ReadResult::DataAccessError(data_access_result(code)),
            }
        }
    }
}

pub fn handle_write(context: &RequestContext<'_>, request: WriteRequest) -> Reply {
    let mut values = request.values.into_iter();
    let results = request
        .variables
        .into_iter()
        .map(|variable| {
            let Some(value) = values.next() else {
                return DataAccessResult::OtherReason;
            };
            match variable {
                VariableAccessSpecification::VariableName(name) => write_variable(context, name, None, value),
                VariableAccessSpecification::ParameterizedAccess {
                    variable_name,
                    selector,
                    parameter,
                } => write_variable(
                    context,
                    variable_name,
                    Some(SelectiveAccessDescriptor::new(selector, parameter)),
                    value,
                ),
                VariableAccessSpecification::BlockNumberAccess { .. } => DataAccessResult::NoLongSetInProgress,
            }
        })
        .collect();
    Reply::Pdu(CosemPdu::WriteResponse(WriteResponse::new(results)))
}

/// WRITE of an attribute, or invocation of a method with the written value.
fn write_variable(
    context: &RequestContext<'_>,
    variable_name: u16,
    selection: Option<SelectiveAccessDescriptor>,
    value: DataObject,
) -> DataAccessResult {
    let Some((object, member)) = context.device.resolve_short_name(variable_name) else {
        return DataAccessResult::ObjectUndefined;
    };
    match member {
        ShortNameMember::Attribute(attribute_id) => {
            let request = context.access_request(selection);
            context.device.set(&request, &attribute_of(&object, attribute_id), value)
        }
        ShortNameMember::Method(method_id) => {
            let request = context.access_request(None);
            match context.device.invoke_method(&request, &method_of(&object, method_id), Some(value)) {
                Ok(_) => DataAccessResult::Success,
                Err(code) => data_access_result(code),
            }
        }
    }
}

fn attribute_of(object: &CosemObject, attribute_id: u8) -> CosemAttributeDescriptor {
    CosemAttributeDescriptor::new(object.class_id(), object.logical_name(), attribute_id)
}

fn method_of(object: &CosemObject, method_id: u8) -> CosemMethodDescriptor {
    CosemMethodDescriptor::new(object.class_id(), object.logical_name(), method_id)
}

/// Method failures reported through READ and WRITE share the result codes.
fn data_access_result(result: ActionResult) -> DataAccessResult {
    DataAccessResult::from_u8(result.value()).unwrap_or(DataAccessResult::OtherReason)
}
