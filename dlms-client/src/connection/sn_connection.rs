//! Short Name (SN) connection for DLMS/COSEM clients
//!
//! Objects are addressed by 16-bit variable names; data is exchanged with
//! READ and WRITE. An object's attribute `n` sits at `base + 8 * (n - 1)` and
//! its methods follow the attributes, so methods are invoked by READ (with a
//! parameter) or WRITE on their variable name.

use super::association::{access_error, unexpected_response, ClientAssociation};
use super::connection::Connection;
use crate::config::ClientConfig;
use dlms_application::block_transfer::BlockAssembler;
use dlms_application::pdu::{
    CosemPdu, DataAccessResult, ReadRequest, ReadResult, VariableAccessSpecification, WriteRequest,
};
use dlms_core::{DataObject, DlmsError, DlmsResult};
use dlms_security::SecuritySuite;
use dlms_session::SessionLayer;
use std::sync::Arc;

/// Spacing of consecutive members in the short-name space
pub const SHORT_NAME_STEP: u16 = 8;

/// Variable name of attribute `attribute_id` of the object at `base_name`.
pub fn attribute_variable_name(base_name: u16, attribute_id: u8) -> u16 {
    base_name.wrapping_add(SHORT_NAME_STEP.wrapping_mul(u16::from(attribute_id.saturating_sub(1))))
}

/// Variable name of method `method_id` of an object with `attribute_count` attributes.
pub fn method_variable_name(base_name: u16, attribute_count: u8, method_id: u8) -> u16 {
    let offset = u16::from(attribute_count) + u16::from(method_id.saturating_sub(1));
    base_name.wrapping_add(SHORT_NAME_STEP.wrapping_mul(offset))
}

pub struct SnConnection<S: SessionLayer> {
    association: ClientAssociation<S>,
}

impl<S: SessionLayer> SnConnection<S> {
    pub fn new(session: S, security_suite: Arc<SecuritySuite>, config: ClientConfig) -> Self {
        Self {
            association: ClientAssociation::new(session, security_suite, config, false),
        }
    }

    pub fn association(&self) -> &ClientAssociation<S> {
        &self.association
    }

    /// READ one variable.
    ///
    /// # Errors
    /// `AccessDenied` carrying the data-access-result on a read error.
    pub async fn read(&mut self, variable_name: u16) -> DlmsResult<DataObject> {
        let results = self
            .read_list(vec![VariableAccessSpecification::VariableName(variable_name)])
            .await?;
        single_value(results)
    }

    /// READ with parameterized access: selective access on an attribute, or
    /// the parameter of a method invoked by READ.
    pub async fn read_parameterized(
        &mut self,
        variable_name: u16,
        selector: u8,
        parameter: DataObject,
    ) -> DlmsResult<DataObject> {
        let results = self
            .read_list(vec![VariableAccessSpecification::ParameterizedAccess {
                variable_name,
                selector,
                parameter,
            }])
            .await?;
        single_value(results)
    }

    /// READ several variables; one result per variable, long responses reassembled.
    pub async fn read_list(&mut self, variables: Vec<VariableAccessSpecification>) -> DlmsResult<Vec<ReadResult>> {
        let mut results = self.send_read(ReadRequest::new(variables)).await?;
        let mut assembler = BlockAssembler::new();
        loop {
            let block = match results.as_mut_slice() {
                [ReadResult::DataBlockResult {
                    last_block,
                    block_number,
                    raw_data,
                }] => Some((*last_block, *block_number, std::mem::take(raw_data))),
                _ => None,
            };
            let Some((last_block, block_number, raw_data)) = block else {
                if assembler.last_received() == 0 {
                    return Ok(results);
                }
                return Err(DlmsError::Protocol(
                    "READ block transfer interrupted by a plain response".to_string(),
                ));
            };
            if assembler.push(u32::from(block_number), last_block, &raw_data)? {
                return ReadResult::decode_list(&assembler.into_data()?);
            }
            log::debug!("READ block {} received", block_number);
            results = self
                .send_read(ReadRequest::new(vec![VariableAccessSpecification::BlockNumberAccess {
                    block_number,
                }]))
                .await?;
        }
    }

    async fn send_read(&mut self, request: ReadRequest) -> DlmsResult<Vec<ReadResult>> {
        match self.association.request(&CosemPdu::ReadRequest(request)).await? {
            CosemPdu::ReadResponse(response) => Ok(response.results),
            other => Err(unexpected_response(&other)),
        }
    }

    /// WRITE one variable.
    pub async fn write(&mut self, variable_name: u16, value: DataObject) -> DlmsResult<()> {
        let results = self.write_list(vec![(variable_name, value)]).await?;
        match results.as_slice() {
            [DataAccessResult::Success] => Ok(()),
            [result] => Err(access_error(*result)),
            _ => Err(DlmsError::Protocol(format!(
                "write-response with {} results to a single WRITE",
                results.len()
            ))),
        }
    }

    /// WRITE several variables; one result per variable.
    pub async fn write_list(&mut self, items: Vec<(u16, DataObject)>) -> DlmsResult<Vec<DataAccessResult>> {
        let (variables, values) = items
            .into_iter()
            .map(|(name, value)| (VariableAccessSpecification::VariableName(name), value))
            .unzip();
        match self
            .association
            .request(&CosemPdu::WriteRequest(WriteRequest::new(variables, values)))
            .await?
        {
            CosemPdu::WriteResponse(response) => Ok(response.results),
            other => Err(unexpected_response(&other)),
        }
    }
}

fn single_value(results: Vec<ReadResult>) -> DlmsResult<DataObject> {
    let mut results = results.into_iter();
    match (results.next(), results.next()) {
        (Some(ReadResult::Data(value)), None) => Ok(value),
        (Some(ReadResult::DataAccessError(result)), None) => Err(access_error(result)),
        _ => Err(DlmsError::Protocol("Expected exactly one read result".to_string())),
    }
}

#[async_trait::async_trait]
impl<S: SessionLayer> Connection for SnConnection<S> {
    async fn open(&mut self) -> DlmsResult<()> {
        self.association.open().await
    }

    async fn close(&mut self) -> DlmsResult<()> {
        self.association.release().await
    }

    fn is_open(&self) -> bool {
        self.association.is_open()
    }
}
