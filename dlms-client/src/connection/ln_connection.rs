//! Logical Name (LN) connection for DLMS/COSEM clients
//!
//! Objects are addressed by class id and OBIS code; data is exchanged with
//! GET, SET and ACTION. Long GET and ACTION responses are reassembled from
//! their blocks transparently.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use dlms_client::{ClientConfig, Connection, LnConnection};
//! use dlms_core::ObisCode;
//! use dlms_security::SecuritySuite;
//! use std::sync::Arc;
//!
//! # async fn run(session: impl dlms_session::SessionLayer) -> dlms_core::DlmsResult<()> {
//! let mut conn = LnConnection::new(session, Arc::new(SecuritySuite::default()), ClientConfig::default());
//! conn.open().await?;
//! let value = conn.get_attribute(ObisCode::new(1, 1, 1, 8, 0, 255), 3, 2).await?;
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

use super::association::{access_error, unexpected_response, ClientAssociation};
use super::connection::Connection;
use crate::config::ClientConfig;
use dlms_application::block_transfer::BlockAssembler;
use dlms_application::pdu::{
    decode_data, ActionRequest, ActionResponse, ActionResponseWithOptionalData, ActionResult,
    AttributeReference, CosemAttributeDescriptor, CosemMethodDescriptor, CosemPdu, DataAccessResult,
    DataBlockResult, GetDataResult, GetRequest, GetResponse, InvokeIdAndPriority, SetRequest, SetResponse,
};
use dlms_core::{DataObject, DlmsError, DlmsResult, ObisCode};
use dlms_security::SecuritySuite;
use dlms_session::SessionLayer;
use std::sync::Arc;

/// What a GET request came back with, after block reassembly
enum GetOutcome {
    Single(GetDataResult),
    List(Vec<GetDataResult>),
    Blocks(Vec<u8>),
}

enum ActionOutcome {
    Single(ActionResponseWithOptionalData),
    List(Vec<ActionResponseWithOptionalData>),
    Blocks(Vec<u8>),
}

pub struct LnConnection<S: SessionLayer> {
    association: ClientAssociation<S>,
}

impl<S: SessionLayer> LnConnection<S> {
    pub fn new(session: S, security_suite: Arc<SecuritySuite>, config: ClientConfig) -> Self {
        Self {
            association: ClientAssociation::new(session, security_suite, config, true),
        }
    }

    pub fn association(&self) -> &ClientAssociation<S> {
        &self.association
    }

    pub async fn get_attribute(&mut self, obis_code: ObisCode, class_id: u16, attribute_id: u8) -> DlmsResult<DataObject> {
        let descriptor = CosemAttributeDescriptor::new(class_id, obis_code, attribute_id);
        self.get(AttributeReference::new(descriptor)).await
    }

    /// GET one attribute, optionally with selective access.
    ///
    /// # Errors
    /// `AccessDenied` carrying the data-access-result when the server has no
    /// value for the attribute.
    pub async fn get(&mut self, attribute: AttributeReference) -> DlmsResult<DataObject> {
        let invoke_id_and_priority = self.association.next_invoke_id();
        let request = GetRequest::Normal {
            invoke_id_and_priority,
            attribute,
        };
        match self.send_get(request).await? {
            GetOutcome::Single(GetDataResult::Data(value)) => Ok(value),
            GetOutcome::Single(GetDataResult::DataAccessResult(result)) => Err(access_error(result)),
            GetOutcome::Blocks(data) => decode_data(&data),
            GetOutcome::List(_) => Err(DlmsError::Protocol("get-response-with-list to a single GET".to_string())),
        }
    }

    /// GET several attributes in one request; one result per attribute.
    pub async fn get_with_list(&mut self, attributes: Vec<AttributeReference>) -> DlmsResult<Vec<GetDataResult>> {
        let invoke_id_and_priority = self.association.next_invoke_id();
        let request = GetRequest::WithList {
            invoke_id_and_priority,
            attributes,
        };
        match self.send_get(request).await? {
            GetOutcome::List(results) => Ok(results),
            GetOutcome::Blocks(data) => GetDataResult::decode_list(&data),
            GetOutcome::Single(_) => Err(DlmsError::Protocol("get-response-normal to a GET with-list".to_string())),
        }
    }

    async fn send_get(&mut self, request: GetRequest) -> DlmsResult<GetOutcome> {
        let invoke_id_and_priority = request.invoke_id_and_priority();
        let mut response = self.get_response(request, invoke_id_and_priority).await?;
        let mut assembler = BlockAssembler::new();
        loop {
            match response {
                GetResponse::Normal { result, .. } => return Ok(GetOutcome::Single(result)),
                GetResponse::WithList { results, .. } => return Ok(GetOutcome::List(results)),
                GetResponse::WithDataBlock {
                    result: DataBlockResult::DataAccessResult(result),
                    ..
                } => return Err(access_error(result)),
                GetResponse::WithDataBlock {
                    last_block,
                    block_number,
                    result: DataBlockResult::RawData(data),
                    ..
                } => {
                    if assembler.push(block_number, last_block, &data)? {
                        return Ok(GetOutcome::Blocks(assembler.into_data()?));
                    }
                    log::debug!("GET block {} received", block_number);
                    let next = GetRequest::Next {
                        invoke_id_and_priority,
                        block_number,
                    };
                    response = self.get_response(next, invoke_id_and_priority).await?;
                }
            }
        }
    }

    async fn get_response(
        &mut self,
        request: GetRequest,
        invoke_id_and_priority: InvokeIdAndPriority,
    ) -> DlmsResult<GetResponse> {
        match self.association.request(&CosemPdu::GetRequest(request)).await? {
            CosemPdu::GetResponse(response)
                if response.invoke_id_and_priority().invoke_id() == invoke_id_and_priority.invoke_id() =>
            {
                Ok(response)
            }
            other => Err(unexpected_response(&other)),
        }
    }

    pub async fn set_attribute(
        &mut self,
        obis_code: ObisCode,
        class_id: u16,
        attribute_id: u8,
        value: DataObject,
    ) -> DlmsResult<()> {
        let descriptor = CosemAttributeDescriptor::new(class_id, obis_code, attribute_id);
        self.set(AttributeReference::new(descriptor), value).await
    }

    /// SET one attribute.
    ///
    /// # Errors
    /// `AccessDenied` for any result but success; `Protocol` when the request
    /// does not fit the server's PDU size, since block-wise SET is not offered.
    pub async fn set(&mut self, attribute: AttributeReference, value: DataObject) -> DlmsResult<()> {
        let invoke_id_and_priority = self.association.next_invoke_id();
        let request = SetRequest::Normal {
            invoke_id_and_priority,
            attribute,
            value,
        };
        match self.send_set(request).await? {
            SetResponse::Normal {
                result: DataAccessResult::Success,
                ..
            } => Ok(()),
            SetResponse::Normal { result, .. } => Err(access_error(result)),
            SetResponse::WithList { .. } => {
                Err(DlmsError::Protocol("set-response-with-list to a single SET".to_string()))
            }
        }
    }

    /// SET several attributes in one request; one result per attribute.
    pub async fn set_with_list(
        &mut self,
        items: Vec<(AttributeReference, DataObject)>,
    ) -> DlmsResult<Vec<DataAccessResult>> {
        let invoke_id_and_priority = self.association.next_invoke_id();
        let (attributes, values) = items.into_iter().unzip();
        let request = SetRequest::WithList {
            invoke_id_and_priority,
            attributes,
            values,
        };
        match self.send_set(request).await? {
            SetResponse::WithList { results, .. } => Ok(results),
            SetResponse::Normal { .. } => {
                Err(DlmsError::Protocol("set-response-normal to a SET with-list".to_string()))
            }
        }
    }

    async fn send_set(&mut self, request: SetRequest) -> DlmsResult<SetResponse> {
        let invoke_id = request.invoke_id_and_priority().invoke_id();
        match self.association.request(&CosemPdu::SetRequest(request)).await? {
            CosemPdu::SetResponse(response) if response.invoke_id_and_priority().invoke_id() == invoke_id => {
                Ok(response)
            }
            other => Err(unexpected_response(&other)),
        }
    }

    pub async fn invoke_method(
        &mut self,
        obis_code: ObisCode,
        class_id: u16,
        method_id: u8,
        parameters: Option<DataObject>,
    ) -> DlmsResult<Option<DataObject>> {
        self.action(CosemMethodDescriptor::new(class_id, obis_code, method_id), parameters)
            .await
    }

    /// ACTION on one method, returning its return parameters if any.
    ///
    /// # Errors
    /// `AccessDenied` carrying the action-result for any result but success.
    pub async fn action(
        &mut self,
        method: CosemMethodDescriptor,
        parameters: Option<DataObject>,
    ) -> DlmsResult<Option<DataObject>> {
        let invoke_id_and_priority = self.association.next_invoke_id();
        let request = ActionRequest::Normal {
            invoke_id_and_priority,
            method,
            parameters,
        };
        match self.send_action(request).await? {
            ActionOutcome::Single(response) => match (response.result, response.return_parameters) {
                (ActionResult::Success, None) => Ok(None),
                (ActionResult::Success, Some(GetDataResult::Data(value))) => Ok(Some(value)),
                (ActionResult::Success, Some(GetDataResult::DataAccessResult(result))) => Err(access_error(result)),
                (result, _) => Err(DlmsError::AccessDenied(format!("{:?}", result))),
            },
            ActionOutcome::Blocks(data) => Ok(Some(decode_data(&data)?)),
            ActionOutcome::List(_) => {
                Err(DlmsError::Protocol("action-response-with-list to a single ACTION".to_string()))
            }
        }
    }

    /// ACTION on several methods in one request; one response per method.
    pub async fn action_with_list(
        &mut self,
        items: Vec<(CosemMethodDescriptor, Option<DataObject>)>,
    ) -> DlmsResult<Vec<ActionResponseWithOptionalData>> {
        let invoke_id_and_priority = self.association.next_invoke_id();
        let (methods, parameters) = items
            .into_iter()
            .map(|(method, parameter)| (method, parameter.unwrap_or_default()))
            .unzip();
        let request = ActionRequest::WithList {
            invoke_id_and_priority,
            methods,
            parameters,
        };
        match self.send_action(request).await? {
            ActionOutcome::List(responses) => Ok(responses),
            ActionOutcome::Blocks(data) => ActionResponseWithOptionalData::decode_list(&data),
            ActionOutcome::Single(_) => {
                Err(DlmsError::Protocol("action-response-normal to an ACTION with-list".to_string()))
            }
        }
    }

    async fn send_action(&mut self, request: ActionRequest) -> DlmsResult<ActionOutcome> {
        let invoke_id_and_priority = request.invoke_id_and_priority();
        let mut response = self.action_response(request, invoke_id_and_priority).await?;
        let mut assembler = BlockAssembler::new();
        loop {
            match response {
                ActionResponse::Normal { response, .. } => return Ok(ActionOutcome::Single(response)),
                ActionResponse::WithList { responses, .. } => return Ok(ActionOutcome::List(responses)),
                ActionResponse::WithPblock {
                    last_block,
                    block_number,
                    raw_data,
                    ..
                } => {
                    if assembler.push(block_number, last_block, &raw_data)? {
                        return Ok(ActionOutcome::Blocks(assembler.into_data()?));
                    }
                    log::debug!("ACTION pblock {} received", block_number);
                    let next = ActionRequest::NextPblock {
                        invoke_id_and_priority,
                        block_number,
                    };
                    response = self.action_response(next, invoke_id_and_priority).await?;
                }
            }
        }
    }

    async fn action_response(
        &mut self,
        request: ActionRequest,
        invoke_id_and_priority: InvokeIdAndPriority,
    ) -> DlmsResult<ActionResponse> {
        match self.association.request(&CosemPdu::ActionRequest(request)).await? {
            CosemPdu::ActionResponse(response)
                if response.invoke_id_and_priority().invoke_id() == invoke_id_and_priority.invoke_id() =>
            {
                Ok(response)
            }
            other => Err(unexpected_response(&other)),
        }
    }
}

#[async_trait::async_trait]
impl<S: SessionLayer> Connection for LnConnection<S> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::association::tests::{accepting_aare, ScriptedSession};
    use dlms_application::pdu::encode_data;

    const CLOCK: ObisCode = ObisCode::new(0, 0, 1, 0, 0, 255);

    fn invoke_id(id: u8) -> InvokeIdAndPriority {
        InvokeIdAndPriority::new(id, true)
    }

    async fn open(replies: Vec<CosemPdu>) -> LnConnection<ScriptedSession> {
        let mut scripted = vec![accepting_aare(true, 1024)];
        scripted.extend(replies.iter().map(CosemPdu::encode));
        let mut connection = LnConnection::new(
            ScriptedSession::new(scripted),
            Arc::new(SecuritySuite::default()),
            ClientConfig::default(),
        );
        connection.open().await.unwrap();
        connection
    }

    fn sent_requests(connection: &LnConnection<ScriptedSession>) -> Vec<CosemPdu> {
        connection.association.session().sent[1..]
            .iter()
            .map(|apdu| CosemPdu::decode(apdu).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_get_reassembles_data_blocks() {
        let value = DataObject::OctetString((0..=255).collect());
        let encoded = encode_data(&value);
        let (first, second) = encoded.split_at(100);
        let mut connection = open(vec![
            CosemPdu::GetResponse(GetResponse::WithDataBlock {
                invoke_id_and_priority: invoke_id(0),
                last_block: false,
                block_number: 1,
                result: DataBlockResult::RawData(first.to_vec()),
            }),
            CosemPdu::GetResponse(GetResponse::WithDataBlock {
                invoke_id_and_priority: invoke_id(0),
                last_block: true,
                block_number: 2,
                result: DataBlockResult::RawData(second.to_vec()),
            }),
        ])
        .await;

        assert_eq!(connection.get_attribute(CLOCK, 8, 2).await.unwrap(), value);
        assert_eq!(
            sent_requests(&connection)[1],
            CosemPdu::GetRequest(GetRequest::Next {
                invoke_id_and_priority: invoke_id(0),
                block_number: 1,
            })
        );
    }

    #[tokio::test]
    async fn test_get_access_error() {
        let mut connection = open(vec![CosemPdu::GetResponse(GetResponse::Normal {
            invoke_id_and_priority: invoke_id(0),
            result: GetDataResult::DataAccessResult(DataAccessResult::ReadWriteDenied),
        })])
        .await;

        let result = connection.get_attribute(CLOCK, 8, 2).await;
        assert!(matches!(result, Err(DlmsError::AccessDenied(message)) if message == "ReadWriteDenied"));
    }

    #[tokio::test]
    async fn test_response_with_foreign_invoke_id_is_rejected() {
        let mut connection = open(vec![CosemPdu::GetResponse(GetResponse::Normal {
            invoke_id_and_priority: invoke_id(5),
            result: GetDataResult::Data(DataObject::Unsigned8(1)),
        })])
        .await;

        assert!(matches!(
            connection.get_attribute(CLOCK, 8, 2).await,
            Err(DlmsError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_action_with_list_sends_null_for_missing_parameters() {
        let mut connection = open(vec![CosemPdu::ActionResponse(ActionResponse::WithList {
            invoke_id_and_priority: invoke_id(0),
            responses: vec![
                ActionResponseWithOptionalData::success(None),
                ActionResponseWithOptionalData::failure(ActionResult::ReadWriteDenied),
            ],
        })])
        .await;

        let method = |id| CosemMethodDescriptor::new(8, CLOCK, id);
        let responses = connection
            .action_with_list(vec![(method(1), Some(DataObject::Integer8(-1))), (method(2), None)])
            .await
            .unwrap();
        assert_eq!(responses[1].result, ActionResult::ReadWriteDenied);
        assert_eq!(
            sent_requests(&connection)[0],
            CosemPdu::ActionRequest(ActionRequest::WithList {
                invoke_id_and_priority: invoke_id(0),
                methods: vec![method(1), method(2)],
                parameters: vec![DataObject::Integer8(-1), DataObject::Null],
            })
        );
    }

    #[tokio::test]
    async fn test_set_with_list_results() {
        let mut connection = open(vec![CosemPdu::SetResponse(SetResponse::WithList {
            invoke_id_and_priority: invoke_id(0),
            results: vec![DataAccessResult::Success, DataAccessResult::TypeUnmatched],
        })])
        .await;

        let attribute = |id| AttributeReference::new(CosemAttributeDescriptor::new(8, CLOCK, id));
        let results = connection
            .set_with_list(vec![
                (attribute(2), DataObject::Unsigned8(1)),
                (attribute(3), DataObject::Unsigned8(2)),
            ])
            .await
            .unwrap();
        assert_eq!(results, vec![DataAccessResult::Success, DataAccessResult::TypeUnmatched]);
    }
}
