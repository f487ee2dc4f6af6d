//! Client side of one association
//!
//! Shared by the LN and SN connections: the AARQ/AARE handshake, the HLS
//! reply, ciphering of requests and responses, and release.

use crate::config::ClientConfig;
use dlms_application::pdu::{
    ActionRequest, ActionResponse, ActionResult, ConfirmedServiceError, Conformance, CosemPdu,
    DataAccessResult, ExceptionResponse, GetDataResult, InitiateRequest, InvokeIdAndPriority,
};
use dlms_application::{AssociationState, ConnectionState};
use dlms_asn1::iso_acse::{mechanism_oid, AssociateResult, AssociateSourceDiagnostic, ReleaseRequestReason};
use dlms_asn1::{AARQApdu, AAREApdu, AcseApdu, ContextId, RLRQApdu};
use dlms_core::{DataObject, DlmsError, DlmsResult};
use dlms_interface::AssociationLn;
use dlms_security::encryption::{is_glo_tag, SECURITY_HEADER_LENGTH, TAG_LENGTH};
use dlms_security::{authentication, AuthenticationMechanism, SecuritySuite, SystemTitle};
use dlms_session::SessionLayer;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Glo tag, length (up to 3 bytes), security header and authentication tag
const CIPHER_OVERHEAD: usize = 1 + 3 + SECURITY_HEADER_LENGTH + TAG_LENGTH;

async fn bounded<T>(timeout: Duration, operation: impl Future<Output = DlmsResult<T>>) -> DlmsResult<T> {
    tokio::time::timeout(timeout, operation)
        .await
        .map_err(|_| DlmsError::Timeout)?
}

pub(crate) fn not_open() -> DlmsError {
    DlmsError::Connection(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "Connection is not open",
    ))
}

pub(crate) fn unexpected_response(pdu: &CosemPdu) -> DlmsError {
    DlmsError::Protocol(format!("Unexpected {} in response", pdu.kind()))
}

pub(crate) fn access_error(result: DataAccessResult) -> DlmsError {
    DlmsError::AccessDenied(format!("{:?}", result))
}

pub struct ClientAssociation<S: SessionLayer> {
    session: S,
    config: ClientConfig,
    state: ConnectionState,
    logical_name: bool,
    client_title: SystemTitle,
    server_max_pdu_size: u16,
}

impl<S: SessionLayer> ClientAssociation<S> {
    pub fn new(session: S, security_suite: Arc<SecuritySuite>, config: ClientConfig, logical_name: bool) -> Self {
        let client_title = config.system_title();
        Self {
            session,
            config,
            state: ConnectionState::new(security_suite),
            logical_name,
            client_title,
            server_max_pdu_size: 0,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        self.state.state().is_established()
    }

    /// Largest APDU the server accepts
    pub fn server_max_pdu_size(&self) -> u16 {
        self.server_max_pdu_size
    }

    pub fn negotiated_conformance(&self) -> Conformance {
        self.state.negotiated_conformance()
    }

    pub(crate) fn next_invoke_id(&mut self) -> InvokeIdAndPriority {
        self.state.next_invoke_id()
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> &S {
        &self.session
    }

    /// Open the session and run the AARQ/AARE handshake, with the HLS reply
    /// when the suite asks for it.
    ///
    /// # Errors
    /// `AuthenticationFailure` when the server rejects the credentials or its
    /// own HLS proof does not verify; `Protocol` for any other rejection.
    pub async fn open(&mut self) -> DlmsResult<()> {
        if self.state.state() != AssociationState::Disconnected {
            return Err(DlmsError::Protocol(format!(
                "Cannot open an association in state {}",
                self.state.state()
            )));
        }
        bounded(self.config.response_timeout(), self.session.initialize()).await?;
        self.state.transition_to(AssociationState::Negotiating)?;

        let result = self.associate().await;
        if result.is_err() {
            self.state.close();
            if let Err(e) = self.session.close().await {
                log::debug!("Closing session after failed association: {}", e);
            }
        }
        result
    }

    async fn associate(&mut self) -> DlmsResult<()> {
        let suite = Arc::clone(self.state.security_suite());
        let mechanism = suite.authentication_mechanism();
        let ciphered = suite.security_policy().is_ciphered();
        let context = ContextId::new(self.logical_name, ciphered);
        self.state.set_context(context);
        self.state.client_system_title = Some(self.client_title);

        let mut aarq = AARQApdu::new(context);
        if ciphered || mechanism == AuthenticationMechanism::HlsGmac {
            aarq.calling_ap_title = Some(self.client_title.as_slice().to_vec());
        }
        if mechanism != AuthenticationMechanism::None {
            aarq.sender_acse_requirements = true;
            aarq.mechanism_name = Some(mechanism_oid(mechanism.id()));
        }
        match mechanism {
            AuthenticationMechanism::None => {}
            AuthenticationMechanism::Low => {
                let password = suite
                    .password()
                    .ok_or_else(|| DlmsError::Security("LOW authentication requires a password".to_string()))?;
                aarq.calling_authentication_value = Some(password.to_vec());
            }
            _ => {
                let challenge = authentication::generate_challenge(self.config.challenge_length)?;
                aarq.calling_authentication_value = Some(challenge.clone());
                self.state.client_to_server_challenge = Some(challenge);
            }
        }
        let initiate = InitiateRequest::new(self.config.conformance(), self.config.max_pdu_size).encode();
        aarq.user_information = Some(if ciphered {
            self.state.protect(&initiate, &self.client_title)?
        } else {
            initiate
        });

        self.send(&aarq.encode()?).await?;
        let aare = match AcseApdu::decode(&self.receive().await?)? {
            AcseApdu::Aare(aare) => aare,
            other => return Err(DlmsError::Protocol(format!("Expected AARE, got {:?}", other))),
        };
        if aare.result != AssociateResult::Accepted {
            return Err(rejection(&aare));
        }

        let server_title = aare
            .responding_ap_title
            .as_deref()
            .map(SystemTitle::from_slice)
            .transpose()?;
        self.state.server_system_title = server_title;

        let user_information = aare
            .user_information
            .as_deref()
            .ok_or_else(|| DlmsError::Protocol("AARE carries no initiate-response".to_string()))?;
        let plaintext = if ciphered {
            let title = server_title
                .ok_or_else(|| DlmsError::Cipher("Ciphered AARE without a responding AP title".to_string()))?;
            self.state.unprotect(user_information, &title)?
        } else {
            user_information.to_vec()
        };
        let response = match CosemPdu::decode(&plaintext)? {
            CosemPdu::InitiateResponse(response) => response,
            other => return Err(unexpected_response(&other)),
        };
        self.server_max_pdu_size = response.server_max_receive_pdu_size;
        self.state
            .set_negotiated(response.server_max_receive_pdu_size, response.negotiated_conformance);

        if mechanism.is_hls_mechanism() {
            self.state.transition_to(AssociationState::AuthChallengePending)?;
            let challenge = aare
                .responding_authentication_value
                .clone()
                .ok_or_else(|| DlmsError::AuthenticationFailure("AARE carries no server challenge".to_string()))?;
            self.state.server_to_client_challenge = Some(challenge);
            self.reply_to_hls(&suite).await?;
        } else {
            self.state.transition_to(AssociationState::AuthNone)?;
        }
        self.state.set_authenticated(mechanism != AuthenticationMechanism::None);
        self.state.transition_to(AssociationState::Established)?;
        log::info!(
            "Association established ({:?}, {:?}, server max PDU {})",
            context,
            mechanism,
            self.server_max_pdu_size
        );
        Ok(())
    }

    /// Answer the server's challenge and check its proof over ours.
    async fn reply_to_hls(&mut self, suite: &SecuritySuite) -> DlmsResult<()> {
        let mechanism = suite.authentication_mechanism();
        let server_challenge = self.state.server_to_client_challenge.clone().unwrap_or_default();
        let frame_counter = match mechanism {
            AuthenticationMechanism::HlsGmac => self.state.next_frame_counter()?,
            _ => 0,
        };
        let reply = authentication::process_challenge(&server_challenge, suite, &self.client_title, frame_counter)?;

        let invoke_id_and_priority = self.next_invoke_id();
        let request = CosemPdu::ActionRequest(ActionRequest::Normal {
            invoke_id_and_priority,
            method: AssociationLn::reply_to_hls_method(),
            parameters: Some(DataObject::OctetString(reply)),
        });
        let response = match self.exchange(&request).await? {
            CosemPdu::ActionResponse(ActionResponse::Normal { response, .. }) => response,
            other => return Err(unexpected_response(&other)),
        };
        let proof = match (response.result, response.return_parameters) {
            (ActionResult::Success, Some(GetDataResult::Data(DataObject::OctetString(proof)))) => proof,
            (result, _) => {
                return Err(DlmsError::AuthenticationFailure(format!(
                    "Server refused the HLS reply ({:?})",
                    result
                )));
            }
        };

        let challenge = self.state.client_to_server_challenge.clone().unwrap_or_default();
        let expected = match mechanism {
            AuthenticationMechanism::HlsGmac => {
                let server_title = self.state.server_system_title.ok_or_else(|| {
                    DlmsError::AuthenticationFailure("HLS-GMAC without a server system title".to_string())
                })?;
                let frame_counter = authentication::gmac_frame_counter(&proof)
                    .ok_or_else(|| DlmsError::AuthenticationFailure("Malformed GMAC proof".to_string()))?;
                authentication::process_gmac(&challenge, suite, &server_title, frame_counter)?
            }
            _ => authentication::process_challenge(&challenge, suite, &self.client_title, 0)?,
        };
        if !authentication::verify(&expected, &proof) {
            log::warn!("Server HLS proof did not verify");
            return Err(DlmsError::AuthenticationFailure(
                "Server proof of key possession did not verify".to_string(),
            ));
        }
        Ok(())
    }

    /// Send one request in an established association and return its response.
    ///
    /// # Errors
    /// `Protocol` for an exception-response, besides transport and cipher faults.
    pub async fn request(&mut self, pdu: &CosemPdu) -> DlmsResult<CosemPdu> {
        if !self.is_open() {
            return Err(not_open());
        }
        let encoded_len = pdu.encode().len() + if self.state.is_ciphered() { CIPHER_OVERHEAD } else { 0 };
        if encoded_len > usize::from(self.server_max_pdu_size) {
            return Err(DlmsError::Protocol(format!(
                "{} of {} bytes exceeds the server's max PDU size {}",
                pdu.kind(),
                encoded_len,
                self.server_max_pdu_size
            )));
        }
        self.exchange(pdu).await
    }

    async fn exchange(&mut self, pdu: &CosemPdu) -> DlmsResult<CosemPdu> {
        let encoded = pdu.encode();
        let apdu = if self.state.is_ciphered() {
            self.state.protect(&encoded, &self.client_title)?
        } else {
            encoded
        };
        self.send(&apdu).await?;

        let message = self.receive().await?;
        let tag = *message
            .first()
            .ok_or_else(|| DlmsError::ProtocolDecode("Empty APDU".to_string()))?;
        let response = if is_glo_tag(tag) {
            let title = self
                .state
                .server_system_title
                .ok_or_else(|| DlmsError::Cipher("Ciphered response without a server system title".to_string()))?;
            CosemPdu::decode(&self.state.unprotect(&message, &title)?)?
        } else {
            let response = CosemPdu::decode(&message)?;
            if self.state.is_ciphered() && !matches!(response, CosemPdu::ExceptionResponse(_)) {
                return Err(DlmsError::Cipher(format!(
                    "Unprotected {} in a ciphered association",
                    response.kind()
                )));
            }
            response
        };
        match response {
            CosemPdu::ExceptionResponse(ExceptionResponse {
                state_error,
                service_error,
            }) => Err(DlmsError::Protocol(format!(
                "Exception response: {:?}, {:?}",
                state_error, service_error
            ))),
            response => Ok(response),
        }
    }

    /// Release the association with an RLRQ and close the session.
    pub async fn release(&mut self) -> DlmsResult<()> {
        let result = if self.is_open() {
            self.state.transition_to(AssociationState::Releasing)?;
            self.send_release().await
        } else {
            Ok(())
        };
        self.state.close();
        let closed = self.session.close().await;
        result.and(closed)
    }

    async fn send_release(&mut self) -> DlmsResult<()> {
        self.send(&RLRQApdu::new(ReleaseRequestReason::Normal).encode()?).await?;
        match AcseApdu::decode(&self.receive().await?)? {
            AcseApdu::Rlre(rlre) => {
                log::info!("Association released ({:?})", rlre.reason);
                Ok(())
            }
            other => Err(DlmsError::Protocol(format!("Expected RLRE, got {:?}", other))),
        }
    }

    async fn send(&mut self, apdu: &[u8]) -> DlmsResult<()> {
        bounded(self.config.response_timeout(), self.session.send(apdu)).await
    }

    async fn receive(&mut self) -> DlmsResult<Vec<u8>> {
        bounded(self.config.response_timeout(), self.session.read_next_message()).await
    }
}

fn rejection(aare: &AAREApdu) -> DlmsError {
    let service_error = aare
        .user_information
        .as_deref()
        .and_then(|info| ConfirmedServiceError::decode(info).ok());
    log::warn!(
        "Association rejected: {:?}, {:?}, {:?}",
        aare.result,
        aare.result_source_diagnostic,
        service_error
    );
    match aare.result_source_diagnostic {
        AssociateSourceDiagnostic::ServiceUser(diagnostic) if is_authentication_diagnostic(diagnostic.value()) => {
            DlmsError::AuthenticationFailure(format!("Association rejected: {:?}", diagnostic))
        }
        diagnostic => DlmsError::Protocol(match service_error {
            Some(error) => format!("Association rejected: {:?}, {:?}", diagnostic, error.error),
            None => format!("Association rejected: {:?}", diagnostic),
        }),
    }
}

/// Diagnostics 11..=14 concern the authentication mechanism or its value.
fn is_authentication_diagnostic(value: u8) -> bool {
    (11..=14).contains(&value)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use dlms_application::pdu::{GetRequest, GetResponse, InitiateResponse, VAA_NAME_LN};
    use dlms_asn1::iso_acse::AcseServiceUserDiagnostic;
    use std::collections::VecDeque;

    /// Session answering each send with the next scripted message
    #[derive(Default)]
    pub(crate) struct ScriptedSession {
        pub(crate) replies: VecDeque<Vec<u8>>,
        pub(crate) sent: Vec<Vec<u8>>,
        pub(crate) closed: bool,
    }

    impl ScriptedSession {
        pub(crate) fn new(replies: Vec<Vec<u8>>) -> Self {
            Self {
                replies: replies.into(),
                ..Default::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl SessionLayer for ScriptedSession {
        async fn initialize(&mut self) -> DlmsResult<()> {
            Ok(())
        }

        async fn read_next_message(&mut self) -> DlmsResult<Vec<u8>> {
            self.replies.pop_front().ok_or(DlmsError::CleanShutdown)
        }

        async fn send(&mut self, apdu: &[u8]) -> DlmsResult<()> {
            self.sent.push(apdu.to_vec());
            Ok(())
        }

        async fn close(&mut self) -> DlmsResult<()> {
            self.closed = true;
            Ok(())
        }

        fn client_id(&self) -> u16 {
            0x10
        }

        fn logical_device_id(&self) -> u16 {
            1
        }
    }

    pub(crate) fn accepting_aare(logical_name: bool, max_pdu_size: u16) -> Vec<u8> {
        let context = ContextId::new(logical_name, false);
        let mut aare = AAREApdu::new(context.oid(), AssociateResult::Accepted, AssociateSourceDiagnostic::default());
        let conformance = if logical_name {
            Conformance::logical_name_default()
        } else {
            Conformance::short_name_default()
        };
        aare.user_information = Some(InitiateResponse::new(conformance, max_pdu_size, VAA_NAME_LN).encode());
        aare.encode().unwrap()
    }

    fn association(replies: Vec<Vec<u8>>) -> ClientAssociation<ScriptedSession> {
        ClientAssociation::new(
            ScriptedSession::new(replies),
            Arc::new(SecuritySuite::default()),
            ClientConfig::default(),
            true,
        )
    }

    #[tokio::test]
    async fn test_open_without_authentication() {
        let mut association = association(vec![accepting_aare(true, 512)]);
        association.open().await.unwrap();

        assert!(association.is_open());
        assert_eq!(association.server_max_pdu_size(), 512);
        assert_eq!(association.negotiated_conformance(), Conformance::logical_name_default());

        let AcseApdu::Aarq(aarq) = AcseApdu::decode(&association.session.sent[0]).unwrap() else {
            panic!("expected an AARQ");
        };
        assert_eq!(aarq.context_id(), Some(ContextId::LogicalNameReferencingNoCiphering));
        assert!(aarq.calling_ap_title.is_none());
        assert!(aarq.mechanism_name.is_none());
        let CosemPdu::InitiateRequest(initiate) = CosemPdu::decode(aarq.user_information.as_deref().unwrap()).unwrap()
        else {
            panic!("expected an initiate-request");
        };
        assert_eq!(initiate.client_max_receive_pdu_size, 1024);
    }

    #[tokio::test]
    async fn test_authentication_rejection_closes_session() {
        let rejected = AAREApdu::rejected(
            ContextId::LogicalNameReferencingNoCiphering.oid(),
            AssociateResult::RejectedPermanent,
            AcseServiceUserDiagnostic::AuthenticationFailure,
        );
        let mut association = association(vec![rejected.encode().unwrap()]);

        let result = association.open().await;
        assert!(matches!(result, Err(DlmsError::AuthenticationFailure(_))));
        assert!(association.state().state().is_closed());
        assert!(association.session.closed);
    }

    #[tokio::test]
    async fn test_request_before_open_fails() {
        let mut association = association(vec![]);
        let request = CosemPdu::GetRequest(GetRequest::Next {
            invoke_id_and_priority: InvokeIdAndPriority::new(0, true),
            block_number: 1,
        });
        let result = association.request(&request).await;
        assert!(matches!(result, Err(DlmsError::Connection(e)) if e.kind() == std::io::ErrorKind::NotConnected));
    }

    #[tokio::test]
    async fn test_exception_response_is_an_error() {
        let exception = CosemPdu::ExceptionResponse(ExceptionResponse::new(
            dlms_application::pdu::StateError::ServiceNotAllowed,
            dlms_application::pdu::ServiceError::OperationNotPossible,
        ));
        let mut association = association(vec![accepting_aare(true, 512), exception.encode()]);
        association.open().await.unwrap();

        let request = CosemPdu::GetRequest(GetRequest::Next {
            invoke_id_and_priority: InvokeIdAndPriority::new(0, true),
            block_number: 1,
        });
        let result = association.request(&request).await;
        assert!(matches!(result, Err(DlmsError::Protocol(message)) if message.contains("OperationNotPossible")));
    }

    #[tokio::test]
    async fn test_oversized_request_is_refused_locally() {
        let mut association = association(vec![accepting_aare(true, 16)]);
        association.open().await.unwrap();

        let request = CosemPdu::GetResponse(GetResponse::Normal {
            invoke_id_and_priority: InvokeIdAndPriority::new(0, true),
            result: GetDataResult::Data(DataObject::OctetString(vec![0; 64])),
        });
        assert!(matches!(association.request(&request).await, Err(DlmsError::Protocol(_))));
        assert_eq!(association.session.sent.len(), 1);
    }

    #[tokio::test]
    async fn test_release_sends_rlrq() {
        let rlre = dlms_asn1::RLREApdu::new(dlms_asn1::iso_acse::ReleaseResponseReason::Normal);
        let mut association = association(vec![accepting_aare(true, 512), rlre.encode().unwrap()]);
        association.open().await.unwrap();
        association.release().await.unwrap();

        assert!(matches!(
            AcseApdu::decode(&association.session.sent[1]).unwrap(),
            AcseApdu::Rlrq(RLRQApdu {
                reason: Some(ReleaseRequestReason::Normal),
                ..
            })
        ));
        assert!(association.state().state().is_closed());
        assert!(association.session.closed);
    }
}
