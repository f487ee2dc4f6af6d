//! Server side of one association
//!
//! One [`Association`] owns one session. It reads the AARQ, answers with an
//! AARE, then serves requests one at a time until the client releases, the
//! transport fails, the peer goes quiet for longer than the inactivity
//! timeout or the server shuts down. Every exit closes the session.

use crate::config::ServerConfig;
use crate::directory::{LogicalDevice, ObjectDirectory};
use crate::handlers::{self, BlockOrigin, Reply, RequestContext};
use dlms_application::block_transfer::{BlockService, Fragments};
use dlms_application::pdu::{
    ActionRequest, ActionResponse, ActionResponseWithOptionalData, ActionResult,
    ConfirmedServiceError, CosemPdu, ExceptionResponse, InitiateError, InitiateRequest,
    InitiateResponse, InvokeIdAndPriority, ServiceError, StateError, DLMS_VERSION_6,
    SET_REQUEST_TAG, VAA_NAME_LN, VAA_NAME_SN,
};
use dlms_application::{APdu, AssociationState, ConnectionState};
use dlms_asn1::iso_acse::{
    mechanism_oid, AcseServiceUserDiagnostic, AssociateResult, AssociateSourceDiagnostic,
    ReleaseResponseReason,
};
use dlms_asn1::{AARQApdu, AAREApdu, AcseApdu, RLREApdu, RLRQApdu};
use dlms_core::{DataObject, DlmsError, DlmsResult};
use dlms_interface::AssociationLn;
use dlms_security::authentication;
use dlms_security::encryption::{glo_tag, is_glo_tag};
use dlms_security::{AuthenticationMechanism, SecuritySuite, SystemTitle};
use dlms_session::SessionLayer;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

async fn bounded<T>(timeout: Duration, operation: impl Future<Output = DlmsResult<T>>) -> DlmsResult<T> {
    tokio::time::timeout(timeout, operation)
        .await
        .map_err(|_| DlmsError::Timeout)?
}

/// A decoded incoming message
enum Request {
    Acse(AcseApdu),
    Xdlms { pdu: CosemPdu, ciphered: bool },
    /// Block-wise SET, which is not offered
    BlockSet { ciphered: bool },
}

pub struct Association<S: SessionLayer> {
    session: S,
    directory: Arc<ObjectDirectory>,
    config: Arc<ServerConfig>,
    connection_id: u64,
    state: ConnectionState,
    device: Option<Arc<LogicalDevice>>,
    client_id: u16,
    server_title: SystemTitle,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<S: SessionLayer> Association<S> {
    pub fn new(session: S, directory: Arc<ObjectDirectory>, config: Arc<ServerConfig>, connection_id: u64) -> Self {
        let server_title = config.system_title();
        Self {
            session,
            directory,
            config,
            connection_id,
            state: ConnectionState::new(Arc::new(SecuritySuite::default())),
            device: None,
            client_id: 0,
            server_title,
            shutdown: None,
        }
    }

    /// End the association with `CleanShutdown` once `shutdown` turns `true`
    /// or its sender is dropped.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Serve the association to its end and close the session.
    ///
    /// # Errors
    /// The fault that ended the association. A release or an orderly
    /// disconnect by the peer is `Ok`.
    pub async fn run(mut self) -> DlmsResult<()> {
        let result = self.serve().await;
        self.state.close();
        if let Err(e) = self.session.close().await {
            log::debug!("Connection {}: closing session failed: {}", self.connection_id, e);
        }
        match result {
            Ok(()) => {
                log::info!("Connection {} closed", self.connection_id);
                Ok(())
            }
            Err(e) if e.is_clean_shutdown() => {
                log::info!("Connection {} shut down", self.connection_id);
                Ok(())
            }
            Err(e) => {
                log::warn!("Connection {} aborted: {}", self.connection_id, e);
                Err(e)
            }
        }
    }

    async fn serve(&mut self) -> DlmsResult<()> {
        bounded(self.config.inactivity_timeout(), self.session.initialize()).await?;
        let first = self.receive().await?;
        if !self.associate(&first).await? {
            return Ok(());
        }
        loop {
            let message = self.receive().await?;
            if !self.dispatch(&message).await? {
                return Ok(());
            }
        }
    }

    async fn receive(&mut self) -> DlmsResult<Vec<u8>> {
        let read = bounded(self.config.inactivity_timeout(), self.session.read_next_message());
        match self.shutdown.as_mut() {
            Some(shutdown) => tokio::select! {
                biased;
                _ = stopped(shutdown) => {
                    log::debug!("Connection {}: server shutting down", self.connection_id);
                    Err(DlmsError::CleanShutdown)
                }
                message = read => message,
            },
            None => read.await,
        }
    }

    async fn send(&mut self, apdu: &[u8]) -> DlmsResult<()> {
        bounded(self.config.inactivity_timeout(), self.session.send(apdu)).await
    }

    /// Answer the AARQ. Returns whether the association was accepted.
    async fn associate(&mut self, message: &[u8]) -> DlmsResult<bool> {
        self.state.transition_to(AssociationState::Negotiating)?;
        let aarq = match AcseApdu::decode(message)? {
            AcseApdu::Aarq(aarq) => aarq,
            other => {
                return Err(DlmsError::Protocol(format!(
                    "Expected AARQ to open the association, got {:?}",
                    other
                )));
            }
        };
        let aare = match self.negotiate(&aarq) {
            Ok(aare) => aare,
            Err(e) => {
                let rejection = self.reject(&aarq, AcseServiceUserDiagnostic::NoReasonGiven);
                if let Ok(encoded) = rejection.encode() {
                    if let Err(send_error) = self.send(&encoded).await {
                        log::debug!("Connection {}: rejection not sent: {}", self.connection_id, send_error);
                    }
                }
                return Err(e);
            }
        };
        let accepted = aare.result == AssociateResult::Accepted;
        self.send(&aare.encode()?).await?;
        Ok(accepted)
    }

    fn reject(&self, aarq: &AARQApdu, diagnostic: AcseServiceUserDiagnostic) -> AAREApdu {
        log::warn!(
            "Connection {}: association of client {} rejected ({:?})",
            self.connection_id,
            self.session.client_id(),
            diagnostic
        );
        AAREApdu::rejected(
            aarq.application_context_name.clone(),
            AssociateResult::RejectedPermanent,
            diagnostic,
        )
    }

    /// Build the AARE for `aarq`, updating the association state on acceptance.
    ///
    /// # Errors
    /// Faults that abort the handshake without an answer, such as an
    /// initiate-request that does not decrypt.
    fn negotiate(&mut self, aarq: &AARQApdu) -> DlmsResult<AAREApdu> {
        let Some(context) = aarq.context_id() else {
            return Ok(self.reject(aarq, AcseServiceUserDiagnostic::ApplicationContextNameNotSupported));
        };
        let client_id = self.session.client_id();
        let logical_device_id = self.session.logical_device_id();
        let Some(device) = self.directory.device(logical_device_id) else {
            log::warn!("Connection {}: no logical device {}", self.connection_id, logical_device_id);
            return Ok(self.reject(aarq, AcseServiceUserDiagnostic::NoReasonGiven));
        };
        let restricted = device.restrictions().is_restricted();
        let suite = if restricted {
            match device.restrictions().get(client_id) {
                Some(suite) => suite,
                None => return Ok(self.reject(aarq, AcseServiceUserDiagnostic::NoReasonGiven)),
            }
        } else {
            Arc::new(SecuritySuite::default())
        };
        if suite.security_policy().is_ciphered() != context.is_ciphered() {
            return Ok(self.reject(aarq, AcseServiceUserDiagnostic::ApplicationContextNameNotSupported));
        }
        let mechanism = if restricted {
            suite.authentication_mechanism()
        } else {
            AuthenticationMechanism::None
        };

        let client_title = match aarq.calling_ap_title.as_deref().map(SystemTitle::from_slice).transpose() {
            Ok(title) => title,
            Err(e) => {
                log::warn!("Connection {}: {}", self.connection_id, e);
                return Ok(self.reject(aarq, AcseServiceUserDiagnostic::NoReasonGiven));
            }
        };
        let needs_title = context.is_ciphered() || mechanism == AuthenticationMechanism::HlsGmac;
        if needs_title && client_title.is_none() {
            return Ok(self.reject(aarq, AcseServiceUserDiagnostic::NoReasonGiven));
        }

        self.state.set_security_suite(Arc::clone(&suite));
        self.state.set_context(context);
        self.state.client_system_title = client_title;
        self.state.server_system_title = Some(self.server_title);

        let Some(initiate) = self.initiate_request(aarq, client_title)? else {
            return Ok(self.reject(aarq, AcseServiceUserDiagnostic::NoReasonGiven));
        };

        if restricted {
            match aarq.mechanism_id() {
                None if aarq.mechanism_name.is_some() => {
                    return Ok(self.reject(
                        aarq,
                        AcseServiceUserDiagnostic::AuthenticationMechanismNameNotRecognised,
                    ));
                }
                id if id.unwrap_or(0) != mechanism.id() => {
                    return Ok(self.reject(aarq, AcseServiceUserDiagnostic::AuthenticationFailure));
                }
                _ => {}
            }
        }

        let initiate_error = if initiate.proposed_dlms_version_number != DLMS_VERSION_6 {
            Some(InitiateError::DlmsVersionTooLow)
        } else if initiate.client_max_receive_pdu_size < BlockService::min_pdu_size(context.is_ciphered()) {
            Some(InitiateError::PduSizeTooShort)
        } else {
            None
        };
        if let Some(error) = initiate_error {
            let mut aare = self.reject(aarq, AcseServiceUserDiagnostic::NoReasonGiven);
            aare.user_information = Some(ConfirmedServiceError::new(error).encode());
            return Ok(aare);
        }

        let max_pdu_size = initiate.client_max_receive_pdu_size.min(self.config.max_pdu_size);
        let conformance = initiate.proposed_conformance.intersect(self.config.conformance());
        self.state.set_negotiated(max_pdu_size, conformance);

        let mut aare = AAREApdu::new(
            aarq.application_context_name.clone(),
            AssociateResult::Accepted,
            AssociateSourceDiagnostic::default(),
        );
        if needs_title || mechanism.is_hls_mechanism() {
            aare.responding_ap_title = Some(self.server_title.as_slice().to_vec());
        }

        match mechanism {
            AuthenticationMechanism::None => {
                self.state.transition_to(AssociationState::AuthNone)?;
                self.state.set_authenticated(!restricted);
            }
            AuthenticationMechanism::Low => {
                let presented = aarq.calling_authentication_value.as_deref().unwrap_or_default();
                if let Err(e) = authentication::verify_low(&suite, presented) {
                    log::warn!("Connection {}: {}", self.connection_id, e);
                    return Ok(self.reject(aarq, AcseServiceUserDiagnostic::AuthenticationFailure));
                }
                self.state.transition_to(AssociationState::AuthNone)?;
                self.state.set_authenticated(true);
                aare.mechanism_name = Some(mechanism_oid(mechanism.id()));
                aare.responder_acse_requirements = true;
            }
            _ => {
                let challenge = match aarq.calling_authentication_value.as_deref() {
                    Some(challenge) if authentication::validate_challenge_length(challenge.len()).is_ok() => {
                        challenge.to_vec()
                    }
                    _ => return Ok(self.reject(aarq, AcseServiceUserDiagnostic::AuthenticationFailure)),
                };
                let server_challenge = authentication::generate_challenge(challenge.len())?;
                let expected = authentication::process_challenge(
                    &server_challenge,
                    &suite,
                    &client_title.unwrap_or_default(),
                    self.state.next_expected_peer_frame_counter(),
                )?;
                self.state.client_to_server_challenge = Some(challenge);
                self.state.server_to_client_challenge = Some(server_challenge.clone());
                self.state.processed_server_to_client_challenge = Some(expected);
                self.state.transition_to(AssociationState::AuthChallengePending)?;
                aare.mechanism_name = Some(mechanism_oid(mechanism.id()));
                aare.responder_acse_requirements = true;
                aare.responding_authentication_value = Some(server_challenge);
            }
        }

        let vaa_name = if context.is_logical_name() { VAA_NAME_LN } else { VAA_NAME_SN };
        let response = InitiateResponse::new(conformance, self.config.max_pdu_size, vaa_name).encode();
        aare.user_information = Some(if self.state.is_ciphered() {
            self.state.protect(&response, &self.server_title)?
        } else {
            response
        });

        self.client_id = client_id;
        self.device = Some(device);
        if self.state.state() == AssociationState::AuthNone {
            self.state.transition_to(AssociationState::Established)?;
            log::info!(
                "Connection {}: client {} associated with logical device {} ({:?}, max PDU {})",
                self.connection_id,
                client_id,
                logical_device_id,
                context,
                max_pdu_size
            );
        } else {
            log::info!(
                "Connection {}: client {} awaiting {:?} reply on logical device {}",
                self.connection_id,
                client_id,
                mechanism,
                logical_device_id
            );
        }
        Ok(aare)
    }

    /// Initiate-request of the AARQ, decrypted when the context is ciphered.
    /// `None` when it is missing or not protected the way the context requires.
    fn initiate_request(
        &mut self,
        aarq: &AARQApdu,
        client_title: Option<SystemTitle>,
    ) -> DlmsResult<Option<InitiateRequest>> {
        let Some(payload) = aarq.user_information.as_deref() else {
            return Ok(None);
        };
        let ciphered = payload.first().is_some_and(|&tag| is_glo_tag(tag));
        let plaintext = match (ciphered, client_title) {
            (true, Some(title)) if self.state.is_ciphered() => self.state.unprotect(payload, &title)?,
            (false, _) if !self.state.is_ciphered() => payload.to_vec(),
            _ => return Ok(None),
        };
        match CosemPdu::decode(&plaintext)? {
            CosemPdu::InitiateRequest(request) => Ok(Some(request)),
            other => Err(DlmsError::Protocol(format!(
                "AARQ user-information carries {} instead of an initiate-request",
                other.kind()
            ))),
        }
    }

    fn decode_request(&mut self, message: &[u8]) -> DlmsResult<Request> {
        if is_block_set(message) {
            return Ok(Request::BlockSet { ciphered: false });
        }
        let apdu = APdu::decode(message)?;
        if let Some(acse) = apdu.acse {
            return Ok(Request::Acse(acse));
        }
        if let Some(envelope) = apdu.ciphered {
            let title = self
                .state
                .client_system_title
                .ok_or_else(|| DlmsError::Cipher("Ciphered request without a client system title".to_string()))?;
            let plaintext = self.state.unprotect(&envelope, &title).inspect_err(|e| {
                log::warn!("Connection {}: {}", self.connection_id, e);
            })?;
            if is_block_set(&plaintext) {
                return Ok(Request::BlockSet { ciphered: true });
            }
            return Ok(Request::Xdlms {
                pdu: CosemPdu::decode(&plaintext)?,
                ciphered: true,
            });
        }
        apdu.cosem
            .map(|pdu| Request::Xdlms { pdu, ciphered: false })
            .ok_or_else(|| DlmsError::ProtocolDecode("Empty APDU".to_string()))
    }

    /// Handle one message after the handshake. Returns `false` once released.
    async fn dispatch(&mut self, message: &[u8]) -> DlmsResult<bool> {
        match self.decode_request(message)? {
            Request::Acse(AcseApdu::Rlrq(rlrq)) => {
                self.release(rlrq).await?;
                Ok(false)
            }
            Request::Acse(other) => Err(DlmsError::Protocol(format!(
                "Unexpected ACSE APDU in an open association: {:?}",
                other
            ))),
            Request::BlockSet { ciphered } => {
                log::warn!("Connection {}: block-wise SET is not supported", self.connection_id);
                self.exception(StateError::ServiceNotAllowed, ServiceError::ServiceNotSupported, ciphered)
                    .await?;
                Ok(true)
            }
            Request::Xdlms { pdu, ciphered } => {
                if self.state.is_ciphered() && !ciphered {
                    log::warn!(
                        "Connection {}: unprotected {} in a ciphered association",
                        self.connection_id,
                        pdu.kind()
                    );
                    self.exception(StateError::ServiceNotAllowed, ServiceError::DecipheringError, false)
                        .await?;
                    return Ok(true);
                }
                match self.state.state() {
                    AssociationState::AuthChallengePending => self.pending(pdu, ciphered).await?,
                    _ => self.route(pdu, ciphered).await?,
                }
                Ok(true)
            }
        }
    }

    /// Only the reply to the HLS challenge is served before authentication.
    async fn pending(&mut self, pdu: CosemPdu, ciphered: bool) -> DlmsResult<()> {
        match pdu {
            CosemPdu::ActionRequest(ActionRequest::Normal {
                invoke_id_and_priority,
                method,
                parameters,
            }) if AssociationLn::is_reply_to_hls(&method) => {
                self.reply_to_hls(invoke_id_and_priority, parameters, ciphered).await
            }
            other => {
                log::warn!(
                    "Connection {}: {} before HLS authentication completed",
                    self.connection_id,
                    other.kind()
                );
                self.exception(StateError::ServiceNotAllowed, ServiceError::OperationNotPossible, ciphered)
                    .await
            }
        }
    }

    async fn reply_to_hls(
        &mut self,
        invoke_id_and_priority: InvokeIdAndPriority,
        parameters: Option<DataObject>,
        ciphered: bool,
    ) -> DlmsResult<()> {
        let received = match &parameters {
            Some(DataObject::OctetString(reply)) => reply.as_slice(),
            _ => &[],
        };
        let suite = Arc::clone(self.state.security_suite());
        // A GMAC proof carries the client's frame counter; recompute against it.
        let expected = match (suite.authentication_mechanism(), authentication::gmac_frame_counter(received)) {
            (AuthenticationMechanism::HlsGmac, Some(frame_counter)) => {
                match (&self.state.server_to_client_challenge, self.state.client_system_title) {
                    (Some(challenge), Some(title)) => {
                        Some(authentication::process_challenge(challenge, &suite, &title, frame_counter)?)
                    }
                    _ => None,
                }
            }
            _ => self.state.processed_server_to_client_challenge.clone(),
        };
        let matches = expected
            .as_deref()
            .is_some_and(|expected| authentication::verify(expected, received));

        let response = if matches {
            let frame_counter = match suite.authentication_mechanism() {
                AuthenticationMechanism::HlsGmac => self.state.next_frame_counter()?,
                _ => 0,
            };
            let challenge = self.state.client_to_server_challenge.clone().unwrap_or_default();
            let proof = authentication::process_challenge(&challenge, &suite, &self.server_title, frame_counter)?;
            self.state.set_authenticated(true);
            self.state.transition_to(AssociationState::Established)?;
            log::info!("Connection {}: client {} authenticated", self.connection_id, self.client_id);
            ActionResponseWithOptionalData::success(Some(DataObject::OctetString(proof)))
        } else {
            log::warn!("Connection {}: HLS reply of client {} rejected", self.connection_id, self.client_id);
            ActionResponseWithOptionalData::failure(ActionResult::OtherReason)
        };
        let pdu = CosemPdu::ActionResponse(ActionResponse::Normal {
            invoke_id_and_priority,
            response,
        });
        self.respond(&pdu, ciphered).await
    }

    async fn route(&mut self, pdu: CosemPdu, ciphered: bool) -> DlmsResult<()> {
        let device = self
            .device
            .clone()
            .ok_or_else(|| DlmsError::Protocol("No logical device bound to the association".to_string()))?;
        let logical_name = self.state.is_logical_name();
        let reply = {
            let context = RequestContext::new(&device, &self.state, self.client_id, self.connection_id);
            match pdu {
                CosemPdu::GetRequest(request) if logical_name => handlers::handle_get(&context, request),
                CosemPdu::SetRequest(request) if logical_name => handlers::handle_set(&context, request),
                CosemPdu::ActionRequest(request) if logical_name => handlers::handle_action(&context, request),
                CosemPdu::ReadRequest(request) if !logical_name => handlers::handle_read(&context, request),
                CosemPdu::WriteRequest(request) if !logical_name => handlers::handle_write(&context, request),
                CosemPdu::GetRequest(_)
                | CosemPdu::SetRequest(_)
                | CosemPdu::ActionRequest(_)
                | CosemPdu::ReadRequest(_)
                | CosemPdu::WriteRequest(_) => {
                    log::warn!(
                        "Connection {}: {} does not match the association's referencing",
                        self.connection_id,
                        pdu.kind()
                    );
                    Reply::Pdu(exception_pdu(StateError::ServiceNotAllowed, ServiceError::ServiceNotSupported))
                }
                other => {
                    log::warn!("Connection {}: {} not handled", self.connection_id, other.kind());
                    Reply::Pdu(exception_pdu(StateError::ServiceUnknown, ServiceError::ServiceNotSupported))
                }
            }
        };
        match reply {
            Reply::Pdu(pdu) => self.respond(&pdu, ciphered).await,
            Reply::Blocks { origin, data } => self.send_blocks(origin, data, ciphered).await,
        }
    }

    /// Send a long response block by block, each after the client's acknowledgement.
    async fn send_blocks(&mut self, origin: BlockOrigin, data: Vec<u8>, ciphered: bool) -> DlmsResult<()> {
        let block_size = origin
            .service()
            .block_size(self.state.negotiated_max_pdu_size(), self.state.is_ciphered())?;
        let mut fragments = Fragments::new(data, block_size)?;
        log::debug!(
            "Connection {}: {:?} response in {} blocks of {} bytes",
            self.connection_id,
            origin.service(),
            fragments.block_count(),
            block_size
        );
        while let Some(block) = fragments.next_block() {
            let pdu = origin.block_response(&block)?;
            let last = block.last;
            self.respond(&pdu, ciphered).await?;
            if last {
                break;
            }
            let message = self.receive().await?;
            let acknowledged = match self.decode_request(&message)? {
                Request::Xdlms { pdu, ciphered } if ciphered == self.state.is_ciphered() => {
                    origin.acknowledged_block(&pdu)
                }
                Request::Xdlms { pdu, .. } => {
                    log::warn!(
                        "Connection {}: unprotected {} during a ciphered block transfer",
                        self.connection_id,
                        pdu.kind()
                    );
                    return Err(DlmsError::Protocol(
                        "Unprotected acknowledgement in a ciphered association".to_string(),
                    ));
                }
                _ => None,
            };
            let Some(block_number) = acknowledged else {
                log::warn!("Connection {}: block transfer aborted by an unrelated request", self.connection_id);
                return Err(DlmsError::Connection(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Unexpected request during block transfer",
                )));
            };
            fragments.check_acknowledgement(block_number)?;
        }
        Ok(())
    }

    async fn respond(&mut self, pdu: &CosemPdu, ciphered: bool) -> DlmsResult<()> {
        let encoded = pdu.encode();
        let apdu = if ciphered && glo_tag(pdu.tag()).is_some() {
            self.state.protect(&encoded, &self.server_title)?
        } else {
            encoded
        };
        self.send(&apdu).await
    }

    async fn exception(&mut self, state_error: StateError, service_error: ServiceError, ciphered: bool) -> DlmsResult<()> {
        self.respond(&exception_pdu(state_error, service_error), ciphered).await
    }

    async fn release(&mut self, request: RLRQApdu) -> DlmsResult<()> {
        if self.state.state().is_established() {
            self.state.transition_to(AssociationState::Releasing)?;
        }
        let response = RLREApdu::new(ReleaseResponseReason::for_request(request.reason));
        self.send(&response.encode()?).await?;
        log::info!("Connection {}: client {} released the association", self.connection_id, self.client_id);
        Ok(())
    }
}

/// Resolves once the shutdown flag is set or its sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop || shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// SET with a first or further data block, or with-list-and-first-datablock
fn is_block_set(plaintext: &[u8]) -> bool {
    plaintext.first() == Some(&SET_REQUEST_TAG) && matches!(plaintext.get(1), Some(2 | 3 | 5))
}

fn exception_pdu(state_error: StateError, service_error: ServiceError) -> CosemPdu {
    CosemPdu::ExceptionResponse(ExceptionResponse::new(state_error, service_error))
}

/// Serve one association over `session` and close it.
pub async fn serve<S: SessionLayer>(
    session: S,
    directory: Arc<ObjectDirectory>,
    config: Arc<ServerConfig>,
    connection_id: u64,
) -> DlmsResult<()> {
    Association::new(session, directory, config, connection_id).run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlms_application::pdu::{
        AttributeReference, Conformance, CosemAttributeDescriptor, CosemMethodDescriptor, GetRequest, GetResponse,
    };
    use dlms_asn1::iso_acse::ReleaseRequestReason;
    use dlms_asn1::ContextId;
    use dlms_client::{ClientConfig, Connection, LnConnection, SnConnection};
    use dlms_core::ObisCode;
    use dlms_interface::access::{AttributeAccessMode, MethodAccessMode};
    use dlms_interface::{AccessRequest, Data, MethodAccessor, RestrictionTable, SecuritySetup};
    use dlms_security::utils::wrap_aes_rfc3394_key;
    use dlms_security::{EncryptionMechanism, SecuritySuiteBuilder};
    use dlms_session::WrapperSession;
    use dlms_transport::IoTransport;
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;

    type TestSession = WrapperSession<IoTransport<DuplexStream>>;

    const COUNTER: ObisCode = ObisCode::new(0, 0, 96, 1, 0, 255);
    const SECRET: ObisCode = ObisCode::new(0, 0, 96, 1, 1, 255);
    const PROFILE: ObisCode = ObisCode::new(1, 0, 99, 1, 0, 255);
    const CLIENT: u16 = 0x10;
    const DEVICE: u16 = 1;

    struct Echo;

    impl MethodAccessor for Echo {
        fn invoke(
            &self,
            _request: &AccessRequest,
            parameters: Option<DataObject>,
        ) -> Result<Option<DataObject>, ActionResult> {
            Ok(parameters)
        }
    }

    fn key(text: &str) -> Vec<u8> {
        hex::decode(text).unwrap()
    }

    fn gmac_suite() -> SecuritySuite {
        SecuritySuiteBuilder::new()
            .set_encryption_mechanism(EncryptionMechanism::AesGcm128)
            .set_authentication_mechanism(AuthenticationMechanism::HlsGmac)
            .set_global_unicast_encryption_key(key("000102030405060708090A0B0C0D0E0F"))
            .set_authentication_key(key("D0D1D2D3D4D5D6D7D8D9DADBDCDDDEDF"))
            .build()
            .unwrap()
    }

    fn low_suite(password: &[u8]) -> SecuritySuite {
        SecuritySuiteBuilder::new().set_password(password.to_vec()).build().unwrap()
    }

    fn md5_suite() -> SecuritySuite {
        SecuritySuiteBuilder::new()
            .set_authentication_mechanism(AuthenticationMechanism::HlsMd5)
            .set_authentication_key(key("00112233445566778899AABBCCDDEEFF"))
            .build()
            .unwrap()
    }

    /// Directory with one logical device; `restriction` admits only that client suite.
    fn directory(restriction: Option<SecuritySuite>) -> Arc<ObjectDirectory> {
        let restrictions = Arc::new(RestrictionTable::new());
        if let Some(suite) = restriction {
            restrictions.insert(CLIENT, suite);
        }
        let device = LogicalDevice::new(DEVICE).with_restrictions(restrictions);
        device
            .register(
                Data::new(COUNTER, DataObject::Unsigned32(7))
                    .with_access(AttributeAccessMode::ReadWrite)
                    .into_object()
                    .with_method(1, MethodAccessMode::Access, Arc::new(Echo))
                    .with_short_name(0x100),
            )
            .unwrap();
        device
            .register(
                Data::new(SECRET, DataObject::Unsigned8(42))
                    .with_access(AttributeAccessMode::AuthenticatedRead)
                    .into_object(),
            )
            .unwrap();
        device
            .register(
                Data::new(PROFILE, DataObject::OctetString(vec![0xAB; 300]))
                    .into_object()
                    .with_short_name(0x200),
            )
            .unwrap();
        let directory = ObjectDirectory::new();
        directory.add_device(device);
        Arc::new(directory)
    }

    fn start(directory: Arc<ObjectDirectory>) -> (TestSession, JoinHandle<DlmsResult<()>>) {
        let (client, server) = tokio::io::duplex(4096);
        let session = WrapperSession::new_server(IoTransport::new(server, None));
        let handle = tokio::spawn(serve(session, directory, Arc::new(ServerConfig::default()), 1));
        (WrapperSession::new_client(IoTransport::new(client, None), CLIENT, DEVICE), handle)
    }

    fn value_of(obis: ObisCode) -> AttributeReference {
        AttributeReference::new(CosemAttributeDescriptor::new(Data::CLASS_ID, obis, Data::ATTR_VALUE))
    }

    #[tokio::test]
    async fn test_ln_association_without_security() {
        let (session, server) = start(directory(None));
        let mut client = LnConnection::new(session, Arc::new(SecuritySuite::default()), ClientConfig::default());
        client.open().await.unwrap();

        assert_eq!(client.get(value_of(COUNTER)).await.unwrap(), DataObject::Unsigned32(7));
        client.set(value_of(COUNTER), DataObject::Unsigned32(9)).await.unwrap();
        assert_eq!(client.get(value_of(COUNTER)).await.unwrap(), DataObject::Unsigned32(9));
        let echoed = client
            .action(CosemMethodDescriptor::new(Data::CLASS_ID, COUNTER, 1), Some(DataObject::Integer8(-3)))
            .await
            .unwrap();
        assert_eq!(echoed, Some(DataObject::Integer8(-3)));
        // An unrestricted device treats every client as authenticated.
        assert_eq!(client.get(value_of(SECRET)).await.unwrap(), DataObject::Unsigned8(42));

        client.close().await.unwrap();
        assert!(!client.is_open());
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_long_get_is_sent_in_blocks() {
        let (session, server) = start(directory(None));
        let config = ClientConfig::default().with_max_pdu_size(64);
        let mut client = LnConnection::new(session, Arc::new(SecuritySuite::default()), config);
        client.open().await.unwrap();

        let value = client.get(value_of(PROFILE)).await.unwrap();
        assert_eq!(value, DataObject::OctetString(vec![0xAB; 300]));
        // The association is still usable after the transfer.
        assert_eq!(client.get(value_of(COUNTER)).await.unwrap(), DataObject::Unsigned32(7));

        client.close().await.unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_sn_read_and_write() {
        let (session, server) = start(directory(None));
        let config = ClientConfig::default().with_max_pdu_size(64);
        let mut client = SnConnection::new(session, Arc::new(SecuritySuite::default()), config);
        client.open().await.unwrap();

        assert_eq!(client.read(0x108).await.unwrap(), DataObject::Unsigned32(7));
        client.write(0x108, DataObject::Unsigned32(11)).await.unwrap();
        assert_eq!(client.read(0x108).await.unwrap(), DataObject::Unsigned32(11));
        assert_eq!(client.read(0x208).await.unwrap(), DataObject::OctetString(vec![0xAB; 300]));
        assert!(matches!(client.read(0x300).await, Err(DlmsError::AccessDenied(_))));

        client.close().await.unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_low_authentication() {
        let (session, server) = start(directory(Some(low_suite(b"12345678"))));
        let mut client = LnConnection::new(session, Arc::new(low_suite(b"12345678")), ClientConfig::default());
        client.open().await.unwrap();
        assert_eq!(client.get(value_of(SECRET)).await.unwrap(), DataObject::Unsigned8(42));
        client.close().await.unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_low_authentication_wrong_password() {
        let (session, server) = start(directory(Some(low_suite(b"12345678"))));
        let mut client = LnConnection::new(session, Arc::new(low_suite(b"00000000")), ClientConfig::default());
        assert!(matches!(client.open().await, Err(DlmsError::AuthenticationFailure(_))));
        assert!(!client.is_open());
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_mechanism_mismatch_is_rejected() {
        let (session, server) = start(directory(Some(low_suite(b"12345678"))));
        let mut client = LnConnection::new(session, Arc::new(SecuritySuite::default()), ClientConfig::default());
        assert!(matches!(client.open().await, Err(DlmsError::AuthenticationFailure(_))));
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_hls_gmac_ciphered_association() {
        let (session, server) = start(directory(Some(gmac_suite())));
        let mut client = LnConnection::new(session, Arc::new(gmac_suite()), ClientConfig::default());
        client.open().await.unwrap();
        assert!(client.association().state().is_ciphered());

        assert_eq!(client.get(value_of(SECRET)).await.unwrap(), DataObject::Unsigned8(42));
        client.set(value_of(COUNTER), DataObject::Unsigned32(1)).await.unwrap();
        assert_eq!(client.get(value_of(COUNTER)).await.unwrap(), DataObject::Unsigned32(1));

        client.close().await.unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_plain_client_refused_by_ciphered_device() {
        let (session, server) = start(directory(Some(gmac_suite())));
        let mut client = LnConnection::new(session, Arc::new(SecuritySuite::default()), ClientConfig::default());
        assert!(matches!(client.open().await, Err(DlmsError::Protocol(_))));
        server.await.unwrap().unwrap();
    }

    fn keyed_suite(encryption_key: &str, authentication_key: &str) -> SecuritySuite {
        SecuritySuiteBuilder::new()
            .set_encryption_mechanism(EncryptionMechanism::AesGcm128)
            .set_authentication_mechanism(AuthenticationMechanism::HlsGmac)
            .set_global_unicast_encryption_key(key(encryption_key))
            .set_authentication_key(key(authentication_key))
            .set_master_key(key(MASTER_KEY))
            .build()
            .unwrap()
    }

    const MASTER_KEY: &str = "000102030405060708090A0B0C0D0E0F";
    const OLD_EK: &str = "101112131415161718191A1B1C1D1E1F";
    const OLD_AK: &str = "202122232425262728292A2B2C2D2E2F";
    const NEW_EK: &str = "303132333435363738393A3B3C3D3E3F";
    const NEW_AK: &str = "404142434445464748494A4B4C4D4E4F";

    #[tokio::test]
    async fn test_key_transfer_applies_to_new_associations() {
        let restrictions = Arc::new(RestrictionTable::new());
        restrictions.insert(CLIENT, keyed_suite(OLD_EK, OLD_AK));
        let config = ServerConfig::default();
        let device = LogicalDevice::new(DEVICE).with_restrictions(Arc::clone(&restrictions));
        device
            .register(SecuritySetup::object(Arc::clone(&restrictions), config.system_title()))
            .unwrap();
        device.register(Data::new(COUNTER, DataObject::Unsigned32(7)).into_object()).unwrap();
        let directory = ObjectDirectory::new();
        directory.add_device(device);
        let directory = Arc::new(directory);

        let (session, server) = start(Arc::clone(&directory));
        let mut client = LnConnection::new(session, Arc::new(keyed_suite(OLD_EK, OLD_AK)), ClientConfig::default());
        client.open().await.unwrap();
        let wrapped = |key_id: u8, new_key: &str| {
            DataObject::Structure(vec![
                DataObject::Enumerate(key_id),
                DataObject::OctetString(wrap_aes_rfc3394_key(&key(MASTER_KEY), &key(new_key)).unwrap()),
            ])
        };
        let transfer = CosemMethodDescriptor::new(
            SecuritySetup::CLASS_ID,
            SecuritySetup::LOGICAL_NAME,
            SecuritySetup::METHOD_GLOBAL_KEY_TRANSFER,
        );
        let result = client
            .action(transfer, Some(DataObject::Array(vec![wrapped(0, NEW_EK), wrapped(2, NEW_AK)])))
            .await
            .unwrap();
        assert_eq!(result, None);
        // The running association keeps the keys it started with.
        assert_eq!(client.get(value_of(COUNTER)).await.unwrap(), DataObject::Unsigned32(7));
        client.close().await.unwrap();
        server.await.unwrap().unwrap();

        let (session, server) = start(Arc::clone(&directory));
        let mut stale = LnConnection::new(session, Arc::new(keyed_suite(OLD_EK, OLD_AK)), ClientConfig::default());
        assert!(stale.open().await.is_err());
        assert!(matches!(server.await.unwrap(), Err(DlmsError::Cipher(_))));

        let (session, server) = start(directory);
        let mut client = LnConnection::new(session, Arc::new(keyed_suite(NEW_EK, NEW_AK)), ClientConfig::default());
        client.open().await.unwrap();
        assert_eq!(client.get(value_of(COUNTER)).await.unwrap(), DataObject::Unsigned32(7));
        client.close().await.unwrap();
        server.await.unwrap().unwrap();
    }

    async fn exchange(session: &mut TestSession, apdu: &[u8]) -> Vec<u8> {
        session.send(apdu).await.unwrap();
        session.read_next_message().await.unwrap()
    }

    #[tokio::test]
    async fn test_only_the_hls_reply_is_served_while_pending() {
        let (mut session, server) = start(directory(Some(md5_suite())));
        session.initialize().await.unwrap();

        let mut aarq = AARQApdu::new(ContextId::new(true, false));
        aarq.sender_acse_requirements = true;
        aarq.mechanism_name = Some(mechanism_oid(AuthenticationMechanism::HlsMd5.id()));
        aarq.calling_authentication_value = Some(vec![0x11; 16]);
        aarq.user_information = Some(InitiateRequest::new(Conformance::logical_name_default(), 1024).encode());
        let AcseApdu::Aare(aare) = AcseApdu::decode(&exchange(&mut session, &aarq.encode().unwrap()).await).unwrap()
        else {
            panic!("expected AARE");
        };
        assert_eq!(aare.result, AssociateResult::Accepted);
        assert_eq!(aare.responding_authentication_value.map(|c| c.len()), Some(16));

        let get = CosemPdu::GetRequest(GetRequest::Normal {
            invoke_id_and_priority: InvokeIdAndPriority::new(1, true),
            attribute: value_of(COUNTER),
        });
        assert_eq!(
            CosemPdu::decode(&exchange(&mut session, &get.encode()).await).unwrap(),
            exception_pdu(StateError::ServiceNotAllowed, ServiceError::OperationNotPossible)
        );

        let wrong_reply = CosemPdu::ActionRequest(ActionRequest::Normal {
            invoke_id_and_priority: InvokeIdAndPriority::new(2, true),
            method: AssociationLn::reply_to_hls_method(),
            parameters: Some(DataObject::OctetString(vec![0; 16])),
        });
        assert_eq!(
            CosemPdu::decode(&exchange(&mut session, &wrong_reply.encode()).await).unwrap(),
            CosemPdu::ActionResponse(ActionResponse::Normal {
                invoke_id_and_priority: InvokeIdAndPriority::new(2, true),
                response: ActionResponseWithOptionalData::failure(ActionResult::OtherReason),
            })
        );
        // Still pending after a wrong reply.
        assert_eq!(
            CosemPdu::decode(&exchange(&mut session, &get.encode()).await).unwrap(),
            exception_pdu(StateError::ServiceNotAllowed, ServiceError::OperationNotPossible)
        );

        // Release is allowed while pending.
        let rlrq = RLRQApdu::new(ReleaseRequestReason::Normal).encode().unwrap();
        assert!(matches!(
            AcseApdu::decode(&exchange(&mut session, &rlrq).await).unwrap(),
            AcseApdu::Rlre(_)
        ));
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_wrong_gmac_reply_leaves_client_unauthenticated() {
        let (client, server) = tokio::io::duplex(4096);
        let mut association = Association::new(
            WrapperSession::new_server(IoTransport::new(server, None)),
            directory(Some(gmac_suite())),
            Arc::new(ServerConfig::default()),
            1,
        );
        let mut peer = CipheredPeer::new(client, gmac_suite());
        association.session.initialize().await.unwrap();
        peer.session.initialize().await.unwrap();

        let mut aarq = peer.aarq(1024);
        aarq.sender_acse_requirements = true;
        aarq.mechanism_name = Some(mechanism_oid(AuthenticationMechanism::HlsGmac.id()));
        aarq.calling_authentication_value = Some(vec![0x22; 16]);
        peer.session.send(&aarq.encode().unwrap()).await.unwrap();
        let message = association.receive().await.unwrap();
        assert!(association.associate(&message).await.unwrap());
        assert_eq!(association.state().state(), AssociationState::AuthChallengePending);
        let AcseApdu::Aare(aare) = AcseApdu::decode(&peer.session.read_next_message().await.unwrap()).unwrap() else {
            panic!("expected AARE");
        };
        assert_eq!(aare.result, AssociateResult::Accepted);

        // Security control, frame counter 2, then a tag that cannot be right.
        let mut forged = vec![0x10, 0, 0, 0, 2];
        forged.extend_from_slice(&[0; 12]);
        let reply = CosemPdu::ActionRequest(ActionRequest::Normal {
            invoke_id_and_priority: InvokeIdAndPriority::new(1, true),
            method: AssociationLn::reply_to_hls_method(),
            parameters: Some(DataObject::OctetString(forged)),
        });
        let envelope = peer.protect(&reply);
        peer.session.send(&envelope).await.unwrap();
        let message = association.receive().await.unwrap();
        assert!(association.dispatch(&message).await.unwrap());

        assert!(!association.state().is_authenticated());
        assert_eq!(association.state().state(), AssociationState::AuthChallengePending);
        assert_eq!(
            peer.read_pdu(&ServerConfig::default().system_title()).await,
            CosemPdu::ActionResponse(ActionResponse::Normal {
                invoke_id_and_priority: InvokeIdAndPriority::new(1, true),
                response: ActionResponseWithOptionalData::failure(ActionResult::OtherReason),
            })
        );
    }

    /// Client end of a ciphered LN association, driven message by message.
    struct CipheredPeer {
        session: TestSession,
        state: ConnectionState,
        title: SystemTitle,
    }

    impl CipheredPeer {
        fn new(stream: DuplexStream, suite: SecuritySuite) -> Self {
            let mut state = ConnectionState::new(Arc::new(suite));
            state.set_context(ContextId::new(true, true));
            Self {
                session: WrapperSession::new_client(IoTransport::new(stream, None), CLIENT, DEVICE),
                state,
                title: SystemTitle::new(*b"TST00001"),
            }
        }

        fn aarq(&mut self, max_pdu_size: u16) -> AARQApdu {
            let mut aarq = AARQApdu::new(ContextId::new(true, true));
            aarq.calling_ap_title = Some(self.title.as_slice().to_vec());
            let initiate = InitiateRequest::new(Conformance::logical_name_default(), max_pdu_size).encode();
            aarq.user_information = Some(self.state.protect(&initiate, &self.title).unwrap());
            aarq
        }

        fn protect(&mut self, pdu: &CosemPdu) -> Vec<u8> {
            self.state.protect(&pdu.encode(), &self.title).unwrap()
        }

        async fn read_pdu(&mut self, server_title: &SystemTitle) -> CosemPdu {
            let message = self.session.read_next_message().await.unwrap();
            CosemPdu::decode(&self.state.unprotect(&message, server_title).unwrap()).unwrap()
        }
    }

    fn encrypted_suite() -> SecuritySuite {
        SecuritySuiteBuilder::new()
            .set_encryption_mechanism(EncryptionMechanism::AesGcm128)
            .set_global_unicast_encryption_key(key("000102030405060708090A0B0C0D0E0F"))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_unprotected_acknowledgement_in_ciphered_transfer_aborts() {
        let (client, server_end) = tokio::io::duplex(4096);
        let session = WrapperSession::new_server(IoTransport::new(server_end, None));
        let server = tokio::spawn(serve(
            session,
            directory(Some(encrypted_suite())),
            Arc::new(ServerConfig::default()),
            1,
        ));
        let mut peer = CipheredPeer::new(client, encrypted_suite());
        peer.session.initialize().await.unwrap();
        let aarq = peer.aarq(64).encode().unwrap();
        let AcseApdu::Aare(aare) = AcseApdu::decode(&exchange(&mut peer.session, &aarq).await).unwrap() else {
            panic!("expected AARE");
        };
        assert_eq!(aare.result, AssociateResult::Accepted);

        let get = CosemPdu::GetRequest(GetRequest::Normal {
            invoke_id_and_priority: InvokeIdAndPriority::new(1, true),
            attribute: value_of(PROFILE),
        });
        let envelope = peer.protect(&get);
        peer.session.send(&envelope).await.unwrap();
        let first = peer.read_pdu(&ServerConfig::default().system_title()).await;
        assert!(matches!(
            first,
            CosemPdu::GetResponse(GetResponse::WithDataBlock { block_number: 1, last_block: false, .. })
        ));

        let next = CosemPdu::GetRequest(GetRequest::Next {
            invoke_id_and_priority: InvokeIdAndPriority::new(1, true),
            block_number: 1,
        });
        peer.session.send(&next.encode()).await.unwrap();
        assert!(matches!(server.await.unwrap(), Err(DlmsError::Protocol(_))));
    }

    /// Start a long GET and answer its first block with a get-request-next.
    async fn acknowledge_first_block(invoke_id: u8, block_number: u32) -> DlmsResult<()> {
        let (mut session, server) = start(directory(None));
        session.initialize().await.unwrap();
        let mut aarq = AARQApdu::new(ContextId::new(true, false));
        aarq.user_information = Some(InitiateRequest::new(Conformance::logical_name_default(), 64).encode());
        exchange(&mut session, &aarq.encode().unwrap()).await;

        let get = CosemPdu::GetRequest(GetRequest::Normal {
            invoke_id_and_priority: InvokeIdAndPriority::new(1, true),
            attribute: value_of(PROFILE),
        });
        let first = CosemPdu::decode(&exchange(&mut session, &get.encode()).await).unwrap();
        assert!(matches!(
            first,
            CosemPdu::GetResponse(GetResponse::WithDataBlock { block_number: 1, last_block: false, .. })
        ));
        let next = CosemPdu::GetRequest(GetRequest::Next {
            invoke_id_and_priority: InvokeIdAndPriority::new(invoke_id, true),
            block_number,
        });
        session.send(&next.encode()).await.unwrap();
        server.await.unwrap()
    }

    #[tokio::test]
    async fn test_wrong_block_number_aborts_the_association() {
        assert!(matches!(acknowledge_first_block(1, 5).await, Err(DlmsError::Connection(_))));
    }

    #[tokio::test]
    async fn test_foreign_invoke_id_aborts_the_block_transfer() {
        assert!(matches!(acknowledge_first_block(2, 1).await, Err(DlmsError::Connection(_))));
    }

    #[tokio::test]
    async fn test_pdu_size_without_room_for_blocks_is_refused() {
        let (mut session, server) = start(directory(None));
        session.initialize().await.unwrap();
        let mut aarq = AARQApdu::new(ContextId::new(true, false));
        aarq.user_information = Some(InitiateRequest::new(Conformance::logical_name_default(), 30).encode());
        let AcseApdu::Aare(aare) = AcseApdu::decode(&exchange(&mut session, &aarq.encode().unwrap()).await).unwrap()
        else {
            panic!("expected AARE");
        };
        assert_eq!(aare.result, AssociateResult::RejectedPermanent);
        let error = ConfirmedServiceError::new(InitiateError::PduSizeTooShort).encode();
        assert_eq!(aare.user_information, Some(error));
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_smallest_pdu_size_still_reads_attributes() {
        let (session, server) = start(directory(None));
        let config = ClientConfig::default().with_max_pdu_size(BlockService::min_pdu_size(false));
        let mut client = LnConnection::new(session, Arc::new(SecuritySuite::default()), config);
        client.open().await.unwrap();
        assert_eq!(client.get(value_of(COUNTER)).await.unwrap(), DataObject::Unsigned32(7));
        client.close().await.unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_ends_an_idle_association() {
        let (stop, shutdown) = watch::channel(false);
        let (client, server_end) = tokio::io::duplex(4096);
        let association = Association::new(
            WrapperSession::new_server(IoTransport::new(server_end, None)),
            directory(None),
            Arc::new(ServerConfig::default()),
            1,
        )
        .with_shutdown(shutdown);
        let server = tokio::spawn(association.run());
        let session = WrapperSession::new_client(IoTransport::new(client, None), CLIENT, DEVICE);
        let mut client = LnConnection::new(session, Arc::new(SecuritySuite::default()), ClientConfig::default());
        client.open().await.unwrap();

        stop.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), server).await.unwrap();
        assert!(result.unwrap().is_ok());
        assert!(client.get(value_of(COUNTER)).await.is_err());
    }

    #[tokio::test]
    async fn test_request_before_aarq_aborts() {
        let (mut session, server) = start(directory(None));
        session.initialize().await.unwrap();
        let get = CosemPdu::GetRequest(GetRequest::Normal {
            invoke_id_and_priority: InvokeIdAndPriority::new(1, true),
            attribute: value_of(COUNTER),
        });
        session.send(&get.encode()).await.unwrap();
        assert!(matches!(server.await.unwrap(), Err(DlmsError::Asn1Encoding(_))));
    }

    #[tokio::test]
    async fn test_unsupported_dlms_version_is_refused() {
        let (mut session, server) = start(directory(None));
        session.initialize().await.unwrap();
        let mut initiate = InitiateRequest::new(Conformance::logical_name_default(), 1024);
        initiate.proposed_dlms_version_number = 5;
        let mut aarq = AARQApdu::new(ContextId::new(true, false));
        aarq.user_information = Some(initiate.encode());
        let AcseApdu::Aare(aare) = AcseApdu::decode(&exchange(&mut session, &aarq.encode().unwrap()).await).unwrap()
        else {
            panic!("expected AARE");
        };
        assert_eq!(aare.result, AssociateResult::RejectedPermanent);
        let error = ConfirmedServiceError::new(InitiateError::DlmsVersionTooLow).encode();
        assert_eq!(aare.user_information, Some(error));
        server.await.unwrap().unwrap();
    }
}
