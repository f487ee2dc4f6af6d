//! Per-association security and negotiation state

use crate::association::state::AssociationState;
use crate::pdu::{Conformance, InvokeIdAndPriority};
use dlms_asn1::ContextId;
use dlms_core::{DlmsError, DlmsResult};
use dlms_security::encryption::{self, glo_tag};
use dlms_security::{FrameCounter, ReplayGuard, SecuritySuite, SystemTitle};
use std::sync::Arc;

/// Mutable state of one association
///
/// Created when the transport connection is accepted or opened and dropped
/// when the association closes. Exactly one task owns it.
///
/// The suite is a snapshot: a key change published while the association
/// runs does not affect it.
#[derive(Debug)]
pub struct ConnectionState {
    state: AssociationState,
    context: Option<ContextId>,
    security_suite: Arc<SecuritySuite>,
    /// Counter of the ciphered APDUs we send
    frame_counter: FrameCounter,
    /// Counters the peer has used so far
    replay_guard: ReplayGuard,
    pub client_system_title: Option<SystemTitle>,
    pub server_system_title: Option<SystemTitle>,
    pub client_to_server_challenge: Option<Vec<u8>>,
    pub server_to_client_challenge: Option<Vec<u8>>,
    /// Reply the server expects from the client under HLS
    pub processed_server_to_client_challenge: Option<Vec<u8>>,
    authenticated: bool,
    negotiated_max_pdu_size: u16,
    negotiated_conformance: Conformance,
    invoke_id: u8,
}

impl ConnectionState {
    pub fn new(security_suite: Arc<SecuritySuite>) -> Self {
        Self {
            state: AssociationState::Disconnected,
            context: None,
            security_suite,
            frame_counter: FrameCounter::new(),
            replay_guard: ReplayGuard::new(),
            client_system_title: None,
            server_system_title: None,
            client_to_server_challenge: None,
            server_to_client_challenge: None,
            processed_server_to_client_challenge: None,
            authenticated: false,
            negotiated_max_pdu_size: 0,
            negotiated_conformance: Conformance::empty(),
            invoke_id: 0,
        }
    }

    pub fn state(&self) -> AssociationState {
        self.state
    }

    /// Move to `next`, rejecting transitions the state machine does not have.
    pub fn transition_to(&mut self, next: AssociationState) -> DlmsResult<()> {
        let previous = self.state;
        self.state = previous.transition(next)?;
        log::debug!("Association state {} -> {}", previous, next);
        Ok(())
    }

    /// Jump to `Closed` from wherever the association is.
    pub fn close(&mut self) {
        if !self.state.is_closed() {
            log::debug!("Association state {} -> Closed", self.state);
            self.state = AssociationState::Closed;
        }
    }

    pub fn context(&self) -> Option<ContextId> {
        self.context
    }

    pub fn set_context(&mut self, context: ContextId) {
        self.context = Some(context);
    }

    pub fn is_logical_name(&self) -> bool {
        self.context.is_some_and(ContextId::is_logical_name)
    }

    pub fn security_suite(&self) -> &Arc<SecuritySuite> {
        &self.security_suite
    }

    /// Replace the suite before the handshake settles on one.
    pub fn set_security_suite(&mut self, suite: Arc<SecuritySuite>) {
        self.security_suite = suite;
    }

    pub fn is_ciphered(&self) -> bool {
        self.security_suite.security_policy().is_ciphered()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
    }

    pub fn negotiated_max_pdu_size(&self) -> u16 {
        self.negotiated_max_pdu_size
    }

    pub fn negotiated_conformance(&self) -> Conformance {
        self.negotiated_conformance
    }

    pub fn set_negotiated(&mut self, max_pdu_size: u16, conformance: Conformance) {
        self.negotiated_max_pdu_size = max_pdu_size;
        self.negotiated_conformance = conformance;
    }

    /// Consume one value of our frame counter.
    pub fn next_frame_counter(&mut self) -> DlmsResult<u32> {
        self.frame_counter.next_value()
    }

    /// Lowest frame counter the peer may use next.
    pub fn next_expected_peer_frame_counter(&self) -> u32 {
        self.replay_guard.next_expected()
    }

    /// Record a counter the peer used, rejecting replays.
    pub fn accept_peer_frame_counter(&mut self, frame_counter: u32) -> DlmsResult<()> {
        self.replay_guard.accept(frame_counter)
    }

    /// Next client invoke id, cycling through 0..16.
    pub fn next_invoke_id(&mut self) -> InvokeIdAndPriority {
        let id = self.invoke_id;
        self.invoke_id = (self.invoke_id + 1) % 16;
        InvokeIdAndPriority::new(id, true)
    }

    /// Cipher an outgoing xDLMS PDU under our system title and the next counter value.
    pub fn protect(&mut self, plaintext: &[u8], own_title: &SystemTitle) -> DlmsResult<Vec<u8>> {
        let tag = plaintext
            .first()
            .and_then(|&tag| glo_tag(tag))
            .ok_or_else(|| DlmsError::Cipher("PDU has no glo-ciphered counterpart".to_string()))?;
        let frame_counter = self.next_frame_counter()?;
        encryption::encrypt(plaintext, own_title, frame_counter, &self.security_suite, tag)
    }

    /// Decrypt an incoming glo envelope from `peer_title`.
    ///
    /// # Errors
    /// `Cipher` when the envelope does not verify or its frame counter is not
    /// above every counter the peer used before.
    pub fn unprotect(&mut self, envelope: &[u8], peer_title: &SystemTitle) -> DlmsResult<Vec<u8>> {
        let decrypted = encryption::decrypt(envelope, peer_title, &self.security_suite)?;
        self.accept_peer_frame_counter(decrypted.frame_counter)?;
        Ok(decrypted.plaintext)
    }
}
