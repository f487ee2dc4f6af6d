//! Server configuration

use dlms_application::pdu::{Conformance, MAX_PDU_SIZE};
use dlms_security::SystemTitle;
use dlms_session::HdlcParameters;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Session layer spoken on accepted connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionKind {
    Hdlc,
    #[default]
    Wrapper,
}

/// Server configuration
///
/// Plain data; every field has a default so partial configurations
/// deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Largest APDU the server accepts, before negotiation
    pub max_pdu_size: u16,
    /// Conformance bits offered to clients
    pub conformance: u32,
    /// Bound on every wait for the peer, in milliseconds
    pub inactivity_timeout_ms: u64,
    /// Server system title, used for ciphering and HLS
    pub system_title: [u8; 8],
    pub session: SessionKind,
    pub hdlc: HdlcParameters,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_pdu_size: 1024,
            conformance: Conformance::logical_name_default().bits()
                | Conformance::short_name_default().bits(),
            inactivity_timeout_ms: 120_000,
            system_title: *b"RSD00001",
            session: SessionKind::default(),
            hdlc: HdlcParameters::default(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum PDU size; values above the xDLMS maximum are clamped.
    pub fn with_max_pdu_size(mut self, max_pdu_size: u16) -> Self {
        self.max_pdu_size = max_pdu_size.min(MAX_PDU_SIZE);
        self
    }

    pub fn with_conformance(mut self, conformance: Conformance) -> Self {
        self.conformance = conformance.bits();
        self
    }

    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_system_title(mut self, system_title: SystemTitle) -> Self {
        self.system_title = *system_title.as_bytes();
        self
    }

    pub fn with_session(mut self, session: SessionKind) -> Self {
        self.session = session;
        self
    }

    pub fn with_hdlc_parameters(mut self, parameters: HdlcParameters) -> Self {
        self.hdlc = parameters;
        self
    }

    pub fn conformance(&self) -> Conformance {
        Conformance::from_bits(self.conformance)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }

    pub fn system_title(&self) -> SystemTitle {
        SystemTitle::new(self.system_title)
    }
}
