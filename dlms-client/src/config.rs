//! Client configuration

use dlms_application::pdu::{Conformance, MAX_PDU_SIZE};
use dlms_security::SystemTitle;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Association parameters proposed by the client
///
/// The security suite is not part of it: keys are not plain data and are
/// handed to the connection separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// client-max-receive-pdu-size proposed in the initiate-request
    pub max_pdu_size: u16,
    /// Proposed conformance bits
    pub conformance: u32,
    /// Bound on every wait for the server, in milliseconds
    pub response_timeout_ms: u64,
    /// Client system title, used for ciphering and HLS-GMAC
    pub system_title: [u8; 8],
    /// Length of the client-to-server HLS challenge
    pub challenge_length: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_pdu_size: 1024,
            conformance: Conformance::logical_name_default().bits()
                | Conformance::short_name_default().bits(),
            response_timeout_ms: 30_000,
            system_title: *b"RSC00001",
            challenge_length: 16,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_pdu_size(mut self, max_pdu_size: u16) -> Self {
        self.max_pdu_size = max_pdu_size.min(MAX_PDU_SIZE);
        self
    }

    pub fn with_conformance(mut self, conformance: Conformance) -> Self {
        self.conformance = conformance.bits();
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_system_title(mut self, system_title: SystemTitle) -> Self {
        self.system_title = *system_title.as_bytes();
        self
    }

    pub fn with_challenge_length(mut self, length: usize) -> Self {
        self.challenge_length = length;
        self
    }

    pub fn conformance(&self) -> Conformance {
        Conformance::from_bits(self.conformance)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn system_title(&self) -> SystemTitle {
        SystemTitle::new(self.system_title)
    }
}
