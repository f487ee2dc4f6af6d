//! Connection builder for DLMS/COSEM clients over TCP
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use dlms_client::{Connection, ConnectionBuilder};
//! use dlms_core::ObisCode;
//!
//! # async fn run() -> dlms_core::DlmsResult<()> {
//! let mut conn = ConnectionBuilder::new()
//!     .tcp("192.168.1.100:4059")
//!     .wrapper_ids(0x10, 0x01)
//!     .build_ln()
//!     .await?;
//! conn.open().await?;
//! let value = conn.get_attribute(ObisCode::new(0, 0, 96, 1, 0, 255), 1, 2).await?;
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

use super::{LnConnection, SnConnection};
use crate::config::ClientConfig;
use dlms_core::{DlmsError, DlmsResult};
use dlms_security::SecuritySuite;
use dlms_session::{HdlcAddress, HdlcConnection, HdlcParameters, SessionLayer, WrapperSession};
use dlms_transport::{TcpTransport, TransportLayer};
use std::sync::Arc;

/// Session layer addressing of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionAddressing {
    Hdlc {
        client_address: u16,
        logical_device: u16,
        physical_device: u16,
    },
    Wrapper {
        client_id: u16,
        logical_device_id: u16,
    },
}

#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    address: Option<String>,
    addressing: SessionAddressing,
    hdlc_parameters: HdlcParameters,
    security_suite: Arc<SecuritySuite>,
    config: ClientConfig,
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionBuilder {
    /// Wrapper session, client id 0x10 (public client), logical device 1, no security
    pub fn new() -> Self {
        Self {
            address: None,
            addressing: SessionAddressing::Wrapper {
                client_id: 0x10,
                logical_device_id: 0x01,
            },
            hdlc_parameters: HdlcParameters::default(),
            security_suite: Arc::new(SecuritySuite::default()),
            config: ClientConfig::default(),
        }
    }

    /// Server address as `host:port`
    pub fn tcp(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    /// HDLC session from `client_address` to the logical device at
    /// `logical_device` (physical address 0)
    pub fn hdlc_addresses(mut self, client_address: u16, logical_device: u16) -> Self {
        self.addressing = SessionAddressing::Hdlc {
            client_address,
            logical_device,
            physical_device: 0,
        };
        self
    }

    pub fn hdlc_physical_address(mut self, physical_device: u16) -> Self {
        if let SessionAddressing::Hdlc {
            physical_device: ref mut physical,
            ..
        } = self.addressing
        {
            *physical = physical_device;
        }
        self
    }

    pub fn hdlc_parameters(mut self, parameters: HdlcParameters) -> Self {
        self.hdlc_parameters = parameters;
        self
    }

    /// Wrapper session: source wPort `client_id`, destination wPort `logical_device_id`
    pub fn wrapper_ids(mut self, client_id: u16, logical_device_id: u16) -> Self {
        self.addressing = SessionAddressing::Wrapper {
            client_id,
            logical_device_id,
        };
        self
    }

    pub fn security(mut self, suite: SecuritySuite) -> Self {
        self.security_suite = Arc::new(suite);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Connect and return an unopened LN connection.
    ///
    /// # Errors
    /// `InvalidData` when no valid address was configured, `Connection` or
    /// `Timeout` when the TCP connection cannot be made.
    pub async fn build_ln(self) -> DlmsResult<LnConnection<Box<dyn SessionLayer>>> {
        let session = self.connect().await?;
        Ok(LnConnection::new(session, self.security_suite, self.config))
    }

    /// Connect and return an unopened SN connection.
    pub async fn build_sn(self) -> DlmsResult<SnConnection<Box<dyn SessionLayer>>> {
        let session = self.connect().await?;
        Ok(SnConnection::new(session, self.security_suite, self.config))
    }

    async fn connect(&self) -> DlmsResult<Box<dyn SessionLayer>> {
        let address = self
            .address
            .as_deref()
            .ok_or_else(|| DlmsError::InvalidData("No TCP address configured".to_string()))?;
        let mut transport = TcpTransport::from_address(address)?;
        transport.open().await?;
        Ok(match self.addressing {
            SessionAddressing::Hdlc {
                client_address,
                logical_device,
                physical_device,
            } => Box::new(HdlcConnection::new_client(
                transport,
                HdlcAddress::new(client_address)?,
                HdlcAddress::new_with_physical(logical_device, physical_device)?,
                self.hdlc_parameters,
            )),
            SessionAddressing::Wrapper {
                client_id,
                logical_device_id,
            } => Box::new(WrapperSession::new_client(transport, client_id, logical_device_id)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_without_address_fails() {
        let result = ConnectionBuilder::new().build_ln().await;
        assert!(matches!(result, Err(DlmsError::InvalidData(_))));
    }

    #[test]
    fn test_physical_address_applies_to_hdlc_only() {
        let builder = ConnectionBuilder::new().hdlc_physical_address(0x11);
        assert_eq!(
            builder.addressing,
            SessionAddressing::Wrapper {
                client_id: 0x10,
                logical_device_id: 0x01
            }
        );

        let builder = ConnectionBuilder::new()
            .hdlc_addresses(0x10, 0x01)
            .hdlc_physical_address(0x11);
        assert_eq!(
            builder.addressing,
            SessionAddressing::Hdlc {
                client_address: 0x10,
                logical_device: 0x01,
                physical_device: 0x11
            }
        );
    }
}
