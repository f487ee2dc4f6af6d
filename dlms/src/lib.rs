//! DLMS/COSEM association and secure-messaging engine
//!
//! This crate gathers the workspace crates behind one dependency:
//!
//! - `dlms-core`: data objects, OBIS codes and the shared error type
//! - `dlms-asn1`: A-XDR and BER codecs, ACSE APDUs
//! - `dlms-transport`: TCP and in-memory byte streams
//! - `dlms-session`: HDLC and wrapper framing
//! - `dlms-security`: security suites, GCM protection, HLS authentication
//! - `dlms-application`: xDLMS PDUs, association state, block transfer
//! - `dlms-interface`: COSEM object registration and access rights
//! - `dlms-client`: client associations with LN and SN services
//! - `dlms-server`: logical devices, association handling and the TCP listener
//!
//! # Usage
//!
//! ```no_run
//! use dlms::client::{Connection, ConnectionBuilder};
//! use dlms::ObisCode;
//!
//! # async fn run() -> dlms::DlmsResult<()> {
//! let mut conn = ConnectionBuilder::new().tcp("127.0.0.1:4059").build_ln().await?;
//! conn.open().await?;
//! let clock = conn.get_attribute(ObisCode::new(0, 0, 1, 0, 0, 255), 8, 2).await?;
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

pub use dlms_core::datatypes::*;
pub use dlms_core::{DlmsError, DlmsResult, ObisCode};

pub mod asn1 {
    pub use dlms_asn1::*;
}

pub mod transport {
    pub use dlms_transport::*;
}

pub mod session {
    pub use dlms_session::*;
}

pub mod security {
    pub use dlms_security::*;
}

pub mod application {
    pub use dlms_application::*;
}

pub mod client {
    pub use dlms_client::*;
}

pub mod server {
    pub use dlms_server::*;
}

pub mod interface {
    pub use dlms_interface::*;
}
