//! DLMS/COSEM client
//!
//! Opens an association over any [`SessionLayer`](dlms_session::SessionLayer):
//! AARQ with optional ciphering and LOW or HLS authentication, then GET, SET
//! and ACTION by logical name ([`LnConnection`]) or READ and WRITE by short
//! name ([`SnConnection`]), and finally release.

pub mod config;
pub mod connection;
pub mod error;

pub use config::ClientConfig;
pub use connection::{
    attribute_variable_name, method_variable_name, ClientAssociation, Connection, ConnectionBuilder,
    LnConnection, SnConnection,
};
pub use error::{DlmsError, DlmsResult};
