//! Transport layer module for DLMS/COSEM protocol
//!
//! This crate provides the [`StreamAccessor`] abstraction used by the session
//! layers, a transport over any tokio byte stream and a TCP transport.

pub mod error;
pub mod io;
pub mod stream;
pub mod tcp;

pub use error::{DlmsError, DlmsResult};
pub use io::IoTransport;
pub use stream::{StreamAccessor, TransportLayer};
pub use tcp::{TcpSettings, TcpTransport};
