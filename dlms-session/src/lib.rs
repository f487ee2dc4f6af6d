//! Session layer module for DLMS/COSEM protocol
//!
//! This crate provides the HDLC and wrapper session layers behind the common
//! [`SessionLayer`] trait.

pub mod error;
pub mod hdlc;
pub mod session;
pub mod wrapper;

pub use error::{DlmsError, DlmsResult};
pub use hdlc::*;
pub use session::SessionLayer;
pub use wrapper::{WrapperHeader, WrapperPdu, WrapperSession, WRAPPER_HEADER_LENGTH};
