//! Security module for DLMS/COSEM protocol
//!
//! This crate provides the security suite configuration, APDU ciphering,
//! HLS challenge processing, frame counters and key wrapping.

pub mod authentication;
pub mod encryption;
pub mod error;
pub mod suite;
pub mod utils;
pub mod xdlms;

pub use encryption::{decrypt, encrypt, CipheredApdu, DecryptedApdu, SecurityControl};
pub use error::{DlmsError, DlmsResult};
pub use suite::{
    AuthenticationMechanism, EncryptionMechanism, SecurityPolicy, SecuritySuite,
    SecuritySuiteBuilder,
};
pub use utils::KeyId;
pub use xdlms::{FrameCounter, ReplayGuard, SystemTitle};
