//! BER (Basic Encoding Rules) encoder and decoder for ASN.1
//!
//! ISO-ACSE APDUs use BER with definite lengths; the xDLMS PDUs carried in
//! their user-information field use A-XDR instead. Each value is a TLV:
//!
//! ```text
//! [Tag] [Length] [Value]
//! ```
//!
//! Lengths share the short/long form of [`crate::axdr::LengthEncoding`].

pub mod decoder;
pub mod encoder;
pub mod types;

pub use decoder::BerDecoder;
pub use encoder::BerEncoder;
pub use types::{BerTag, BerTagClass};
