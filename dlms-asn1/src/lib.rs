//! ASN.1 processing for DLMS/COSEM
//!
//! - [`axdr`]: A-XDR codec for `Data` values and the primitives the xDLMS
//!   PDU encoders are built from
//! - [`ber`]: definite-length BER TLV and OBJECT IDENTIFIER helpers
//! - [`iso_acse`]: AARQ, AARE, RLRQ and RLRE

pub mod axdr;
pub mod ber;
pub mod error;
pub mod iso_acse;

pub use axdr::{AxdrDecoder, AxdrEncoder, AxdrTag, LengthEncoding};
pub use ber::{BerDecoder, BerEncoder, BerTag, BerTagClass};
pub use error::{DlmsError, DlmsResult};
pub use iso_acse::{AARQApdu, AAREApdu, AcseApdu, ContextId, RLREApdu, RLRQApdu};
