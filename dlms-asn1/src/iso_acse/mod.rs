//! ISO-ACSE APDUs for DLMS/COSEM
//!
//! AARQ/AARE establish an association, RLRQ/RLRE release it. All four are
//! BER encoded; the xDLMS initiate PDUs travel inside their
//! user-information field as an OCTET STRING.

pub mod pdu;
pub mod types;

pub use pdu::{AARQApdu, AAREApdu, AcseApdu, RLREApdu, RLRQApdu};
pub use types::*;
