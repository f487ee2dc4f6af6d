//! Data types used in DLMS/COSEM protocol

pub mod bit_string;
pub mod data_object;

pub use bit_string::BitString;
pub use data_object::{DataObject, DataObjectType};
