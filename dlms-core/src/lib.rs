//! Core types and utilities for DLMS/COSEM protocol
//!
//! This crate provides the error taxonomy shared by every layer, the COSEM
//! `Data` value model and OBIS codes.

pub mod datatypes;
pub mod error;
pub mod obis_code;

pub use datatypes::{BitString, DataObject, DataObjectType};
pub use error::{DlmsError, DlmsResult};
pub use obis_code::ObisCode;
