//! A-XDR encoding/decoding module

pub mod decoder;
pub mod encoder;
pub mod types;

pub use decoder::{decode_data, AxdrDecoder};
pub use encoder::{encode_data, AxdrEncoder};
pub use types::{AxdrTag, LengthEncoding};
