//! HDLC session layer module

pub mod address;
pub mod connection;
pub mod fcs;
pub mod frame;
pub mod parameters;
pub mod state;

pub use address::{reserved, HdlcAddress, HdlcAddressPair};
pub use connection::{HdlcConnection, HdlcRole};
pub use fcs::FcsCalc;
pub use frame::{FrameType, HdlcFrame, FLAG, LLC_REQUEST, LLC_RESPONSE};
pub use parameters::HdlcParameters;
pub use state::HdlcConnectionState;
