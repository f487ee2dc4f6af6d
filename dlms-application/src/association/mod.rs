//! Association management for DLMS/COSEM connections
//!
//! [`AssociationState`] is the handshake state machine shared by client and
//! server. [`ConnectionState`] carries everything one association mutates:
//! frame counters, system titles, HLS challenges and the negotiated
//! parameters.

pub mod connection_state;
pub mod state;

pub use connection_state::ConnectionState;
pub use state::AssociationState;
