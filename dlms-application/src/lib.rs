//! Application layer for DLMS/COSEM
//!
//! xDLMS PDUs and the [`APdu`] union that carries them, the association
//! state machine with its per-connection state, and block transfer.

pub mod apdu;
pub mod association;
pub mod block_transfer;
pub mod error;
pub mod pdu;

pub use apdu::APdu;
pub use association::{AssociationState, ConnectionState};
pub use block_transfer::{BlockAssembler, BlockService, Fragments};
pub use error::{DlmsError, DlmsResult};
pub use pdu::CosemPdu;
