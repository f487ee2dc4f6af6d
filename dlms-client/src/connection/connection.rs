//! Connection trait for DLMS/COSEM clients
//!
//! The lifecycle shared by logical-name and short-name connections. The data
//! services differ by referencing and live on [`LnConnection`](super::LnConnection)
//! and [`SnConnection`](super::SnConnection).

use dlms_core::DlmsResult;

#[async_trait::async_trait]
pub trait Connection: Send {
    /// Open the session and establish the association.
    ///
    /// # Errors
    /// Any transport, session or association failure. The session is
    /// closed again on failure.
    async fn open(&mut self) -> DlmsResult<()>;

    /// Release the association and close the session.
    async fn close(&mut self) -> DlmsResult<()>;

    fn is_open(&self) -> bool;
}
