//! Session layer abstraction shared by HDLC and the wrapper
//!
//! The association engine only sees whole APDUs; segmentation, addressing
//! and link management stay below this trait.

use crate::error::{DlmsError, DlmsResult};
use crate::hdlc::{HdlcConnection, HdlcRole};
use crate::wrapper::WrapperSession;
use async_trait::async_trait;
use dlms_transport::StreamAccessor;

/// APDU-level session over a byte stream
#[async_trait]
pub trait SessionLayer: Send {
    /// Link setup: SNRM/UA for HDLC, nothing for the wrapper.
    async fn initialize(&mut self) -> DlmsResult<()>;

    /// Next complete APDU from the peer.
    ///
    /// # Errors
    /// `CleanShutdown` when the peer ends the session in an orderly way.
    async fn read_next_message(&mut self) -> DlmsResult<Vec<u8>>;

    async fn send(&mut self, apdu: &[u8]) -> DlmsResult<()>;

    async fn close(&mut self) -> DlmsResult<()>;

    /// Client id (HDLC client address or wrapper source wPort)
    fn client_id(&self) -> u16;

    /// Addressed logical device (HDLC upper address or wrapper destination wPort)
    fn logical_device_id(&self) -> u16;
}

#[async_trait]
impl<T: StreamAccessor> SessionLayer for HdlcConnection<T> {
    async fn initialize(&mut self) -> DlmsResult<()> {
        match self.role() {
            HdlcRole::Client => self.open().await,
            HdlcRole::Server => self.accept().await,
        }
    }

    async fn read_next_message(&mut self) -> DlmsResult<Vec<u8>> {
        self.receive().await
    }

    async fn send(&mut self, apdu: &[u8]) -> DlmsResult<()> {
        HdlcConnection::send(self, apdu).await
    }

    async fn close(&mut self) -> DlmsResult<()> {
        HdlcConnection::close(self).await
    }

    fn client_id(&self) -> u16 {
        self.client_address().map_or(0, |address| address.logical_id())
    }

    fn logical_device_id(&self) -> u16 {
        self.server_address().map_or(0, |address| address.logical_id())
    }
}

#[async_trait]
impl<T: StreamAccessor> SessionLayer for WrapperSession<T> {
    async fn initialize(&mut self) -> DlmsResult<()> {
        if self.is_closed() {
            return Err(DlmsError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "Wrapper transport is closed",
            )));
        }
        Ok(())
    }

    async fn read_next_message(&mut self) -> DlmsResult<Vec<u8>> {
        self.receive().await
    }

    async fn send(&mut self, apdu: &[u8]) -> DlmsResult<()> {
        WrapperSession::send(self, apdu).await
    }

    async fn close(&mut self) -> DlmsResult<()> {
        WrapperSession::close(self).await
    }

    fn client_id(&self) -> u16 {
        WrapperSession::client_id(self).unwrap_or(0)
    }

    fn logical_device_id(&self) -> u16 {
        WrapperSession::logical_device_id(self).unwrap_or(0)
    }
}

#[async_trait]
impl<S: SessionLayer + ?Sized> SessionLayer for Box<S> {
    async fn initialize(&mut self) -> DlmsResult<()> {
        (**self).initialize().await
    }

    async fn read_next_message(&mut self) -> DlmsResult<Vec<u8>> {
        (**self).read_next_message().await
    }

    async fn send(&mut self, apdu: &[u8]) -> DlmsResult<()> {
        (**self).send(apdu).await
    }

    async fn close(&mut self) -> DlmsResult<()> {
        (**self).close().await
    }

    fn client_id(&self) -> u16 {
        (**self).client_id()
    }

    fn logical_device_id(&self) -> u16 {
        (**self).logical_device_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hdlc::{HdlcAddress, HdlcParameters};
    use dlms_transport::IoTransport;

    #[tokio::test]
    async fn test_boxed_sessions_expose_ids() {
        let (a, b) = tokio::io::duplex(4096);
        let mut client: Box<dyn SessionLayer> = Box::new(HdlcConnection::new_client(
            IoTransport::new(a, None),
            HdlcAddress::new(0x30).unwrap(),
            HdlcAddress::new(0x02).unwrap(),
            HdlcParameters::default(),
        ));
        let mut server: Box<dyn SessionLayer> =
            Box::new(HdlcConnection::new_server(IoTransport::new(b, None), HdlcParameters::default()));

        let (opened, accepted) = tokio::join!(client.initialize(), server.initialize());
        opened.unwrap();
        accepted.unwrap();
        assert_eq!(server.client_id(), 0x30);
        assert_eq!(server.logical_device_id(), 0x02);

        client.send(&[0xC0, 0x01]).await.unwrap();
        assert_eq!(server.read_next_message().await.unwrap(), vec![0xC0, 0x01]);
    }

    #[tokio::test]
    async fn test_wrapper_session_layer() {
        let (a, b) = tokio::io::duplex(1024);
        let mut client: Box<dyn SessionLayer> = Box::new(WrapperSession::new_client(IoTransport::new(a, None), 1, 17));
        let mut server: Box<dyn SessionLayer> = Box::new(WrapperSession::new_server(IoTransport::new(b, None)));
        client.initialize().await.unwrap();
        server.initialize().await.unwrap();
        client.send(&[0x62, 0x00]).await.unwrap();
        assert_eq!(server.read_next_message().await.unwrap(), vec![0x62, 0x00]);
        assert_eq!(server.client_id(), 1);
        assert_eq!(server.logical_device_id(), 17);
    }
}
