//! Transport over any tokio byte stream
//!
//! Used for accepted TCP sockets and, in tests, for in-memory duplex pipes.

use crate::error::{DlmsError, DlmsResult};
use crate::stream::StreamAccessor;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bound every wait on the stream by `timeout`, if any.
async fn with_timeout<T, F>(timeout: Option<Duration>, operation: F) -> DlmsResult<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, operation)
            .await
            .map_err(|_| DlmsError::Timeout)?
            .map_err(DlmsError::Connection),
        None => operation.await.map_err(DlmsError::Connection),
    }
}

fn not_connected() -> DlmsError {
    DlmsError::Connection(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "Stream not connected",
    ))
}

/// [`StreamAccessor`] over an `AsyncRead + AsyncWrite` stream
pub struct IoTransport<S> {
    stream: Option<S>,
    timeout: Option<Duration>,
    closed: bool,
}

impl<S> fmt::Debug for IoTransport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoTransport")
            .field("timeout", &self.timeout)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<S> IoTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, timeout: Option<Duration>) -> Self {
        Self {
            stream: Some(stream),
            timeout,
            closed: false,
        }
    }

    /// Transport with no stream yet; every operation fails until [`IoTransport::attach`].
    pub fn detached(timeout: Option<Duration>) -> Self {
        Self {
            stream: None,
            timeout,
            closed: true,
        }
    }

    pub fn attach(&mut self, stream: S) {
        self.stream = Some(stream);
        self.closed = false;
    }

    pub fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> Option<S> {
        self.stream
    }
}

#[async_trait]
impl<S> StreamAccessor for IoTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> DlmsResult<()> {
        self.timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> DlmsResult<usize> {
        let timeout = self.timeout;
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        let result = with_timeout(timeout, stream.read(buf)).await;
        match result {
            Ok(0) if !buf.is_empty() => {
                self.closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(DlmsError::Timeout) => Err(DlmsError::Timeout),
            Err(e) => {
                self.closed = true;
                Err(e)
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> DlmsResult<usize> {
        let timeout = self.timeout;
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        with_timeout(timeout, stream.write(buf)).await
    }

    async fn flush(&mut self) -> DlmsResult<()> {
        let timeout = self.timeout;
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        with_timeout(timeout, stream.flush()).await
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> DlmsResult<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                log::debug!("Ignoring error while shutting down stream: {}", e);
            }
        }
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[tokio::test]
    async fn test_duplex_round_trip() {
        let (client, server) = tokio::io::duplex(1024);
        let mut a = IoTransport::new(client, Some(Duration::from_secs(1)));
        let mut b = IoTransport::new(server, Some(Duration::from_secs(1)));

        a.write_all(&[0x7E, 0xA0, 0x07]).await.unwrap();
        a.flush().await.unwrap();
        let mut buf = [0u8; 3];
        b.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x7E, 0xA0, 0x07]);
    }

    #[tokio::test]
    async fn test_scripted_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(&[0x00, 0x01])
            .read(&[0x00, 0x10, 0x00, 0x01])
            .write(&[0xAA])
            .build();
        let mut transport = IoTransport::new(mock, None);
        let mut header = [0u8; 6];
        transport.read_exact(&mut header).await.unwrap();
        assert_eq!(header, [0x00, 0x01, 0x00, 0x10, 0x00, 0x01]);
        transport.write_all(&[0xAA]).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_buf_appends() {
        let mock = tokio_test::io::Builder::new().read(&[1, 2]).read(&[3]).build();
        let mut transport = IoTransport::new(mock, None);
        let mut buf = BytesMut::new();
        assert_eq!(transport.read_buf(&mut buf).await.unwrap(), 2);
        assert_eq!(transport.read_buf(&mut buf).await.unwrap(), 1);
        assert_eq!(&buf[..], &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_eof_marks_closed() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let mut transport = IoTransport::new(client, None);
        let mut buf = [0u8; 4];
        let err = transport.read_exact(&mut buf).await.unwrap_err();
        assert!(matches!(err, DlmsError::Connection(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_read_times_out() {
        let (client, _server) = tokio::io::duplex(64);
        let mut transport = IoTransport::new(client, Some(Duration::from_millis(20)));
        let mut buf = [0u8; 1];
        assert!(matches!(transport.read(&mut buf).await, Err(DlmsError::Timeout)));
        assert!(!transport.is_closed());
    }

    #[tokio::test]
    async fn test_detached_transport_is_not_connected() {
        let mut transport: IoTransport<tokio::io::DuplexStream> = IoTransport::detached(None);
        let mut buf = [0u8; 1];
        assert!(transport.read(&mut buf).await.is_err());
        assert!(transport.is_closed());
        transport.close().await.unwrap();
    }
}
