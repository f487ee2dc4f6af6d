//! Stream accessor trait for transport layer

use crate::error::{DlmsError, DlmsResult};
use async_trait::async_trait;
use bytes::BytesMut;
use std::time::Duration;

/// Stream accessor interface to access a physical stream to a remote peer
///
/// One association owns its accessor exclusively, so implementations only
/// need to be `Send`.
#[async_trait]
pub trait StreamAccessor: Send {
    /// Set the read/write timeout
    ///
    /// # Arguments
    ///
    /// * `timeout` - The timeout duration. None means infinite timeout.
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> DlmsResult<()>;

    /// Read data from the stream
    ///
    /// # Returns
    ///
    /// Number of bytes read, or 0 if EOF
    async fn read(&mut self, buf: &mut [u8]) -> DlmsResult<usize>;

    /// Read exact number of bytes from the stream
    ///
    /// # Returns
    ///
    /// Returns error if the stream ends before `buf` is filled
    async fn read_exact(&mut self, mut buf: &mut [u8]) -> DlmsResult<()> {
        while !buf.is_empty() {
            let n = self.read(buf).await?;
            if n == 0 {
                return Err(DlmsError::unexpected_eof("Failed to read exact number of bytes"));
            }
            buf = &mut buf[n..];
        }
        Ok(())
    }

    /// Read whatever is available (at least one byte) and append it to `buf`.
    ///
    /// Returns the number of bytes appended, 0 on EOF.
    async fn read_buf(&mut self, buf: &mut BytesMut) -> DlmsResult<usize> {
        let mut chunk = [0u8; 512];
        let n = self.read(&mut chunk).await?;
        buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Write data to the stream
    ///
    /// # Returns
    ///
    /// Number of bytes written
    async fn write(&mut self, buf: &[u8]) -> DlmsResult<usize>;

    /// Write all data to the stream
    async fn write_all(&mut self, buf: &[u8]) -> DlmsResult<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..]).await?;
            if n == 0 {
                return Err(DlmsError::Connection(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "Failed to write all data",
                )));
            }
            written += n;
        }
        Ok(())
    }

    /// Flush any buffered data
    async fn flush(&mut self) -> DlmsResult<()>;

    /// Check if the stream is closed
    fn is_closed(&self) -> bool;

    /// Close the stream
    async fn close(&mut self) -> DlmsResult<()>;
}

/// Transport layer trait that extends StreamAccessor
#[async_trait]
pub trait TransportLayer: StreamAccessor {
    /// Open the physical layer connection
    async fn open(&mut self) -> DlmsResult<()>;
}

#[async_trait]
impl<T: StreamAccessor + ?Sized> StreamAccessor for Box<T> {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> DlmsResult<()> {
        (**self).set_timeout(timeout).await
    }

    async fn read(&mut self, buf: &mut [u8]) -> DlmsResult<usize> {
        (**self).read(buf).await
    }

    async fn write(&mut self, buf: &[u8]) -> DlmsResult<usize> {
        (**self).write(buf).await
    }

    async fn flush(&mut self) -> DlmsResult<()> {
        (**self).flush().await
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    async fn close(&mut self) -> DlmsResult<()> {
        (**self).close().await
    }
}
