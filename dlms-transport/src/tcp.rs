//! TCP transport implementation

use crate::error::{DlmsError, DlmsResult};
use crate::io::IoTransport;
use crate::stream::{StreamAccessor, TransportLayer};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

/// TCP transport layer settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub address: SocketAddr,
    pub timeout: Option<Duration>,
}

impl TcpSettings {
    /// Create new TCP settings
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Create TCP settings with timeout
    pub fn with_timeout(address: SocketAddr, timeout: Duration) -> Self {
        Self {
            address,
            timeout: Some(timeout),
        }
    }
}

/// TCP transport layer implementation
#[derive(Debug)]
pub struct TcpTransport {
    inner: IoTransport<TcpStream>,
    settings: TcpSettings,
}

impl TcpTransport {
    /// Create a new, unopened TCP transport
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            inner: IoTransport::detached(settings.timeout),
            settings,
        }
    }

    /// Create TCP transport from address string
    pub fn from_address(address: &str) -> DlmsResult<Self> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| DlmsError::InvalidData(format!("Invalid TCP address: {}", e)))?;
        Ok(Self::new(TcpSettings::new(addr)))
    }

    /// Create TCP transport from an already-connected TcpStream (for server use)
    ///
    /// # Arguments
    /// * `stream` - The accepted TCP stream
    /// * `timeout` - Optional read/write timeout
    pub fn from_connected_stream(stream: TcpStream, timeout: Option<Duration>) -> DlmsResult<Self> {
        let address = stream.peer_addr()?;
        Ok(Self {
            inner: IoTransport::new(stream, timeout),
            settings: TcpSettings { address, timeout },
        })
    }

    /// Remote address of the connection
    pub fn peer_address(&self) -> SocketAddr {
        self.settings.address
    }
}

#[async_trait]
impl TransportLayer for TcpTransport {
    async fn open(&mut self) -> DlmsResult<()> {
        if self.inner.is_attached() {
            return Err(DlmsError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }

        let stream = match self.settings.timeout {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(self.settings.address))
                .await
                .map_err(|_| DlmsError::Timeout)??,
            None => TcpStream::connect(self.settings.address).await?,
        };
        stream.set_nodelay(true)?;
        log::debug!("Connected to {}", self.settings.address);

        self.inner.attach(stream);
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for TcpTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> DlmsResult<()> {
        self.settings.timeout = timeout;
        self.inner.set_timeout(timeout).await
    }

    async fn read(&mut self, buf: &mut [u8]) -> DlmsResult<usize> {
        self.inner.read(buf).await
    }

    async fn write(&mut self, buf: &[u8]) -> DlmsResult<usize> {
        self.inner.write(buf).await
    }

    async fn flush(&mut self) -> DlmsResult<()> {
        self.inner.flush().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    async fn close(&mut self) -> DlmsResult<()> {
        self.inner.close().await
    }
}
