//! Wrapper session layer for DLMS/COSEM over TCP/UDP (IEC 62056-47)
//!
//! Every APDU is prefixed with an 8-byte header, all fields u16 big-endian:
//! version 0x0001, source wPort, destination wPort, APDU length. The client
//! wPort is the client id; the server wPort is the logical device id.

use crate::error::{DlmsError, DlmsResult};
use dlms_transport::StreamAccessor;

/// Wrapper header length
pub const WRAPPER_HEADER_LENGTH: usize = 8;

/// The only wrapper version in use
pub const WRAPPER_VERSION: u16 = 0x0001;

/// Wrapper header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapperHeader {
    source_port: u16,
    destination_port: u16,
    length: u16,
}

impl WrapperHeader {
    pub fn new(source_port: u16, destination_port: u16, length: u16) -> Self {
        Self {
            source_port,
            destination_port,
            length,
        }
    }

    /// Encode header to bytes (big-endian)
    pub fn encode(&self) -> [u8; WRAPPER_HEADER_LENGTH] {
        let mut result = [0u8; WRAPPER_HEADER_LENGTH];
        result[0..2].copy_from_slice(&WRAPPER_VERSION.to_be_bytes());
        result[2..4].copy_from_slice(&self.source_port.to_be_bytes());
        result[4..6].copy_from_slice(&self.destination_port.to_be_bytes());
        result[6..8].copy_from_slice(&self.length.to_be_bytes());
        result
    }

    /// # Errors
    /// `FrameInvalid` for a short buffer or a version other than 1.
    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        if data.len() < WRAPPER_HEADER_LENGTH {
            return Err(DlmsError::FrameInvalid(format!(
                "Wrapper header too short: expected {}, got {}",
                WRAPPER_HEADER_LENGTH,
                data.len()
            )));
        }
        let word = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]);
        let version = word(0);
        if version != WRAPPER_VERSION {
            return Err(DlmsError::FrameInvalid(format!(
                "Header version was {}, this stack is only compatible to version 1",
                version
            )));
        }
        Ok(Self {
            source_port: word(2),
            destination_port: word(4),
            length: word(6),
        })
    }

    pub fn source_port(&self) -> u16 {
        self.source_port
    }

    pub fn destination_port(&self) -> u16 {
        self.destination_port
    }

    /// Get payload length
    pub fn payload_length(&self) -> u16 {
        self.length
    }
}

/// Wrapper PDU (header plus APDU)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperPdu {
    header: WrapperHeader,
    data: Vec<u8>,
}

impl WrapperPdu {
    /// # Errors
    /// `InvalidData` when `data` does not fit the 16-bit length field.
    pub fn new(source_port: u16, destination_port: u16, data: Vec<u8>) -> DlmsResult<Self> {
        let length = u16::try_from(data.len()).map_err(|_| {
            DlmsError::InvalidData(format!("APDU of {} bytes exceeds the wrapper length field", data.len()))
        })?;
        Ok(Self {
            header: WrapperHeader::new(source_port, destination_port, length),
            data,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(WRAPPER_HEADER_LENGTH + self.data.len());
        result.extend_from_slice(&self.header.encode());
        result.extend_from_slice(&self.data);
        result
    }

    /// Read one PDU from the stream
    pub async fn read_from<S: StreamAccessor + ?Sized>(stream: &mut S) -> DlmsResult<Self> {
        let mut header_bytes = [0u8; WRAPPER_HEADER_LENGTH];
        let first = stream.read(&mut header_bytes).await?;
        if first == 0 {
            return Err(DlmsError::unexpected_eof("Wrapper stream ended"));
        }
        stream.read_exact(&mut header_bytes[first..]).await?;
        let header = WrapperHeader::decode(&header_bytes)?;

        let mut data = vec![0u8; header.payload_length() as usize];
        stream.read_exact(&mut data).await?;
        Ok(Self { header, data })
    }

    pub fn header(&self) -> &WrapperHeader {
        &self.header
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Wrapper session layer
#[derive(Debug)]
pub struct WrapperSession<T: StreamAccessor> {
    transport: T,
    /// Our wPort followed by the peer's, once known
    ports: Option<(u16, u16)>,
    is_client: bool,
    closed: bool,
}

impl<T: StreamAccessor> WrapperSession<T> {
    /// Client session from `client_id` to `logical_device_id`
    pub fn new_client(transport: T, client_id: u16, logical_device_id: u16) -> Self {
        Self {
            transport,
            ports: Some((client_id, logical_device_id)),
            is_client: true,
            closed: false,
        }
    }

    /// Server session; ports are learned from the first request
    pub fn new_server(transport: T) -> Self {
        Self {
            transport,
            ports: None,
            is_client: false,
            closed: false,
        }
    }

    pub fn client_id(&self) -> Option<u16> {
        self.ports.map(|(local, peer)| if self.is_client { local } else { peer })
    }

    pub fn logical_device_id(&self) -> Option<u16> {
        self.ports.map(|(local, peer)| if self.is_client { peer } else { local })
    }

    fn ensure_open(&self) -> DlmsResult<()> {
        if self.is_closed() {
            return Err(DlmsError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "Wrapper session is closed",
            )));
        }
        Ok(())
    }

    /// Send one APDU through the wrapper session
    pub async fn send(&mut self, data: &[u8]) -> DlmsResult<()> {
        self.ensure_open()?;
        let (local, peer) = self
            .ports
            .ok_or_else(|| DlmsError::Protocol("Wrapper ports not yet known".to_string()))?;
        let pdu = WrapperPdu::new(local, peer, data.to_vec())?;
        self.transport.write_all(&pdu.encode()).await?;
        self.transport.flush().await
    }

    /// Receive one APDU, checking that its ports belong to this session
    pub async fn receive(&mut self) -> DlmsResult<Vec<u8>> {
        self.ensure_open()?;
        let pdu = WrapperPdu::read_from(&mut self.transport).await?;
        let header = *pdu.header();
        match self.ports {
            None => {
                log::debug!(
                    "Wrapper session client {} -> logical device {}",
                    header.source_port(),
                    header.destination_port()
                );
                self.ports = Some((header.destination_port(), header.source_port()));
            }
            Some((local, peer)) if header.destination_port() != local || header.source_port() != peer => {
                return Err(DlmsError::FrameInvalid(format!(
                    "Wrapper ports {} -> {} do not belong to session {} <-> {}",
                    header.source_port(),
                    header.destination_port(),
                    peer,
                    local
                )));
            }
            Some(_) => {}
        }
        Ok(pdu.into_data())
    }

    pub fn is_closed(&self) -> bool {
        self.closed || self.transport.is_closed()
    }

    pub async fn close(&mut self) -> DlmsResult<()> {
        if !self.closed {
            self.closed = true;
            self.transport.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlms_transport::IoTransport;

    #[test]
    fn test_wrapper_header_encode_decode() {
        let header = WrapperHeader::new(0x0010, 0x0001, 100);
        let encoded = header.encode();
        assert_eq!(encoded, [0x00, 0x01, 0x00, 0x10, 0x00, 0x01, 0x00, 0x64]);
        assert_eq!(WrapperHeader::decode(&encoded).unwrap(), header);

        assert!(WrapperHeader::decode(&[0x00, 0x02, 0, 0, 0, 0, 0, 0]).is_err());
        assert!(WrapperHeader::decode(&[0x00, 0x01, 0x00]).is_err());
    }

    #[tokio::test]
    async fn test_server_learns_ports() {
        let mock = tokio_test::io::Builder::new()
            .read(&[0x00, 0x01, 0x00, 0x10, 0x00])
            .read(&[0x01, 0x00, 0x02, 0xAB, 0xCD])
            .write(&[0x00, 0x01, 0x00, 0x01, 0x00, 0x10, 0x00, 0x01, 0xEE])
            .read(&[0x00, 0x01, 0x00, 0x11, 0x00, 0x01, 0x00, 0x00])
            .build();
        let mut session = WrapperSession::new_server(IoTransport::new(mock, None));
        assert_eq!(session.client_id(), None);
        assert_eq!(session.receive().await.unwrap(), vec![0xAB, 0xCD]);
        assert_eq!(session.client_id(), Some(0x10));
        assert_eq!(session.logical_device_id(), Some(0x01));
        session.send(&[0xEE]).await.unwrap();
        assert!(matches!(session.receive().await, Err(DlmsError::FrameInvalid(_))));
    }

    #[tokio::test]
    async fn test_client_server_round_trip() {
        let (a, b) = tokio::io::duplex(1024);
        let mut client = WrapperSession::new_client(IoTransport::new(a, None), 0x10, 0x01);
        let mut server = WrapperSession::new_server(IoTransport::new(b, None));
        client.send(&[0x60, 0x00]).await.unwrap();
        assert_eq!(server.receive().await.unwrap(), vec![0x60, 0x00]);
        server.send(&[0x61, 0x00]).await.unwrap();
        assert_eq!(client.receive().await.unwrap(), vec![0x61, 0x00]);

        client.close().await.unwrap();
        assert!(server.receive().await.is_err());
    }
}
