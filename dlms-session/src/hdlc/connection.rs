//! HDLC connection implementation
//!
//! One connection carries one association. Sending is stop-and-wait: a
//! message longer than the negotiated information length is split into
//! segments and every non-final segment waits for the peer's RR.

use crate::error::{DlmsError, DlmsResult};
use crate::hdlc::address::{HdlcAddress, HdlcAddressPair};
use crate::hdlc::frame::{FrameType, HdlcFrame, FLAG, LLC_REQUEST, LLC_RESPONSE, MAX_FRAME_LENGTH};
use crate::hdlc::parameters::HdlcParameters;
use crate::hdlc::state::HdlcConnectionState;
use bytes::{Buf, BytesMut};
use dlms_transport::StreamAccessor;

/// Which end of the link this connection is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdlcRole {
    /// Primary station: sends SNRM and requests
    Client,
    /// Secondary station: answers SNRM and sends responses
    Server,
}

/// HDLC connection over a byte stream
pub struct HdlcConnection<T: StreamAccessor> {
    transport: T,
    role: HdlcRole,
    client_address: Option<HdlcAddress>,
    server_address: Option<HdlcAddress>,
    /// Our own capability, the upper bound of every negotiation
    local_parameters: HdlcParameters,
    parameters: HdlcParameters,
    send_sequence: u8,
    receive_sequence: u8,
    state: HdlcConnectionState,
    buffer: BytesMut,
}

impl<T: StreamAccessor> HdlcConnection<T> {
    /// Client end addressing `server_address`
    pub fn new_client(
        transport: T,
        client_address: HdlcAddress,
        server_address: HdlcAddress,
        parameters: HdlcParameters,
    ) -> Self {
        Self::with_role(transport, HdlcRole::Client, Some(client_address), Some(server_address), parameters)
    }

    /// Server end; both addresses are learned from the client's SNRM
    pub fn new_server(transport: T, parameters: HdlcParameters) -> Self {
        Self::with_role(transport, HdlcRole::Server, None, None, parameters)
    }

    fn with_role(
        transport: T,
        role: HdlcRole,
        client_address: Option<HdlcAddress>,
        server_address: Option<HdlcAddress>,
        parameters: HdlcParameters,
    ) -> Self {
        Self {
            transport,
            role,
            client_address,
            server_address,
            local_parameters: parameters,
            parameters: HdlcParameters::default(),
            send_sequence: 0,
            receive_sequence: 0,
            state: HdlcConnectionState::Closed,
            buffer: BytesMut::with_capacity(MAX_FRAME_LENGTH + 2),
        }
    }

    pub fn role(&self) -> HdlcRole {
        self.role
    }

    /// Negotiated parameters, from this side's point of view
    pub fn parameters(&self) -> &HdlcParameters {
        &self.parameters
    }

    pub fn state(&self) -> HdlcConnectionState {
        self.state
    }

    pub fn client_address(&self) -> Option<HdlcAddress> {
        self.client_address
    }

    pub fn server_address(&self) -> Option<HdlcAddress> {
        self.server_address
    }

    pub fn is_closed(&self) -> bool {
        self.state == HdlcConnectionState::Closed || self.transport.is_closed()
    }

    pub fn transition_to(&mut self, new_state: HdlcConnectionState) -> DlmsResult<()> {
        self.state.validate_transition(new_state)?;
        self.state = new_state;
        Ok(())
    }

    /// Addresses of a frame we send: source is us, destination the peer.
    fn outgoing_pair(&self) -> DlmsResult<HdlcAddressPair> {
        let (client, server) = self
            .client_address
            .zip(self.server_address)
            .ok_or_else(|| DlmsError::Protocol("HDLC addresses not yet known".to_string()))?;
        Ok(match self.role {
            HdlcRole::Client => HdlcAddressPair::new(client, server),
            HdlcRole::Server => HdlcAddressPair::new(server, client),
        })
    }

    fn is_addressed_to_us(&self, frame: &HdlcFrame) -> bool {
        match self.outgoing_pair() {
            Ok(pair) => frame.address_pair() == pair.reversed(),
            Err(_) => true,
        }
    }

    fn ensure_ready(&self) -> DlmsResult<()> {
        if self.state.is_ready() {
            Ok(())
        } else {
            Err(DlmsError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                format!("HDLC connection is not ready: {}", self.state.as_str()),
            )))
        }
    }

    async fn send_frame(&mut self, frame: HdlcFrame) -> DlmsResult<()> {
        log::trace!("HDLC send {}", frame);
        let encoded = frame.encode()?;
        self.transport.write_all(&encoded).await?;
        self.transport.flush().await
    }

    async fn send_unnumbered(&mut self, pair: HdlcAddressPair, frame_type: FrameType, info: Vec<u8>) -> DlmsResult<()> {
        self.send_frame(HdlcFrame::new(pair, frame_type, info)).await
    }

    /// Take one complete frame out of the receive buffer, if there is one.
    fn next_buffered_frame(&mut self) -> DlmsResult<Option<HdlcFrame>> {
        match self.buffer.iter().position(|b| *b == FLAG) {
            Some(start) => self.buffer.advance(start),
            None => {
                self.buffer.clear();
                return Ok(None);
            }
        }
        // A closing flag may double as the next opening flag
        while self.buffer.len() >= 2 && self.buffer[1] == FLAG {
            self.buffer.advance(1);
        }
        if self.buffer.len() < 3 {
            return Ok(None);
        }
        let length = (u16::from_be_bytes([self.buffer[1], self.buffer[2]]) as usize) & MAX_FRAME_LENGTH;
        if self.buffer.len() < length + 2 {
            return Ok(None);
        }
        if self.buffer[length + 1] != FLAG {
            self.buffer.advance(1);
            return Err(DlmsError::FrameInvalid("Missing closing HDLC flag".to_string()));
        }
        let frame = HdlcFrame::decode(&self.buffer[1..length + 1]);
        self.buffer.advance(length + 1);
        frame.map(Some)
    }

    /// Read the next frame from the stream.
    ///
    /// # Errors
    /// `FrameInvalid` on a check sequence or format error, a `Connection`
    /// error when the stream ends and `Timeout` when the transport times out.
    pub async fn read_frame(&mut self) -> DlmsResult<HdlcFrame> {
        loop {
            if let Some(frame) = self.next_buffered_frame()? {
                log::trace!("HDLC recv {}", frame);
                return Ok(frame);
            }
            if self.transport.read_buf(&mut self.buffer).await? == 0 {
                return Err(DlmsError::unexpected_eof("HDLC stream ended"));
            }
        }
    }

    /// Answer a DISC with UA and close.
    async fn handle_disconnect(&mut self, frame: &HdlcFrame) -> DlmsError {
        log::info!("HDLC disconnect from {}", frame.address_pair().source());
        let reply = frame.address_pair().reversed();
        let response = if self.state.is_ready() {
            FrameType::UnnumberedAcknowledge
        } else {
            FrameType::DisconnectMode
        };
        if let Err(e) = self.send_unnumbered(reply, response, Vec::new()).await {
            log::debug!("Could not acknowledge DISC: {}", e);
        }
        self.state = HdlcConnectionState::Closed;
        if let Err(e) = self.transport.close().await {
            log::debug!("Error closing transport after DISC: {}", e);
        }
        DlmsError::CleanShutdown
    }

    /// Answer an SNRM with the negotiated parameters in a UA.
    async fn answer_snrm(&mut self, frame: &HdlcFrame) -> DlmsResult<()> {
        let pair = frame.address_pair();
        self.client_address = Some(pair.source());
        self.server_address = Some(pair.destination());

        let proposal = match HdlcParameters::decode(frame.information_field()) {
            Ok(proposal) => proposal,
            Err(e) => {
                log::warn!("Rejecting SNRM from {}: {}", pair.source(), e);
                if let Err(send_error) = self.send_unnumbered(pair.reversed(), FrameType::DisconnectMode, Vec::new()).await {
                    log::debug!("Could not send DM: {}", send_error);
                }
                self.state = HdlcConnectionState::Closed;
                return Err(e);
            }
        };
        self.parameters = self.local_parameters.negotiate(&proposal);
        self.send_sequence = 0;
        self.receive_sequence = 0;
        self.buffer.clear();

        self.send_unnumbered(pair.reversed(), FrameType::UnnumberedAcknowledge, self.parameters.encode())
            .await?;
        self.transition_to(HdlcConnectionState::Connected)?;
        log::debug!(
            "HDLC link {} <-> {} negotiated {:?}",
            pair.source(),
            pair.destination(),
            self.parameters
        );
        Ok(())
    }

    /// Wait for the client's SNRM and answer it (server side).
    pub async fn accept(&mut self) -> DlmsResult<()> {
        self.transition_to(HdlcConnectionState::Connecting)?;
        loop {
            let frame = self.read_frame().await?;
            match frame.frame_type() {
                FrameType::SetNormalResponseMode => return self.answer_snrm(&frame).await,
                FrameType::Disconnect => return Err(self.handle_disconnect(&frame).await),
                other => {
                    log::debug!("Ignoring {:?} before SNRM", other);
                    self.send_unnumbered(frame.address_pair().reversed(), FrameType::DisconnectMode, Vec::new())
                        .await?;
                }
            }
        }
    }

    /// Send SNRM and wait for the UA (client side).
    pub async fn open(&mut self) -> DlmsResult<()> {
        self.transition_to(HdlcConnectionState::Connecting)?;
        let pair = self.outgoing_pair()?;
        self.send_unnumbered(pair, FrameType::SetNormalResponseMode, self.local_parameters.encode())
            .await?;
        loop {
            let frame = self.read_frame().await?;
            if !self.is_addressed_to_us(&frame) {
                continue;
            }
            match frame.frame_type() {
                FrameType::UnnumberedAcknowledge => {
                    let accepted = HdlcParameters::decode(frame.information_field())?;
                    self.parameters = self.local_parameters.negotiate(&accepted);
                    self.send_sequence = 0;
                    self.receive_sequence = 0;
                    self.transition_to(HdlcConnectionState::Connected)?;
                    log::debug!("HDLC link to {} negotiated {:?}", pair.destination(), self.parameters);
                    return Ok(());
                }
                FrameType::DisconnectMode => {
                    self.state = HdlcConnectionState::Closed;
                    return Err(DlmsError::Protocol("Server refused HDLC connection (DM)".to_string()));
                }
                other => log::debug!("Ignoring {:?} while waiting for UA", other),
            }
        }
    }

    fn llc_header(&self) -> &'static [u8; 3] {
        match self.role {
            HdlcRole::Client => &LLC_REQUEST,
            HdlcRole::Server => &LLC_RESPONSE,
        }
    }

    /// Send one APDU, segmenting it to the negotiated information length.
    pub async fn send(&mut self, apdu: &[u8]) -> DlmsResult<()> {
        self.ensure_ready()?;
        let pair = self.outgoing_pair()?;
        let mut payload = Vec::with_capacity(apdu.len() + 3);
        payload.extend_from_slice(self.llc_header());
        payload.extend_from_slice(apdu);

        let max_information = usize::from(self.parameters.max_information_field_length_tx.max(1));
        let segments = payload.len().div_ceil(max_information);
        for (index, segment) in payload.chunks(max_information).enumerate() {
            let last = index + 1 == segments;
            let frame = HdlcFrame::new_information(
                pair,
                segment.to_vec(),
                self.send_sequence,
                self.receive_sequence,
                !last,
            );
            self.send_frame(frame).await?;
            self.send_sequence = (self.send_sequence + 1) % 8;
            if !last {
                self.wait_for_receive_ready().await?;
            }
        }
        Ok(())
    }

    async fn wait_for_receive_ready(&mut self) -> DlmsResult<()> {
        loop {
            let frame = self.read_frame().await?;
            if !self.is_addressed_to_us(&frame) {
                continue;
            }
            match frame.frame_type() {
                FrameType::ReceiveReady => {
                    if frame.receive_sequence() != self.send_sequence {
                        log::warn!(
                            "RR acknowledges N(R)={}, expected {}",
                            frame.receive_sequence(),
                            self.send_sequence
                        );
                    }
                    return Ok(());
                }
                FrameType::Disconnect => return Err(self.handle_disconnect(&frame).await),
                other => {
                    return Err(DlmsError::FrameInvalid(format!(
                        "Expected RR between segments, received {:?}",
                        other
                    )));
                }
            }
        }
    }

    /// Receive one APDU, reassembling segments and acknowledging each with RR.
    ///
    /// # Errors
    /// `CleanShutdown` when the peer sends DISC.
    pub async fn receive(&mut self) -> DlmsResult<Vec<u8>> {
        self.ensure_ready()?;
        let mut message = Vec::new();
        loop {
            let frame = self.read_frame().await?;
            if !self.is_addressed_to_us(&frame) {
                log::debug!("Ignoring frame for {}", frame.address_pair().destination());
                continue;
            }
            match frame.frame_type() {
                FrameType::Information => {
                    if frame.send_sequence() != self.receive_sequence {
                        log::warn!(
                            "HDLC N(S)={} out of sequence, expected {}",
                            frame.send_sequence(),
                            self.receive_sequence
                        );
                    }
                    self.receive_sequence = (frame.send_sequence() + 1) % 8;
                    let segmented = frame.is_segmented();
                    message.extend_from_slice(frame.information_field());
                    if !segmented {
                        break;
                    }
                    let rr = HdlcFrame::new_receive_ready(self.outgoing_pair()?, self.receive_sequence);
                    self.send_frame(rr).await?;
                }
                FrameType::Disconnect => return Err(self.handle_disconnect(&frame).await),
                FrameType::SetNormalResponseMode if self.role == HdlcRole::Server => {
                    log::debug!("SNRM on an open link, renegotiating");
                    message.clear();
                    self.transition_to(HdlcConnectionState::Connecting)?;
                    self.answer_snrm(&frame).await?;
                }
                other => log::debug!("Ignoring {:?} while waiting for data", other),
            }
        }

        if message.starts_with(&LLC_REQUEST) || message.starts_with(&LLC_RESPONSE) {
            message.drain(..LLC_REQUEST.len());
            Ok(message)
        } else {
            Err(DlmsError::FrameInvalid("Information field lacks the LLC header".to_string()))
        }
    }

    /// Close the link; a client sends DISC first and waits for UA or DM.
    pub async fn close(&mut self) -> DlmsResult<()> {
        if !self.state.can_close() {
            return self.transport.close().await;
        }
        if self.role == HdlcRole::Client && self.state.is_ready() {
            self.transition_to(HdlcConnectionState::Closing)?;
            if let Ok(pair) = self.outgoing_pair() {
                match self.send_unnumbered(pair, FrameType::Disconnect, Vec::new()).await {
                    Ok(()) => match self.read_frame().await {
                        Ok(frame) => log::debug!("DISC answered with {:?}", frame.frame_type()),
                        Err(e) => log::debug!("No answer to DISC: {}", e),
                    },
                    Err(e) => log::debug!("Could not send DISC: {}", e),
                }
            }
        }
        self.state = HdlcConnectionState::Closed;
        self.transport.close().await
    }
}
