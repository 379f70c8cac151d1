//! KNXnet/IP service frame builders and parsers.
//!
//! Connection-oriented services (CONNECT, CONNECTIONSTATE, DISCONNECT and
//! the data/ack pair) are shared by tunneling and device management; the
//! two differ only in the CRI they connect with and the service type their
//! data frames ride on. All builders write into caller buffers.
//!
//! ```text
//! Client                          Server
//!   |------- CONNECT_REQUEST ------->|
//!   |<------ CONNECT_RESPONSE -------|
//!   |                                |
//!   |-------- data request --------->|   TUNNELLING_REQUEST or
//!   |<---------- data ack -----------|   DEVICE_CONFIGURATION_REQUEST
//!   |                                |
//!   |--- CONNECTIONSTATE_REQUEST --->|   every heartbeat interval
//!   |<-- CONNECTIONSTATE_RESPONSE ---|
//!   |                                |
//!   |------ DISCONNECT_REQUEST ----->|
//!   |<----- DISCONNECT_RESPONSE -----|
//! ```

use crate::error::{KnxError, Result};
use crate::protocol::constants::{
    ServiceType, TunnelLayer, DEVICE_MGMT_CONNECTION, TUNNEL_CONNECTION,
};
use crate::protocol::frame::{FrameBuilder, Hpai, KnxnetIpHeader};

/// Connection Request Information.
///
/// Tunnel connections carry the requested KNX layer; device management
/// connections are a bare two-byte structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cri {
    /// Tunnel connection with the given layer.
    Tunnel {
        /// Requested KNX layer.
        layer: TunnelLayer,
    },
    /// Device management connection.
    DeviceManagement,
}

impl Cri {
    /// Encoded size.
    pub const fn encoded_len(&self) -> usize {
        match self {
            Cri::Tunnel { .. } => 4,
            Cri::DeviceManagement => 2,
        }
    }

    /// Encode the CRI into `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.encoded_len();
        if buf.len() < len {
            return Err(KnxError::BufferTooSmall);
        }
        match self {
            Cri::Tunnel { layer } => {
                buf[0] = 4;
                buf[1] = TUNNEL_CONNECTION;
                buf[2] = *layer as u8;
                buf[3] = 0x00;
            }
            Cri::DeviceManagement => {
                buf[0] = 2;
                buf[1] = DEVICE_MGMT_CONNECTION;
            }
        }
        Ok(len)
    }
}

/// `CONNECT_REQUEST` (0x0205).
#[derive(Debug, Clone, Copy)]
pub struct ConnectRequest {
    /// Control endpoint of the client.
    pub control_endpoint: Hpai,
    /// Data endpoint of the client.
    pub data_endpoint: Hpai,
    /// Connection request information.
    pub cri: Cri,
}

impl ConnectRequest {
    /// Create a connect request. NAT-mode HPAIs (`0.0.0.0:0`) let the
    /// server reply to the datagram source.
    pub const fn new(control_endpoint: Hpai, data_endpoint: Hpai, cri: Cri) -> Self {
        Self {
            control_endpoint,
            data_endpoint,
            cri,
        }
    }

    /// Build the complete frame into `buf`.
    pub fn build(&self, buf: &mut [u8]) -> Result<usize> {
        let total = KnxnetIpHeader::SIZE + 2 * Hpai::SIZE + self.cri.encoded_len();
        if buf.len() < total {
            return Err(KnxError::BufferTooSmall);
        }

        let mut offset =
            KnxnetIpHeader::new(ServiceType::ConnectRequest.to_u16(), (total - KnxnetIpHeader::SIZE) as u16)
                .encode(buf)?;
        offset += self.control_endpoint.encode(&mut buf[offset..])?;
        offset += self.data_endpoint.encode(&mut buf[offset..])?;
        offset += self.cri.encode(&mut buf[offset..])?;
        Ok(offset)
    }
}

/// `CONNECT_RESPONSE` (0x0206).
#[derive(Debug, Clone, Copy)]
pub struct ConnectResponse {
    /// Channel id assigned by the server.
    pub channel_id: u8,
    /// Status code, 0 on success.
    pub status: u8,
    /// Server data endpoint; absent on refused connections.
    pub data_endpoint: Option<Hpai>,
}

impl ConnectResponse {
    /// Parse from the frame body. A refused connection may carry only the
    /// channel/status pair.
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < 2 {
            return Err(KnxError::LengthMismatch);
        }
        let channel_id = body[0];
        let status = body[1];
        let data_endpoint = if status == 0 && body.len() >= 2 + Hpai::SIZE {
            Some(Hpai::parse(&body[2..2 + Hpai::SIZE])?)
        } else {
            None
        };
        Ok(Self {
            channel_id,
            status,
            data_endpoint,
        })
    }

    /// True when the server accepted the connection.
    pub const fn is_ok(&self) -> bool {
        self.status == 0
    }
}

/// `CONNECTIONSTATE_REQUEST` (0x0207) - the heartbeat.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionStateRequest {
    /// Channel id of the connection being probed.
    pub channel_id: u8,
    /// Control endpoint of the sender.
    pub control_endpoint: Hpai,
}

impl ConnectionStateRequest {
    /// Create a connection state request.
    pub const fn new(channel_id: u8, control_endpoint: Hpai) -> Self {
        Self {
            channel_id,
            control_endpoint,
        }
    }

    /// Build the complete frame into `buf`.
    pub fn build(&self, buf: &mut [u8]) -> Result<usize> {
        build_channel_frame(
            ServiceType::ConnectionstateRequest,
            self.channel_id,
            &self.control_endpoint,
            buf,
        )
    }

    /// Parse from the frame body (server-initiated heartbeat).
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < 2 + Hpai::SIZE {
            return Err(KnxError::LengthMismatch);
        }
        Ok(Self {
            channel_id: body[0],
            control_endpoint: Hpai::parse(&body[2..2 + Hpai::SIZE])?,
        })
    }
}

/// `CONNECTIONSTATE_RESPONSE` (0x0208).
#[derive(Debug, Clone, Copy)]
pub struct ConnectionStateResponse {
    /// Channel id.
    pub channel_id: u8,
    /// Status code, 0 when the connection is alive.
    pub status: u8,
}

impl ConnectionStateResponse {
    /// Create a connection state response.
    pub const fn new(channel_id: u8, status: u8) -> Self {
        Self { channel_id, status }
    }

    /// Parse from the frame body.
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < 2 {
            return Err(KnxError::LengthMismatch);
        }
        Ok(Self {
            channel_id: body[0],
            status: body[1],
        })
    }

    /// Build the complete frame into `buf`.
    pub fn build(&self, buf: &mut [u8]) -> Result<usize> {
        FrameBuilder::new(
            ServiceType::ConnectionstateResponse,
            &[self.channel_id, self.status],
        )
        .build(buf)
    }

    /// True when the connection is still alive.
    pub const fn is_ok(&self) -> bool {
        self.status == 0
    }
}

/// `DISCONNECT_REQUEST` (0x0209).
#[derive(Debug, Clone, Copy)]
pub struct DisconnectRequest {
    /// Channel id of the connection to close.
    pub channel_id: u8,
    /// Control endpoint of the sender.
    pub control_endpoint: Hpai,
}

impl DisconnectRequest {
    /// Create a disconnect request.
    pub const fn new(channel_id: u8, control_endpoint: Hpai) -> Self {
        Self {
            channel_id,
            control_endpoint,
        }
    }

    /// Build the complete frame into `buf`.
    pub fn build(&self, buf: &mut [u8]) -> Result<usize> {
        build_channel_frame(
            ServiceType::DisconnectRequest,
            self.channel_id,
            &self.control_endpoint,
            buf,
        )
    }

    /// Parse from the frame body (server-initiated disconnect).
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < 2 + Hpai::SIZE {
            return Err(KnxError::LengthMismatch);
        }
        Ok(Self {
            channel_id: body[0],
            control_endpoint: Hpai::parse(&body[2..2 + Hpai::SIZE])?,
        })
    }
}

/// `DISCONNECT_RESPONSE` (0x020A).
#[derive(Debug, Clone, Copy)]
pub struct DisconnectResponse {
    /// Channel id.
    pub channel_id: u8,
    /// Status code.
    pub status: u8,
}

impl DisconnectResponse {
    /// Create a disconnect response.
    pub const fn new(channel_id: u8, status: u8) -> Self {
        Self { channel_id, status }
    }

    /// Parse from the frame body.
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < 2 {
            return Err(KnxError::LengthMismatch);
        }
        Ok(Self {
            channel_id: body[0],
            status: body[1],
        })
    }

    /// Build the complete frame into `buf`.
    pub fn build(&self, buf: &mut [u8]) -> Result<usize> {
        FrameBuilder::new(
            ServiceType::DisconnectResponse,
            &[self.channel_id, self.status],
        )
        .build(buf)
    }
}

/// Channel id + control HPAI body shared by CONNECTIONSTATE_REQUEST and
/// DISCONNECT_REQUEST.
fn build_channel_frame(
    service: ServiceType,
    channel_id: u8,
    control_endpoint: &Hpai,
    buf: &mut [u8],
) -> Result<usize> {
    let mut body = [0u8; 2 + Hpai::SIZE];
    body[0] = channel_id;
    body[1] = 0x00;
    control_endpoint.encode(&mut body[2..])?;
    FrameBuilder::new(service, &body).build(buf)
}

/// Connection header of data frames and acks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHeader {
    /// Channel id.
    pub channel_id: u8,
    /// Sequence counter (mod 256).
    pub sequence: u8,
}

impl ConnectionHeader {
    /// Encoded size.
    pub const SIZE: usize = 4;

    /// Create a connection header.
    pub const fn new(channel_id: u8, sequence: u8) -> Self {
        Self {
            channel_id,
            sequence,
        }
    }

    /// Encode into `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < Self::SIZE {
            return Err(KnxError::BufferTooSmall);
        }
        buf[0] = Self::SIZE as u8;
        buf[1] = self.channel_id;
        buf[2] = self.sequence;
        buf[3] = 0x00;
        Ok(Self::SIZE)
    }

    /// Decode from `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(KnxError::BufferTooSmall);
        }
        Ok(Self {
            channel_id: buf[1],
            sequence: buf[2],
        })
    }
}

/// A cEMI-carrying data frame: TUNNELLING_REQUEST or
/// DEVICE_CONFIGURATION_REQUEST, selected by `service`.
#[derive(Debug)]
pub struct DataRequest<'a> {
    /// Carrying service type.
    pub service: ServiceType,
    /// Connection header.
    pub header: ConnectionHeader,
    /// cEMI frame bytes.
    pub cemi: &'a [u8],
}

impl<'a> DataRequest<'a> {
    /// Create a data frame.
    pub const fn new(service: ServiceType, header: ConnectionHeader, cemi: &'a [u8]) -> Self {
        Self {
            service,
            header,
            cemi,
        }
    }

    /// Build the complete frame into `buf`.
    pub fn build(&self, buf: &mut [u8]) -> Result<usize> {
        let total = KnxnetIpHeader::SIZE + ConnectionHeader::SIZE + self.cemi.len();
        if buf.len() < total {
            return Err(KnxError::BufferTooSmall);
        }
        let mut offset = KnxnetIpHeader::new(
            self.service.to_u16(),
            (ConnectionHeader::SIZE + self.cemi.len()) as u16,
        )
        .encode(buf)?;
        offset += self.header.encode(&mut buf[offset..])?;
        buf[offset..offset + self.cemi.len()].copy_from_slice(self.cemi);
        Ok(offset + self.cemi.len())
    }

    /// Parse from the frame body.
    pub fn parse(service: ServiceType, body: &'a [u8]) -> Result<Self> {
        if body.len() < ConnectionHeader::SIZE {
            return Err(KnxError::LengthMismatch);
        }
        Ok(Self {
            service,
            header: ConnectionHeader::decode(body)?,
            cemi: &body[ConnectionHeader::SIZE..],
        })
    }
}

/// The acknowledgement of a data frame: TUNNELLING_ACK or
/// DEVICE_CONFIGURATION_ACK.
#[derive(Debug, Clone, Copy)]
pub struct DataAck {
    /// Carrying service type.
    pub service: ServiceType,
    /// Connection header echoing the acknowledged sequence.
    pub header: ConnectionHeader,
    /// Status code, 0 on success.
    pub status: u8,
}

impl DataAck {
    /// Create an ack.
    pub const fn new(service: ServiceType, header: ConnectionHeader, status: u8) -> Self {
        Self {
            service,
            header,
            status,
        }
    }

    /// Build the complete frame into `buf`.
    pub fn build(&self, buf: &mut [u8]) -> Result<usize> {
        let mut body = [0u8; ConnectionHeader::SIZE + 1];
        self.header.encode(&mut body)?;
        body[ConnectionHeader::SIZE] = self.status;
        FrameBuilder::new(self.service, &body).build(buf)
    }

    /// Parse from the frame body.
    pub fn parse(service: ServiceType, body: &[u8]) -> Result<Self> {
        if body.len() < ConnectionHeader::SIZE + 1 {
            return Err(KnxError::LengthMismatch);
        }
        Ok(Self {
            service,
            header: ConnectionHeader::decode(body)?,
            status: body[ConnectionHeader::SIZE],
        })
    }

    /// True when the peer accepted the frame.
    pub const fn is_ok(&self) -> bool {
        self.status == 0
    }
}

/// `ROUTING_LOST_MESSAGE` (0x0531).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingLostMessage {
    /// Router device state.
    pub device_state: u8,
    /// Number of frames the router dropped.
    pub lost_count: u16,
}

impl RoutingLostMessage {
    /// Parse from the frame body (`{4, deviceState, lost:u16}`).
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < 4 {
            return Err(KnxError::LengthMismatch);
        }
        Ok(Self {
            device_state: body[1],
            lost_count: u16::from_be_bytes([body[2], body[3]]),
        })
    }

    /// Build the complete frame into `buf`.
    pub fn build(&self, buf: &mut [u8]) -> Result<usize> {
        let mut body = [4u8, self.device_state, 0, 0];
        body[2..4].copy_from_slice(&self.lost_count.to_be_bytes());
        FrameBuilder::new(ServiceType::RoutingLostMessage, &body).build(buf)
    }
}

/// `ROUTING_BUSY` (0x0532).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingBusy {
    /// Router device state.
    pub device_state: u8,
    /// Requested pause before the next multicast send, in milliseconds.
    pub wait_time: u16,
    /// Busy control field.
    pub control: u16,
}

impl RoutingBusy {
    /// Parse from the frame body (`{6, deviceState, wait:u16, control:u16}`).
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < 6 {
            return Err(KnxError::LengthMismatch);
        }
        Ok(Self {
            device_state: body[1],
            wait_time: u16::from_be_bytes([body[2], body[3]]),
            control: u16::from_be_bytes([body[4], body[5]]),
        })
    }

    /// Build the complete frame into `buf`.
    pub fn build(&self, buf: &mut [u8]) -> Result<usize> {
        let mut body = [6u8, self.device_state, 0, 0, 0, 0];
        body[2..4].copy_from_slice(&self.wait_time.to_be_bytes());
        body[4..6].copy_from_slice(&self.control.to_be_bytes());
        FrameBuilder::new(ServiceType::RoutingBusy, &body).build(buf)
    }
}

/// `SEARCH_REQUEST` (0x0201).
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest {
    /// Endpoint the responses should be sent to.
    pub discovery_endpoint: Hpai,
}

impl SearchRequest {
    /// Create a search request.
    pub const fn new(discovery_endpoint: Hpai) -> Self {
        Self { discovery_endpoint }
    }

    /// Build the complete frame into `buf`.
    pub fn build(&self, buf: &mut [u8]) -> Result<usize> {
        let mut body = [0u8; Hpai::SIZE];
        self.discovery_endpoint.encode(&mut body)?;
        FrameBuilder::new(ServiceType::SearchRequest, &body).build(buf)
    }
}
