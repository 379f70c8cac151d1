//! KNXnet/IP tunneling transport (link layer and busmonitor).
//!
//! A tunnel is a connection-oriented unicast link to one KNXnet/IP
//! interface: every cEMI frame rides a TUNNELLING_REQUEST with a sequence
//! counter and is confirmed by a TUNNELLING_ACK, and a CONNECTIONSTATE
//! heartbeat keeps the connection alive. The busmonitor layer replaces
//! the link layer with a receive-only feed of raw bus traffic; sending is
//! rejected there.
//!
//! The lifecycle and sequence rules live in [`crate::connection`]; this
//! module binds them to the tunneling service pair and the cEMI codec.

use crate::bus::{BusEvent, BusInterface};
use crate::connection::{ConnEvent, ConnectionConfig, ConnectionCore};
use crate::error::{KnxError, Result};
use crate::net::{AsyncTransport, UdpTransport};
use crate::protocol::cemi::CemiFrame;
use crate::protocol::constants::{ServiceType, TunnelLayer};
use crate::protocol::services::Cri;
use std::net::SocketAddrV4;
use std::time::Duration;

/// Tunneling transport configuration.
#[derive(Debug, Clone, Copy)]
pub struct TunnelConfig {
    /// Requested KNX layer.
    pub layer: TunnelLayer,
    /// Wait budget for the connect response, per-frame ACKs and heartbeat
    /// responses.
    pub connect_timeout: Duration,
    /// Interval between client heartbeats.
    pub heartbeat_interval: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            layer: TunnelLayer::LinkLayer,
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(60),
        }
    }
}

impl TunnelConfig {
    /// Link-layer tunnel with default timeouts.
    pub fn link_layer() -> Self {
        Self::default()
    }

    /// Busmonitor tunnel with default timeouts.
    pub fn busmonitor() -> Self {
        Self {
            layer: TunnelLayer::Busmonitor,
            ..Self::default()
        }
    }
}

/// A tunneling bus interface over one datagram transport.
pub struct TunnelInterface<T: AsyncTransport> {
    core: ConnectionCore<T>,
    layer: TunnelLayer,
}

impl<T: AsyncTransport> TunnelInterface<T> {
    /// Create a tunnel towards `server` over an already-bound transport.
    pub fn new(transport: T, server: SocketAddrV4, config: TunnelConfig) -> Self {
        let core = ConnectionCore::new(
            transport,
            server,
            Cri::Tunnel {
                layer: config.layer,
            },
            ServiceType::TunnellingRequest,
            ServiceType::TunnellingAck,
            ConnectionConfig {
                connect_timeout: config.connect_timeout,
                heartbeat_interval: config.heartbeat_interval,
                ..ConnectionConfig::default()
            },
        );
        Self {
            core,
            layer: config.layer,
        }
    }

    /// Channel id assigned by the server, 0 while closed.
    pub fn channel_id(&self) -> u8 {
        self.core.channel_id()
    }

    /// The server data endpoint in use (after the NAT rewrite).
    pub fn data_endpoint(&self) -> SocketAddrV4 {
        self.core.data_endpoint()
    }

    /// True while the tunnel is open.
    pub fn is_open(&self) -> bool {
        self.core.is_open()
    }
}

impl TunnelInterface<UdpTransport> {
    /// Create a tunnel towards `server` over a fresh ephemeral UDP socket.
    pub async fn udp(server: SocketAddrV4, config: TunnelConfig) -> Result<Self> {
        let transport = UdpTransport::bind(0).await?;
        Ok(Self::new(transport, server, config))
    }
}

impl<T: AsyncTransport> BusInterface for TunnelInterface<T> {
    async fn open(&mut self) -> Result<()> {
        self.core.open().await
    }

    async fn close(&mut self) -> Result<()> {
        self.core.close().await
    }

    async fn send(&mut self, frame: &CemiFrame) -> Result<()> {
        if self.layer == TunnelLayer::Busmonitor {
            return Err(KnxError::InvalidMode);
        }
        self.core.send_data(&frame.to_bytes()).await
    }

    async fn recv(&mut self) -> Result<BusEvent> {
        match self.core.recv_event().await? {
            ConnEvent::Cemi(bytes) => match CemiFrame::parse(&bytes) {
                Ok(frame) => Ok(BusEvent::Frame(frame)),
                Err(e) => Ok(BusEvent::Error(e)),
            },
            ConnEvent::Malformed(e) => Ok(BusEvent::Error(e)),
        }
    }
}
