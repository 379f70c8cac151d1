//! KNXnet/IP device management transport.
//!
//! Device management shares the tunneling lifecycle (connect, sequence
//! counters, per-frame ACK, heartbeat, disconnect) but its data frames
//! ride DEVICE_CONFIGURATION_REQUEST / DEVICE_CONFIGURATION_ACK and carry
//! cEMI property services: M_PropRead and M_PropWrite against the
//! interface objects of the KNXnet/IP device itself.
//!
//! Property operations are serialised - one in flight - and confirmations
//! are correlated explicitly on `{object, instance, property, start
//! index}`, never on arrival order.

use crate::connection::{ConnEvent, ConnectionConfig, ConnectionCore};
use crate::error::{KnxError, Result};
use crate::net::{AsyncTransport, UdpTransport};
use crate::protocol::cemi::CemiFrame;
use crate::protocol::constants::{MessageCode, ServiceType};
use crate::protocol::property::PropertyFrame;
use crate::protocol::services::Cri;
use log::debug;
use std::net::SocketAddrV4;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// Device management transport configuration.
#[derive(Debug, Clone, Copy)]
pub struct ManagementConfig {
    /// Wait budget for the connect response, per-frame ACKs and heartbeat
    /// responses.
    pub connect_timeout: Duration,
    /// Interval between client heartbeats.
    pub heartbeat_interval: Duration,
    /// Wait budget for a property confirmation.
    pub response_timeout: Duration,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(60),
            response_timeout: Duration::from_secs(5),
        }
    }
}

/// A device management connection to one KNXnet/IP interface.
pub struct ManagementInterface<T: AsyncTransport> {
    core: ConnectionCore<T>,
    response_timeout: Duration,
}

impl<T: AsyncTransport> ManagementInterface<T> {
    /// Create a management connection towards `server` over an
    /// already-bound transport.
    pub fn new(transport: T, server: SocketAddrV4, config: ManagementConfig) -> Self {
        let core = ConnectionCore::new(
            transport,
            server,
            Cri::DeviceManagement,
            ServiceType::DeviceConfigurationRequest,
            ServiceType::DeviceConfigurationAck,
            ConnectionConfig {
                connect_timeout: config.connect_timeout,
                heartbeat_interval: config.heartbeat_interval,
                ..ConnectionConfig::default()
            },
        );
        Self {
            core,
            response_timeout: config.response_timeout,
        }
    }

    /// Channel id assigned by the server, 0 while closed.
    pub fn channel_id(&self) -> u8 {
        self.core.channel_id()
    }

    /// True while the connection is open.
    pub fn is_open(&self) -> bool {
        self.core.is_open()
    }

    /// Establish the connection. Idempotent.
    pub async fn open(&mut self) -> Result<()> {
        self.core.open().await
    }

    /// Close the connection. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        self.core.close().await
    }

    /// Read `elements` values of a property starting at `start_index`.
    ///
    /// Resolves with the data bytes of the correlating M_PropRead.con, or
    /// [`KnxError::PropertyError`] when the confirmation reports an error,
    /// or [`KnxError::ConnectionTimeout`] when none arrives in time.
    pub async fn read_property(
        &mut self,
        object_type: u16,
        object_instance: u8,
        property_id: u8,
        elements: u8,
        start_index: u16,
    ) -> Result<Vec<u8>> {
        let request =
            PropertyFrame::new(object_type, object_instance, property_id, elements, start_index);
        let frame = CemiFrame::property_frame(MessageCode::MPropReadReq, request.clone());
        self.core.send_data(&frame.to_bytes()).await?;
        self.await_confirmation(&request, MessageCode::MPropReadCon)
            .await
    }

    /// Write property data, resolving on a matching M_PropWrite.con with a
    /// non-error return.
    pub async fn write_property(
        &mut self,
        object_type: u16,
        object_instance: u8,
        property_id: u8,
        elements: u8,
        start_index: u16,
        data: Vec<u8>,
    ) -> Result<()> {
        let request =
            PropertyFrame::new(object_type, object_instance, property_id, elements, start_index)
                .with_data(data);
        let frame = CemiFrame::property_frame(MessageCode::MPropWriteReq, request.clone());
        self.core.send_data(&frame.to_bytes()).await?;
        self.await_confirmation(&request, MessageCode::MPropWriteCon)
            .await
            .map(|_| ())
    }

    /// Wait for the confirmation matching `request`, dropping unrelated
    /// traffic.
    async fn await_confirmation(
        &mut self,
        request: &PropertyFrame,
        confirmation: MessageCode,
    ) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.response_timeout;
        loop {
            let event = match timeout_at(deadline, self.core.recv_event()).await {
                Err(_) => return Err(KnxError::ConnectionTimeout),
                Ok(event) => event?,
            };
            let bytes = match event {
                ConnEvent::Cemi(bytes) => bytes,
                ConnEvent::Malformed(e) => {
                    debug!("management: dropping malformed datagram: {e}");
                    continue;
                }
            };
            let frame = match CemiFrame::parse(&bytes) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("management: dropping invalid cEMI frame: {e}");
                    continue;
                }
            };
            if frame.message_code != confirmation {
                debug!("management: ignoring {} frame", frame.message_code);
                continue;
            }
            let Some(property) = frame.property() else {
                continue;
            };
            if !request.matches(property) {
                debug!("management: confirmation for a different property, ignoring");
                continue;
            }
            if property.is_error() {
                return Err(KnxError::PropertyError(property.error_code()));
            }
            return Ok(property.data.clone());
        }
    }
}

impl ManagementInterface<UdpTransport> {
    /// Create a management connection over a fresh ephemeral UDP socket.
    pub async fn udp(server: SocketAddrV4, config: ManagementConfig) -> Result<Self> {
        let transport = UdpTransport::bind(0).await?;
        Ok(Self::new(transport, server, config))
    }
}
