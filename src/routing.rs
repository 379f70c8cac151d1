//! KNXnet/IP routing transport (stateless multicast).
//!
//! Routing pushes every bus frame to the multicast group; there is no
//! connection, no sequence counter and no ACK. The receive path filters
//! frames whose hop count reached zero (the "don't route" rule) and
//! surfaces the two router notifications: ROUTING_LOST_MESSAGE and
//! ROUTING_BUSY. A busy counter tracks how many busy frames arrived
//! within the busy window; consumers derate their send rate from it.

use crate::bus::{BusEvent, BusInterface};
use crate::error::{KnxError, Result};
use crate::net::{AsyncTransport, UdpTransport};
use crate::protocol::cemi::CemiFrame;
use crate::protocol::constants::{
    MessageCode, ServiceType, KNXNETIP_DEFAULT_PORT, KNXNETIP_MULTICAST_ADDR, MAX_FRAME_SIZE,
    ROUTING_DEFAULT_TTL,
};
use crate::protocol::frame::{FrameBuilder, KnxnetIpFrame};
use crate::protocol::services::{RoutingBusy, RoutingLostMessage};
use log::debug;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tokio::time::Instant;

/// Routing transport configuration.
#[derive(Debug, Clone, Copy)]
pub struct RoutingConfig {
    /// Multicast group, 224.0.23.12 by default.
    pub group: Ipv4Addr,
    /// UDP port, 3671 by default.
    pub port: u16,
    /// Multicast TTL.
    pub ttl: u32,
    /// Window after the last ROUTING_BUSY before the busy counter resets.
    pub busy_window: Duration,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            group: KNXNETIP_MULTICAST_ADDR,
            port: KNXNETIP_DEFAULT_PORT,
            ttl: ROUTING_DEFAULT_TTL,
            busy_window: Duration::from_secs(5),
        }
    }
}

/// A routing bus interface over one multicast transport.
pub struct RoutingInterface<T: AsyncTransport> {
    transport: T,
    config: RoutingConfig,
    open: bool,
    busy_count: u32,
    last_busy: Option<Instant>,
}

impl<T: AsyncTransport> RoutingInterface<T> {
    /// Create a routing interface over an already-joined transport.
    pub fn new(transport: T, config: RoutingConfig) -> Self {
        Self {
            transport,
            config,
            open: false,
            busy_count: 0,
            last_busy: None,
        }
    }

    /// Busy frames seen within the current busy window.
    pub fn busy_count(&self) -> u32 {
        self.busy_count
    }

    fn group_endpoint(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.config.group, self.config.port)
    }

    fn note_busy(&mut self) -> u32 {
        let now = Instant::now();
        // No busy frame within the window: the congestion episode is over.
        if self
            .last_busy
            .is_none_or(|last| now.duration_since(last) > self.config.busy_window)
        {
            self.busy_count = 0;
        }
        self.busy_count += 1;
        self.last_busy = Some(now);
        self.busy_count
    }
}

impl RoutingInterface<UdpTransport> {
    /// Create a routing interface on a fresh multicast socket
    /// (`SO_REUSEADDR`, group join, TTL per the configuration).
    pub fn udp(config: RoutingConfig) -> Result<Self> {
        let transport = UdpTransport::multicast(config.group, config.port, config.ttl)?;
        Ok(Self::new(transport, config))
    }
}

impl<T: AsyncTransport> BusInterface for RoutingInterface<T> {
    async fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        self.busy_count = 0;
        self.last_busy = None;
        self.transport.close();
        Ok(())
    }

    /// Multicast one cEMI frame. Fire-and-forget: no ACK, no retry.
    async fn send(&mut self, frame: &CemiFrame) -> Result<()> {
        if !self.open {
            return Err(KnxError::NotConnected);
        }
        // Routers do not propagate monitor frames.
        if frame.message_code == MessageCode::LBusmonInd {
            return Err(KnxError::InvalidMode);
        }

        let cemi = frame.to_bytes();
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let len = FrameBuilder::new(ServiceType::RoutingIndication, &cemi).build(&mut buf)?;
        self.transport.send_to(&buf[..len], self.group_endpoint()).await
    }

    async fn recv(&mut self) -> Result<BusEvent> {
        loop {
            if !self.open {
                return Err(KnxError::NotConnected);
            }
            let mut rx = [0u8; MAX_FRAME_SIZE];
            let (len, _from) = self.transport.recv_from(&mut rx).await?;

            let frame = match KnxnetIpFrame::parse(&rx[..len]) {
                Ok(frame) => frame,
                Err(e) => return Ok(BusEvent::Error(e)),
            };

            match frame.service() {
                Some(ServiceType::RoutingIndication) => {
                    let cemi = match CemiFrame::parse(frame.body()) {
                        Ok(cemi) => cemi,
                        Err(e) => return Ok(BusEvent::Error(e)),
                    };
                    if let Some(ldata) = cemi.ldata() {
                        if ldata.hop_count() == 0 {
                            debug!("dropping routed frame with exhausted hop count");
                            continue;
                        }
                    }
                    return Ok(BusEvent::Frame(cemi));
                }
                Some(ServiceType::RoutingLostMessage) => {
                    match RoutingLostMessage::parse(frame.body()) {
                        Ok(lost) => {
                            return Ok(BusEvent::LostMessage {
                                device_state: lost.device_state,
                                lost: lost.lost_count,
                            })
                        }
                        Err(e) => return Ok(BusEvent::Error(e)),
                    }
                }
                Some(ServiceType::RoutingBusy) => match RoutingBusy::parse(frame.body()) {
                    Ok(busy) => {
                        let count = self.note_busy();
                        return Ok(BusEvent::Busy {
                            wait_time: busy.wait_time,
                            control: busy.control,
                            count,
                        });
                    }
                    Err(e) => return Ok(BusEvent::Error(e)),
                },
                Some(other) => {
                    debug!("routing: ignoring service {other:?}");
                }
                None => {
                    debug!(
                        "routing: dropping unknown service type 0x{:04X}",
                        frame.service_type_raw()
                    );
                }
            }
        }
    }
}
