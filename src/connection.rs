//! Connection-oriented KNXnet/IP endpoint core.
//!
//! Tunneling and device management share one lifecycle: CONNECT with a
//! CRI, data frames with a sequence-countered connection header and a
//! per-frame ACK, a CONNECTIONSTATE heartbeat, DISCONNECT. They differ
//! only in the CRI and in the service-type pair their data rides on, so
//! both transports wrap this core.
//!
//! ```text
//! Idle --open--> Connecting --CONNECT_RESPONSE(ok)--> Open
//! Open --send--> AwaitAck(seq) --ACK(ok,seq)--> Open
//! Open --heartbeat timeout--> Idle (lost)
//! Open --close--> Closing --> Idle
//! ```
//!
//! The core is single-task cooperative: `send_data` serialises requests
//! (one outstanding sequence number at a time), and inbound data frames
//! that arrive while a send awaits its ACK are acknowledged immediately
//! and queued for the next `recv_event`.

use crate::error::{KnxError, Result};
use crate::net::AsyncTransport;
use crate::protocol::constants::{ServiceType, E_NO_ERROR, MAX_FRAME_SIZE};
use crate::protocol::frame::{Hpai, KnxnetIpFrame};
use crate::protocol::services::{
    ConnectRequest, ConnectResponse, ConnectionHeader, ConnectionStateRequest,
    ConnectionStateResponse, Cri, DataAck, DataRequest, DisconnectRequest, DisconnectResponse,
};
use log::{debug, warn};
use std::collections::VecDeque;
use std::net::SocketAddrV4;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// Lifecycle state of a connection-oriented endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
}

/// What the core hands its wrapper per received datagram.
#[derive(Debug)]
pub(crate) enum ConnEvent {
    /// cEMI payload of an acknowledged, non-duplicate data frame.
    Cemi(Vec<u8>),
    /// A contained parse failure; surface it, drop the datagram.
    Malformed(KnxError),
}

/// Timeouts of a connection-oriented endpoint.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionConfig {
    /// Wait budget for CONNECT_RESPONSE, per-frame ACKs and heartbeat
    /// responses.
    pub connect_timeout: Duration,
    /// Interval between client heartbeats.
    pub heartbeat_interval: Duration,
    /// Wait budget for DISCONNECT_RESPONSE before the socket closes anyway.
    pub close_grace: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(60),
            close_grace: Duration::from_secs(1),
        }
    }
}

pub(crate) struct ConnectionCore<T: AsyncTransport> {
    transport: T,
    /// Server control endpoint (connect, heartbeat, disconnect).
    server: SocketAddrV4,
    /// Server data endpoint; rewritten from the CONNECT_RESPONSE.
    data_endpoint: SocketAddrV4,
    cri: Cri,
    data_service: ServiceType,
    ack_service: ServiceType,
    config: ConnectionConfig,
    state: ConnectionState,
    channel_id: u8,
    /// Outbound sequence counter, advanced only on an accepted ACK.
    tx_seq: u8,
    /// Sequence of the last frame delivered to the consumer; repeats are
    /// ACKed but not re-delivered.
    last_delivered: Option<u8>,
    /// Latest ACK seen for our channel (sequence, status).
    last_ack: Option<(u8, u8)>,
    /// Events collected while a send awaited its ACK.
    queued: VecDeque<ConnEvent>,
    /// Next client heartbeat.
    heartbeat_at: Instant,
    /// Response deadline of an in-flight heartbeat.
    heartbeat_deadline: Option<Instant>,
}

impl<T: AsyncTransport> ConnectionCore<T> {
    pub(crate) fn new(
        transport: T,
        server: SocketAddrV4,
        cri: Cri,
        data_service: ServiceType,
        ack_service: ServiceType,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            transport,
            server,
            data_endpoint: server,
            cri,
            data_service,
            ack_service,
            config,
            state: ConnectionState::Idle,
            channel_id: 0,
            tx_seq: 0,
            last_delivered: None,
            last_ack: None,
            queued: VecDeque::new(),
            heartbeat_at: Instant::now(),
            heartbeat_deadline: None,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub(crate) fn channel_id(&self) -> u8 {
        self.channel_id
    }

    pub(crate) fn data_endpoint(&self) -> SocketAddrV4 {
        self.data_endpoint
    }

    /// Establish the connection. Idempotent while open.
    pub(crate) async fn open(&mut self) -> Result<()> {
        if self.state == ConnectionState::Open {
            return Ok(());
        }
        self.state = ConnectionState::Connecting;

        let mut buf = [0u8; MAX_FRAME_SIZE];
        let len = ConnectRequest::new(Hpai::UNSPECIFIED, Hpai::UNSPECIFIED, self.cri)
            .build(&mut buf)?;
        self.transport.send_to(&buf[..len], self.server).await?;

        let deadline = Instant::now() + self.config.connect_timeout;
        loop {
            let mut rx = [0u8; MAX_FRAME_SIZE];
            let (len, from) = match timeout_at(deadline, self.transport.recv_from(&mut rx)).await {
                Err(_) => {
                    self.state = ConnectionState::Idle;
                    return Err(KnxError::ConnectionTimeout);
                }
                Ok(Err(e)) => {
                    self.state = ConnectionState::Idle;
                    return Err(e);
                }
                Ok(Ok(received)) => received,
            };

            let frame = match KnxnetIpFrame::parse(&rx[..len]) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("dropping malformed datagram during connect: {e}");
                    continue;
                }
            };
            if frame.service() != Some(ServiceType::ConnectResponse) {
                debug!(
                    "ignoring service 0x{:04X} while connecting",
                    frame.service_type_raw()
                );
                continue;
            }

            let response = match ConnectResponse::parse(frame.body()) {
                Ok(response) => response,
                Err(e) => {
                    self.state = ConnectionState::Idle;
                    return Err(e);
                }
            };
            if !response.is_ok() {
                self.state = ConnectionState::Idle;
                return Err(KnxError::ConnectionRefused(response.status));
            }

            self.channel_id = response.channel_id;
            // A zero data HPAI means "talk to the address you saw" (NAT).
            self.data_endpoint = response
                .data_endpoint
                .map_or(from, |hpai| hpai.endpoint_or(from));
            self.tx_seq = 0;
            self.last_delivered = None;
            self.last_ack = None;
            self.queued.clear();
            self.heartbeat_at = Instant::now() + self.config.heartbeat_interval;
            self.heartbeat_deadline = None;
            self.state = ConnectionState::Open;
            debug!(
                "connection open: channel {} data endpoint {}",
                self.channel_id, self.data_endpoint
            );
            return Ok(());
        }
    }

    /// Send one cEMI frame and await its ACK. At most one request is
    /// outstanding; inbound data frames seen meanwhile are ACKed and
    /// queued.
    pub(crate) async fn send_data(&mut self, cemi: &[u8]) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Err(KnxError::NotConnected);
        }

        let header = ConnectionHeader::new(self.channel_id, self.tx_seq);
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let len = DataRequest::new(self.data_service, header, cemi).build(&mut buf)?;
        self.transport.send_to(&buf[..len], self.data_endpoint).await?;
        self.last_ack = None;

        let deadline = Instant::now() + self.config.connect_timeout;
        loop {
            let mut rx = [0u8; MAX_FRAME_SIZE];
            let (len, from) = match timeout_at(deadline, self.transport.recv_from(&mut rx)).await {
                Err(_) => return Err(KnxError::ConnectionTimeout),
                Ok(Err(e)) => return Err(e),
                Ok(Ok(received)) => received,
            };

            if let Some(event) = self.process_datagram(&rx[..len], from).await? {
                self.queued.push_back(event);
            }
            if let Some((sequence, status)) = self.last_ack.take() {
                if sequence == self.tx_seq {
                    if status == E_NO_ERROR {
                        self.tx_seq = self.tx_seq.wrapping_add(1);
                        return Ok(());
                    }
                    return Err(KnxError::AckError(status));
                }
                debug!("ignoring stale ack for sequence {sequence}");
            }
        }
    }

    /// Receive the next connection event, running the heartbeat in the
    /// gaps.
    pub(crate) async fn recv_event(&mut self) -> Result<ConnEvent> {
        loop {
            if self.state != ConnectionState::Open {
                return Err(KnxError::NotConnected);
            }
            if let Some(event) = self.queued.pop_front() {
                return Ok(event);
            }

            let wake = self.service_heartbeat().await?;
            let mut rx = [0u8; MAX_FRAME_SIZE];
            match timeout_at(wake, self.transport.recv_from(&mut rx)).await {
                // Timer tick; loop to run the heartbeat.
                Err(_) => continue,
                Ok(Err(e)) => return Err(e),
                Ok(Ok((len, from))) => {
                    if let Some(event) = self.process_datagram(&rx[..len], from).await? {
                        return Ok(event);
                    }
                }
            }
        }
    }

    /// Close the connection. Idempotent; waits at most the grace window
    /// for the DISCONNECT_RESPONSE.
    pub(crate) async fn close(&mut self) -> Result<()> {
        if self.state != ConnectionState::Open {
            self.reset();
            return Ok(());
        }
        self.state = ConnectionState::Closing;

        let mut buf = [0u8; MAX_FRAME_SIZE];
        match DisconnectRequest::new(self.channel_id, Hpai::UNSPECIFIED).build(&mut buf) {
            Ok(len) => {
                let _ = self.transport.send_to(&buf[..len], self.server).await;
            }
            Err(e) => warn!("failed to build disconnect request: {e}"),
        }

        let deadline = Instant::now() + self.config.close_grace;
        loop {
            let mut rx = [0u8; MAX_FRAME_SIZE];
            match timeout_at(deadline, self.transport.recv_from(&mut rx)).await {
                Err(_) | Ok(Err(_)) => break,
                Ok(Ok((len, _))) => {
                    if let Ok(frame) = KnxnetIpFrame::parse(&rx[..len]) {
                        if frame.service() == Some(ServiceType::DisconnectResponse) {
                            break;
                        }
                    }
                }
            }
        }
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Idle;
        self.channel_id = 0;
        self.tx_seq = 0;
        self.last_delivered = None;
        self.last_ack = None;
        self.queued.clear();
        self.heartbeat_deadline = None;
        self.transport.close();
    }

    /// Run the heartbeat timers; returns the next wake-up instant.
    async fn service_heartbeat(&mut self) -> Result<Instant> {
        let now = Instant::now();
        if let Some(deadline) = self.heartbeat_deadline {
            if now >= deadline {
                warn!("heartbeat went unanswered, tearing connection down");
                self.reset();
                return Err(KnxError::ConnectionLost);
            }
        }
        if now >= self.heartbeat_at && self.heartbeat_deadline.is_none() {
            let mut buf = [0u8; MAX_FRAME_SIZE];
            let len = ConnectionStateRequest::new(self.channel_id, Hpai::UNSPECIFIED)
                .build(&mut buf)?;
            self.transport.send_to(&buf[..len], self.server).await?;
            self.heartbeat_deadline = Some(now + self.config.connect_timeout);
            self.heartbeat_at = now + self.config.heartbeat_interval;
        }

        let mut wake = self.heartbeat_at;
        if let Some(deadline) = self.heartbeat_deadline {
            wake = wake.min(deadline);
        }
        Ok(wake)
    }

    /// Dispatch one received datagram. `Ok(Some(_))` carries an event for
    /// the consumer; protocol housekeeping returns `Ok(None)`; lifecycle
    /// failures return `Err`.
    async fn process_datagram(
        &mut self,
        data: &[u8],
        from: SocketAddrV4,
    ) -> Result<Option<ConnEvent>> {
        let frame = match KnxnetIpFrame::parse(data) {
            Ok(frame) => frame,
            Err(e) => return Ok(Some(ConnEvent::Malformed(e))),
        };

        let Some(service) = frame.service() else {
            debug!(
                "dropping unknown service type 0x{:04X}",
                frame.service_type_raw()
            );
            return Ok(None);
        };

        if service == self.data_service {
            return self.handle_data_request(frame.body()).await;
        }
        if service == self.ack_service {
            match DataAck::parse(service, frame.body()) {
                Ok(ack) if ack.header.channel_id == self.channel_id => {
                    self.last_ack = Some((ack.header.sequence, ack.status));
                }
                Ok(ack) => debug!("ignoring ack for foreign channel {}", ack.header.channel_id),
                Err(e) => return Ok(Some(ConnEvent::Malformed(e))),
            }
            return Ok(None);
        }

        match service {
            ServiceType::ConnectionstateRequest => {
                // Server-initiated heartbeat: answer immediately.
                let channel = ConnectionStateRequest::parse(frame.body())
                    .map(|request| request.channel_id)
                    .unwrap_or(self.channel_id);
                let mut buf = [0u8; MAX_FRAME_SIZE];
                let len = ConnectionStateResponse::new(channel, E_NO_ERROR).build(&mut buf)?;
                self.transport.send_to(&buf[..len], from).await?;
                Ok(None)
            }
            ServiceType::ConnectionstateResponse => {
                match ConnectionStateResponse::parse(frame.body()) {
                    Ok(response) => {
                        if !response.is_ok() {
                            warn!(
                                "heartbeat reported status 0x{:02X}, tearing connection down",
                                response.status
                            );
                            self.reset();
                            return Err(KnxError::ConnectionLost);
                        }
                        self.heartbeat_deadline = None;
                        Ok(None)
                    }
                    Err(e) => Ok(Some(ConnEvent::Malformed(e))),
                }
            }
            ServiceType::DisconnectRequest => {
                // Server-initiated disconnect: confirm, then report lost.
                let channel = DisconnectRequest::parse(frame.body())
                    .map(|request| request.channel_id)
                    .unwrap_or(self.channel_id);
                let mut buf = [0u8; MAX_FRAME_SIZE];
                let len = DisconnectResponse::new(channel, E_NO_ERROR).build(&mut buf)?;
                let _ = self.transport.send_to(&buf[..len], from).await;
                self.reset();
                Err(KnxError::ConnectionLost)
            }
            ServiceType::DisconnectResponse => Ok(None),
            other => {
                debug!("dropping unexpected service {other:?}");
                Ok(None)
            }
        }
    }

    /// ACK an inbound data frame, then surface it unless it repeats the
    /// last delivered sequence. The ACK always goes out first.
    async fn handle_data_request(&mut self, body: &[u8]) -> Result<Option<ConnEvent>> {
        let request = match DataRequest::parse(self.data_service, body) {
            Ok(request) => request,
            Err(e) => return Ok(Some(ConnEvent::Malformed(e))),
        };
        if request.header.channel_id != self.channel_id {
            debug!(
                "ignoring data frame for foreign channel {}",
                request.header.channel_id
            );
            return Ok(None);
        }

        let sequence = request.header.sequence;
        let cemi = request.cemi.to_vec();

        let header = ConnectionHeader::new(self.channel_id, sequence);
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let len = DataAck::new(self.ack_service, header, E_NO_ERROR).build(&mut buf)?;
        self.transport.send_to(&buf[..len], self.data_endpoint).await?;

        if self.last_delivered == Some(sequence) {
            debug!("suppressing duplicate data frame, sequence {sequence}");
            return Ok(None);
        }
        self.last_delivered = Some(sequence);
        Ok(Some(ConnEvent::Cemi(cemi)))
    }
}
