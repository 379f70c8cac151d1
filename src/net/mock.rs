//! Mock transport for protocol tests.
//!
//! Pre-programmed responses are returned from `recv_from` in FIFO order
//! and every sent datagram is recorded, so a test can walk a transport
//! state machine through a scripted exchange and assert on exactly what
//! went over the wire. The sent log is a shared handle
//! ([`MockTransport::sent_log`]) that stays valid after the mock moves
//! into a transport. An exhausted response queue reports
//! [`KnxError::ConnectionTimeout`], which is what the state machines
//! surface for a silent peer.

use crate::error::{KnxError, Result};
use crate::net::transport::AsyncTransport;
use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};

/// Shared record of sent datagrams: `(payload, destination)` in order.
pub type SentLog = Arc<Mutex<Vec<(Vec<u8>, SocketAddrV4)>>>;

/// Scripted [`AsyncTransport`] for tests.
#[derive(Debug)]
pub struct MockTransport {
    responses: VecDeque<(Vec<u8>, SocketAddrV4)>,
    sent: SentLog,
    local: SocketAddrV4,
    closed: bool,
}

impl MockTransport {
    /// Default peer the scripted responses claim to come from.
    pub const PEER: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 10), 3671);

    /// Fixed local endpoint the mock claims to be bound to.
    pub const LOCAL: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 52100);

    /// Create a mock transport bound to [`MockTransport::LOCAL`].
    pub fn new() -> Self {
        Self {
            responses: VecDeque::new(),
            sent: Arc::new(Mutex::new(Vec::new())),
            local: Self::LOCAL,
            closed: false,
        }
    }

    /// Queue a response from [`MockTransport::PEER`].
    pub fn add_response(&mut self, data: Vec<u8>) {
        self.add_response_from(data, Self::PEER);
    }

    /// Queue a response from a specific source endpoint.
    pub fn add_response_from(&mut self, data: Vec<u8>, from: SocketAddrV4) {
        self.responses.push_back((data, from));
    }

    /// Handle on the sent log; survives handing the mock to a transport.
    pub fn sent_log(&self) -> SentLog {
        Arc::clone(&self.sent)
    }

    /// Snapshot of all datagrams sent so far.
    pub fn sent_packets(&self) -> Vec<(Vec<u8>, SocketAddrV4)> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of responses not yet consumed.
    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncTransport for MockTransport {
    async fn send_to(&mut self, data: &[u8], addr: SocketAddrV4) -> Result<()> {
        self.sent.lock().unwrap().push((data.to_vec(), addr));
        Ok(())
    }

    async fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddrV4)> {
        match self.responses.pop_front() {
            Some((data, from)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok((len, from))
            }
            // Script exhausted: behave like a peer that stopped answering.
            None => Err(KnxError::ConnectionTimeout),
        }
    }

    fn local_endpoint(&self) -> Result<SocketAddrV4> {
        Ok(self.local)
    }

    fn close(&mut self) {
        self.closed = true;
        self.responses.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_sends_and_replays_responses() {
        let mut mock = MockTransport::new();
        mock.add_response(vec![0x01, 0x02, 0x03]);

        mock.send_to(&[0xAA, 0xBB], MockTransport::PEER).await.unwrap();
        let sent = mock.sent_packets();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, vec![0xAA, 0xBB]);

        let mut buf = [0u8; 16];
        let (len, from) = mock.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[0x01, 0x02, 0x03]);
        assert_eq!(from, MockTransport::PEER);
    }

    #[tokio::test]
    async fn sent_log_outlives_the_mock() {
        let mut mock = MockTransport::new();
        let log = mock.sent_log();
        mock.send_to(&[0x01], MockTransport::PEER).await.unwrap();
        drop(mock);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_queue_times_out() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 16];
        assert!(matches!(
            mock.recv_from(&mut buf).await,
            Err(KnxError::ConnectionTimeout)
        ));
    }

    #[tokio::test]
    async fn responses_are_fifo() {
        let mut mock = MockTransport::new();
        mock.add_response(vec![0x01]);
        mock.add_response(vec![0x02]);

        let mut buf = [0u8; 4];
        mock.recv_from(&mut buf).await.unwrap();
        assert_eq!(buf[0], 0x01);
        mock.recv_from(&mut buf).await.unwrap();
        assert_eq!(buf[0], 0x02);
    }
}
