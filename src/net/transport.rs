//! Datagram transport abstraction.
//!
//! The transports in this crate never touch a socket type directly; they
//! speak to this narrow trait. Production code plugs in
//! [`UdpTransport`](crate::net::UdpTransport), tests plug in
//! [`MockTransport`](crate::net::MockTransport), and alternative carriers
//! (a packet capture replay, a relay) fit without changing the state
//! machines.

use crate::error::Result;
use std::net::SocketAddrV4;

/// Asynchronous datagram transport.
///
/// Implementations are constructed already bound; the state machines only
/// exchange datagrams and ask for the bound endpoint (which discovery and
/// the connection handshake advertise in their HPAIs).
#[allow(async_fn_in_trait)]
pub trait AsyncTransport {
    /// Send one datagram to `addr`.
    async fn send_to(&mut self, data: &[u8], addr: SocketAddrV4) -> Result<()>;

    /// Receive one datagram, returning its length and source.
    async fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddrV4)>;

    /// The locally bound endpoint.
    fn local_endpoint(&self) -> Result<SocketAddrV4>;

    /// Release the transport. Default is a no-op for transports that close
    /// on drop.
    fn close(&mut self) {}
}
