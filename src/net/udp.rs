//! UDP transport over tokio sockets.

use crate::error::{KnxError, Result};
use crate::net::transport::AsyncTransport;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;

/// [`AsyncTransport`] implementation over a tokio UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind a unicast socket on `0.0.0.0:port` (0 for an ephemeral port).
    ///
    /// This is the socket shape used by discovery, tunneling and device
    /// management.
    pub async fn bind(port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).await?;
        Ok(Self { socket })
    }

    /// Bind a multicast member socket for routing.
    ///
    /// The port is shared with other routing participants on the host, so
    /// the socket is opened with `SO_REUSEADDR` before binding, then joins
    /// `group` on all interfaces and sets the multicast TTL.
    pub fn multicast(group: Ipv4Addr, port: u16, ttl: u32) -> Result<Self> {
        let raw = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        raw.set_reuse_address(true)?;
        raw.set_nonblocking(true)?;
        raw.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;

        let socket = UdpSocket::from_std(raw.into())?;
        socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
        socket.set_multicast_ttl_v4(ttl)?;
        Ok(Self { socket })
    }
}

impl AsyncTransport for UdpTransport {
    async fn send_to(&mut self, data: &[u8], addr: SocketAddrV4) -> Result<()> {
        self.socket.send_to(data, SocketAddr::V4(addr)).await?;
        Ok(())
    }

    async fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddrV4)> {
        loop {
            let (len, addr) = self.socket.recv_from(buf).await?;
            // The socket is IPv4-bound; skip anything else.
            if let SocketAddr::V4(v4) = addr {
                return Ok((len, v4));
            }
        }
    }

    fn local_endpoint(&self) -> Result<SocketAddrV4> {
        match self.socket.local_addr()? {
            SocketAddr::V4(v4) => Ok(v4),
            SocketAddr::V6(_) => Err(KnxError::Io(io::Error::other(
                "socket unexpectedly bound to IPv6",
            ))),
        }
    }
}
