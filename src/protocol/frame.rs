//! KNXnet/IP frame envelope.
//!
//! Every KNXnet/IP service shares the same 6-byte header:
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────────────────┐
//! │ Header Len   │ Protocol Ver │  Service Type ID    │
//! │   (1 byte)   │   (1 byte)   │     (2 bytes)       │
//! ├──────────────┴──────────────┴─────────────────────┤
//! │           Total Length (2 bytes)                  │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! The header keeps the service type as its raw wire value: an envelope
//! with an unknown service type is still a well-formed envelope, and the
//! receive loops decide whether to dispatch or drop it.

use crate::error::{KnxError, Result};
use crate::protocol::constants::{
    ServiceType, HEADER_SIZE_10, IPV4_UDP, KNXNETIP_VERSION_10, MAX_FRAME_SIZE,
};
use std::net::{Ipv4Addr, SocketAddrV4};

/// KNXnet/IP frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnxnetIpHeader {
    /// Header length, 0x06 on this protocol version.
    pub header_length: u8,
    /// Protocol version, 0x10.
    pub protocol_version: u8,
    /// Service type identifier (raw wire value).
    pub service_type: u16,
    /// Total frame length including the header.
    pub total_length: u16,
}

impl KnxnetIpHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 6;

    /// Create a header for a frame with `body_length` payload bytes.
    pub const fn new(service_type: u16, body_length: u16) -> Self {
        Self {
            header_length: HEADER_SIZE_10,
            protocol_version: KNXNETIP_VERSION_10,
            service_type,
            total_length: Self::SIZE as u16 + body_length,
        }
    }

    /// Parse a header from the start of a datagram.
    ///
    /// # Errors
    ///
    /// [`KnxError::LengthMismatch`] if fewer than six bytes are present,
    /// [`KnxError::BadHeader`] on a wrong header size field,
    /// [`KnxError::BadVersion`] on an unsupported protocol version.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(KnxError::LengthMismatch);
        }

        let header_length = data[0];
        let protocol_version = data[1];
        let service_type = u16::from_be_bytes([data[2], data[3]]);
        let total_length = u16::from_be_bytes([data[4], data[5]]);

        if header_length != HEADER_SIZE_10 {
            return Err(KnxError::BadHeader);
        }
        if protocol_version != KNXNETIP_VERSION_10 {
            return Err(KnxError::BadVersion);
        }

        Ok(Self {
            header_length,
            protocol_version,
            service_type,
            total_length,
        })
    }

    /// Encode the header into `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < Self::SIZE {
            return Err(KnxError::BufferTooSmall);
        }
        buf[0] = self.header_length;
        buf[1] = self.protocol_version;
        buf[2..4].copy_from_slice(&self.service_type.to_be_bytes());
        buf[4..6].copy_from_slice(&self.total_length.to_be_bytes());
        Ok(Self::SIZE)
    }

    /// Service type, if it is one this crate knows.
    pub const fn service(&self) -> Option<ServiceType> {
        ServiceType::from_u16(self.service_type)
    }

    /// Payload length announced by the header.
    pub const fn body_length(&self) -> u16 {
        self.total_length.saturating_sub(Self::SIZE as u16)
    }
}

/// Zero-copy view of a received KNXnet/IP frame.
#[derive(Debug)]
pub struct KnxnetIpFrame<'a> {
    data: &'a [u8],
    header: KnxnetIpHeader,
}

impl<'a> KnxnetIpFrame<'a> {
    /// Parse a frame from a received datagram.
    ///
    /// # Errors
    ///
    /// Header errors as for [`KnxnetIpHeader::parse`], plus
    /// [`KnxError::LengthMismatch`] when the datagram is shorter than the
    /// total length announced by the header.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let header = KnxnetIpHeader::parse(data)?;
        if (header.total_length as usize) < KnxnetIpHeader::SIZE
            || data.len() < header.total_length as usize
        {
            return Err(KnxError::LengthMismatch);
        }
        Ok(Self { data, header })
    }

    /// The parsed header.
    pub const fn header(&self) -> &KnxnetIpHeader {
        &self.header
    }

    /// Service type, if known.
    pub const fn service(&self) -> Option<ServiceType> {
        self.header.service()
    }

    /// Raw service type for diagnostics on unknown services.
    pub const fn service_type_raw(&self) -> u16 {
        self.header.service_type
    }

    /// Frame body (payload after the header).
    pub fn body(&self) -> &'a [u8] {
        &self.data[KnxnetIpHeader::SIZE..self.header.total_length as usize]
    }
}

/// Builder assembling a header plus body into a caller buffer.
pub struct FrameBuilder<'a> {
    service_type: u16,
    body: &'a [u8],
}

impl<'a> FrameBuilder<'a> {
    /// Create a builder for `service_type` with the given body.
    pub const fn new(service_type: ServiceType, body: &'a [u8]) -> Self {
        Self {
            service_type: service_type.to_u16(),
            body,
        }
    }

    /// Build the frame into `buf`, returning the encoded length.
    pub fn build(&self, buf: &mut [u8]) -> Result<usize> {
        let total = KnxnetIpHeader::SIZE + self.body.len();
        if total > MAX_FRAME_SIZE {
            return Err(KnxError::PayloadTooLarge);
        }
        if buf.len() < total {
            return Err(KnxError::BufferTooSmall);
        }

        let header = KnxnetIpHeader::new(self.service_type, self.body.len() as u16);
        header.encode(buf)?;
        buf[KnxnetIpHeader::SIZE..total].copy_from_slice(self.body);
        Ok(total)
    }
}

/// Host Protocol Address Information (IPv4 UDP endpoint), 8 bytes.
///
/// A zero address and port means "reply to the source address of the
/// datagram as you saw it" - the NAT-friendly form this crate writes for
/// its own endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hpai {
    /// Host protocol code, [`IPV4_UDP`] here.
    pub host_protocol: u8,
    /// IPv4 address.
    pub address: Ipv4Addr,
    /// UDP port.
    pub port: u16,
}

impl Hpai {
    /// Encoded size of an IPv4 HPAI.
    pub const SIZE: usize = 8;

    /// The NAT-mode HPAI, 0.0.0.0:0.
    pub const UNSPECIFIED: Self = Self::new(Ipv4Addr::UNSPECIFIED, 0);

    /// Create an IPv4 UDP HPAI.
    pub const fn new(address: Ipv4Addr, port: u16) -> Self {
        Self {
            host_protocol: IPV4_UDP,
            address,
            port,
        }
    }

    /// True when address and port are both zero.
    pub fn is_unspecified(&self) -> bool {
        self.address.is_unspecified() && self.port == 0
    }

    /// The endpoint, with zero fields substituted from `fallback` per the
    /// NAT rule.
    pub fn endpoint_or(&self, fallback: SocketAddrV4) -> SocketAddrV4 {
        if self.is_unspecified() {
            fallback
        } else {
            SocketAddrV4::new(self.address, self.port)
        }
    }

    /// Parse an HPAI.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(KnxError::BufferTooSmall);
        }
        if data[0] as usize != Self::SIZE {
            return Err(KnxError::LengthMismatch);
        }
        Ok(Self {
            host_protocol: data[1],
            address: Ipv4Addr::new(data[2], data[3], data[4], data[5]),
            port: u16::from_be_bytes([data[6], data[7]]),
        })
    }

    /// Encode the HPAI into `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < Self::SIZE {
            return Err(KnxError::BufferTooSmall);
        }
        buf[0] = Self::SIZE as u8;
        buf[1] = self.host_protocol;
        buf[2..6].copy_from_slice(&self.address.octets());
        buf[6..8].copy_from_slice(&self.port.to_be_bytes());
        Ok(Self::SIZE)
    }
}
