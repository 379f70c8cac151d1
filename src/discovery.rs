//! KNXnet/IP interface discovery.
//!
//! Discovery multicasts a SEARCH_REQUEST to 224.0.23.12:3671 and collects
//! SEARCH_RESPONSEs until the search timeout expires. Each response
//! carries the interface's control endpoint, a Device-Info DIB (hardware
//! identity, friendly name) and a Supported-Service-Families DIB from
//! which the capability bits are derived. Responses are deduplicated by
//! endpoint.

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::net::{AsyncTransport, UdpTransport};
use crate::protocol::constants::{
    ServiceFamily, ServiceType, CAP_DEVICE_MANAGEMENT, CAP_ROUTING, CAP_TUNNELLING,
    KNXNETIP_DEFAULT_PORT, KNXNETIP_MULTICAST_ADDR, MAX_FRAME_SIZE,
};
use crate::protocol::frame::{Hpai, KnxnetIpFrame};
use crate::protocol::services::SearchRequest;
use log::debug;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// DIB type: device information.
const DIB_DEVICE_INFO: u8 = 0x01;
/// DIB type: supported service families.
const DIB_SERVICE_FAMILIES: u8 = 0x02;
/// Total size of a Device-Info DIB.
const DEVICE_INFO_DIB_SIZE: usize = 54;

/// Discovery configuration.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryConfig {
    /// How long to collect responses.
    pub search_timeout: Duration,
    /// Multicast group to search on.
    pub group: Ipv4Addr,
    /// Port to search on.
    pub port: u16,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_timeout: Duration::from_secs(3),
            group: KNXNETIP_MULTICAST_ADDR,
            port: KNXNETIP_DEFAULT_PORT,
        }
    }
}

/// One discovered KNXnet/IP interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEndpoint {
    /// Control endpoint to connect to.
    pub address: SocketAddrV4,
    /// Friendly name from the Device-Info DIB (NUL-stripped UTF-8).
    pub friendly_name: String,
    /// Capability bits derived from the service-family list.
    pub capabilities: u32,
    /// Device status byte (bit 0: programming mode).
    pub device_state: u8,
    /// KNX medium code.
    pub medium: u8,
    /// Individual address of the interface.
    pub knx_address: Option<IndividualAddress>,
    /// Project installation identifier.
    pub project_installation_id: Option<u16>,
    /// KNX serial number.
    pub serial: Option<[u8; 6]>,
    /// Routing multicast address the device uses.
    pub routing_multicast: Option<Ipv4Addr>,
    /// MAC address.
    pub mac: Option<[u8; 6]>,
}

impl DiscoveredEndpoint {
    /// True when the endpoint announces tunnelling support.
    pub fn supports_tunnelling(&self) -> bool {
        self.capabilities & CAP_TUNNELLING != 0
    }

    /// True when the endpoint announces routing support.
    pub fn supports_routing(&self) -> bool {
        self.capabilities & CAP_ROUTING != 0
    }

    /// True when the endpoint announces device management support.
    pub fn supports_device_management(&self) -> bool {
        self.capabilities & CAP_DEVICE_MANAGEMENT != 0
    }
}

/// Parse a SEARCH_RESPONSE body received from `from`.
///
/// Layout: control HPAI, then a sequence of DIBs. Unknown DIB types are
/// skipped by their length field. A zero control HPAI is substituted with
/// the datagram source per the NAT rule.
pub fn parse_search_response(body: &[u8], from: SocketAddrV4) -> Result<DiscoveredEndpoint> {
    let hpai = Hpai::parse(body)?;
    let mut endpoint = DiscoveredEndpoint {
        address: hpai.endpoint_or(from),
        friendly_name: String::new(),
        capabilities: 0,
        device_state: 0,
        medium: 0,
        knx_address: None,
        project_installation_id: None,
        serial: None,
        routing_multicast: None,
        mac: None,
    };

    let mut offset = Hpai::SIZE;
    while offset + 2 <= body.len() {
        let dib_len = body[offset] as usize;
        let dib_type = body[offset + 1];
        if dib_len < 2 || offset + dib_len > body.len() {
            debug!("discovery: truncated DIB (type 0x{dib_type:02X}), stopping");
            break;
        }
        let dib = &body[offset..offset + dib_len];

        match dib_type {
            DIB_DEVICE_INFO if dib.len() >= DEVICE_INFO_DIB_SIZE => {
                endpoint.medium = dib[2];
                endpoint.device_state = dib[3];
                endpoint.knx_address =
                    Some(IndividualAddress::from(u16::from_be_bytes([dib[4], dib[5]])));
                endpoint.project_installation_id =
                    Some(u16::from_be_bytes([dib[6], dib[7]]));
                endpoint.serial = Some([dib[8], dib[9], dib[10], dib[11], dib[12], dib[13]]);
                endpoint.routing_multicast =
                    Some(Ipv4Addr::new(dib[14], dib[15], dib[16], dib[17]));
                endpoint.mac = Some([dib[18], dib[19], dib[20], dib[21], dib[22], dib[23]]);
                endpoint.friendly_name = parse_friendly_name(&dib[24..DEVICE_INFO_DIB_SIZE]);
            }
            DIB_SERVICE_FAMILIES => {
                for pair in dib[2..].chunks_exact(2) {
                    if let Some(family) = ServiceFamily::from_u8(pair[0]) {
                        endpoint.capabilities |= family.capability();
                    }
                }
            }
            other => debug!("discovery: skipping DIB type 0x{other:02X}"),
        }
        offset += dib_len;
    }

    Ok(endpoint)
}

/// Friendly name: UTF-8, stripped at the first NUL.
fn parse_friendly_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Discover KNXnet/IP interfaces with a transient UDP socket.
pub async fn discover(config: &DiscoveryConfig) -> Result<Vec<DiscoveredEndpoint>> {
    let transport = UdpTransport::bind(0).await?;
    discover_with(transport, config).await
}

/// Discover over a caller-supplied transport.
pub async fn discover_with<T: AsyncTransport>(
    mut transport: T,
    config: &DiscoveryConfig,
) -> Result<Vec<DiscoveredEndpoint>> {
    let local = transport.local_endpoint()?;
    // Advertise 0.0.0.0 with the bound port: responders reply to the
    // datagram source, which survives NAT.
    let request = SearchRequest::new(Hpai::new(Ipv4Addr::UNSPECIFIED, local.port()));
    let mut buf = [0u8; MAX_FRAME_SIZE];
    let len = request.build(&mut buf)?;
    transport
        .send_to(&buf[..len], SocketAddrV4::new(config.group, config.port))
        .await?;

    let deadline = Instant::now() + config.search_timeout;
    let mut found: Vec<DiscoveredEndpoint> = Vec::new();
    loop {
        let mut rx = [0u8; MAX_FRAME_SIZE];
        let (len, from) = match timeout_at(deadline, transport.recv_from(&mut rx)).await {
            Err(_) => break,
            Ok(Err(KnxError::ConnectionTimeout)) => break,
            Ok(Err(e)) => return Err(e),
            Ok(Ok(received)) => received,
        };

        let frame = match KnxnetIpFrame::parse(&rx[..len]) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("discovery: dropping malformed datagram: {e}");
                continue;
            }
        };
        if frame.service() != Some(ServiceType::SearchResponse) {
            continue;
        }
        match parse_search_response(frame.body(), from) {
            Ok(endpoint) => {
                // Deduplicate by endpoint
                if !found.iter().any(|known| known.address == endpoint.address) {
                    found.push(endpoint);
                }
            }
            Err(e) => debug!("discovery: dropping unparseable response: {e}"),
        }
    }
    transport.close();
    Ok(found)
}
