//! KNXnet/IP and cEMI constant tables.

use core::fmt;
use std::net::Ipv4Addr;

/// KNXnet/IP protocol version 1.0.
pub const KNXNETIP_VERSION_10: u8 = 0x10;

/// KNXnet/IP header length (6 bytes).
pub const HEADER_SIZE_10: u8 = 0x06;

/// Standard UDP port for KNXnet/IP communication.
pub const KNXNETIP_DEFAULT_PORT: u16 = 3671;

/// System setup multicast group used for discovery and routing.
pub const KNXNETIP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 0, 23, 12);

/// Default IP TTL for routed multicast frames.
pub const ROUTING_DEFAULT_TTL: u32 = 16;

/// Maximum size of a KNXnet/IP frame.
pub const MAX_FRAME_SIZE: usize = 512;

// =============================================================================
// Service type identifiers
// =============================================================================

/// KNXnet/IP service type identifiers handled by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ServiceType {
    /// `SEARCH_REQUEST` - interface discovery request
    SearchRequest = 0x0201,
    /// `SEARCH_RESPONSE` - interface discovery response
    SearchResponse = 0x0202,
    /// `CONNECT_REQUEST`
    ConnectRequest = 0x0205,
    /// `CONNECT_RESPONSE`
    ConnectResponse = 0x0206,
    /// `CONNECTIONSTATE_REQUEST` - heartbeat
    ConnectionstateRequest = 0x0207,
    /// `CONNECTIONSTATE_RESPONSE`
    ConnectionstateResponse = 0x0208,
    /// `DISCONNECT_REQUEST`
    DisconnectRequest = 0x0209,
    /// `DISCONNECT_RESPONSE`
    DisconnectResponse = 0x020A,
    /// `DEVICE_CONFIGURATION_REQUEST` - carries cEMI property services
    DeviceConfigurationRequest = 0x0310,
    /// `DEVICE_CONFIGURATION_ACK`
    DeviceConfigurationAck = 0x0311,
    /// `TUNNELLING_REQUEST` - carries cEMI over a tunnel connection
    TunnellingRequest = 0x0420,
    /// `TUNNELLING_ACK`
    TunnellingAck = 0x0421,
    /// `ROUTING_INDICATION` - multicast cEMI
    RoutingIndication = 0x0530,
    /// `ROUTING_LOST_MESSAGE` - router dropped frames
    RoutingLostMessage = 0x0531,
    /// `ROUTING_BUSY` - router flow control
    RoutingBusy = 0x0532,
}

impl ServiceType {
    /// Convert a wire value to a `ServiceType`.
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0201 => Some(Self::SearchRequest),
            0x0202 => Some(Self::SearchResponse),
            0x0205 => Some(Self::ConnectRequest),
            0x0206 => Some(Self::ConnectResponse),
            0x0207 => Some(Self::ConnectionstateRequest),
            0x0208 => Some(Self::ConnectionstateResponse),
            0x0209 => Some(Self::DisconnectRequest),
            0x020A => Some(Self::DisconnectResponse),
            0x0310 => Some(Self::DeviceConfigurationRequest),
            0x0311 => Some(Self::DeviceConfigurationAck),
            0x0420 => Some(Self::TunnellingRequest),
            0x0421 => Some(Self::TunnellingAck),
            0x0530 => Some(Self::RoutingIndication),
            0x0531 => Some(Self::RoutingLostMessage),
            0x0532 => Some(Self::RoutingBusy),
            _ => None,
        }
    }

    /// Wire value of this service type.
    pub const fn to_u16(self) -> u16 {
        self as u16
    }
}

// =============================================================================
// Connection types and tunnel layers
// =============================================================================

/// Connection type code for device management connections.
pub const DEVICE_MGMT_CONNECTION: u8 = 0x03;

/// Connection type code for tunnel connections.
pub const TUNNEL_CONNECTION: u8 = 0x04;

/// KNX layer requested in a tunnel CRI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TunnelLayer {
    /// Data link layer tunnel - the normal mode
    #[default]
    LinkLayer = 0x02,
    /// Raw frames
    Raw = 0x04,
    /// Bus monitor - receive-only feed of all bus traffic
    Busmonitor = 0x80,
}

// =============================================================================
// Host protocol codes
// =============================================================================

/// IPv4 over UDP.
pub const IPV4_UDP: u8 = 0x01;

// =============================================================================
// KNXnet/IP error codes
// =============================================================================

/// Operation succeeded.
pub const E_NO_ERROR: u8 = 0x00;

/// Connection type not supported by the server.
pub const E_CONNECTION_TYPE: u8 = 0x22;

/// Connection option not supported by the server.
pub const E_CONNECTION_OPTION: u8 = 0x23;

/// Server cannot accept another connection.
pub const E_NO_MORE_CONNECTIONS: u8 = 0x24;

/// Error in the data connection.
pub const E_DATA_CONNECTION: u8 = 0x26;

/// Error in the KNX bus connection.
pub const E_KNX_CONNECTION: u8 = 0x27;

/// Requested tunnelling layer not supported.
pub const E_TUNNELLING_LAYER: u8 = 0x29;

// =============================================================================
// cEMI message codes
// =============================================================================

/// cEMI message codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageCode {
    /// `L_Data.req` - data request towards the bus
    LDataReq = 0x11,
    /// `L_Data.ind` - data indication from the bus
    LDataInd = 0x29,
    /// `L_Busmon.ind` - bus monitor indication
    LBusmonInd = 0x2B,
    /// `L_Data.con` - data confirmation
    LDataCon = 0x2E,
    /// `M_PropRead.req` - interface object property read
    MPropReadReq = 0xFC,
    /// `M_PropRead.con`
    MPropReadCon = 0xFB,
    /// `M_PropWrite.req` - interface object property write
    MPropWriteReq = 0xF6,
    /// `M_PropWrite.con`
    MPropWriteCon = 0xF5,
    /// `M_Reset.req` - device reset request
    MResetReq = 0xF1,
    /// `M_Reset.ind` - device reset indication
    MResetInd = 0xF0,
}

impl MessageCode {
    /// Convert a wire value to a `MessageCode`.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x11 => Some(Self::LDataReq),
            0x29 => Some(Self::LDataInd),
            0x2B => Some(Self::LBusmonInd),
            0x2E => Some(Self::LDataCon),
            0xFC => Some(Self::MPropReadReq),
            0xFB => Some(Self::MPropReadCon),
            0xF6 => Some(Self::MPropWriteReq),
            0xF5 => Some(Self::MPropWriteCon),
            0xF1 => Some(Self::MResetReq),
            0xF0 => Some(Self::MResetInd),
            _ => None,
        }
    }

    /// Wire value of this message code.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// True for the L_Data request/indication/confirmation family.
    pub const fn is_ldata(self) -> bool {
        matches!(self, Self::LDataReq | Self::LDataInd | Self::LDataCon)
    }

    /// True for the M_PropRead/M_PropWrite family.
    pub const fn is_property(self) -> bool {
        matches!(
            self,
            Self::MPropReadReq | Self::MPropReadCon | Self::MPropWriteReq | Self::MPropWriteCon
        )
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LDataReq => "L_Data.req",
            Self::LDataInd => "L_Data.ind",
            Self::LBusmonInd => "L_Busmon.ind",
            Self::LDataCon => "L_Data.con",
            Self::MPropReadReq => "M_PropRead.req",
            Self::MPropReadCon => "M_PropRead.con",
            Self::MPropWriteReq => "M_PropWrite.req",
            Self::MPropWriteCon => "M_PropWrite.con",
            Self::MResetReq => "M_Reset.req",
            Self::MResetInd => "M_Reset.ind",
        };
        f.write_str(name)
    }
}

// =============================================================================
// KNX priority
// =============================================================================

/// KNX frame priority (control field 1, bits 3-2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Priority {
    /// System priority
    System = 0b00,
    /// Normal priority
    #[default]
    Normal = 0b01,
    /// Urgent priority
    Urgent = 0b10,
    /// Low priority - the default for group communication
    Low = 0b11,
}

impl Priority {
    /// Convert the two priority bits to a `Priority`.
    pub const fn from_u8(value: u8) -> Self {
        match value & 0b11 {
            0b00 => Self::System,
            0b01 => Self::Normal,
            0b10 => Self::Urgent,
            _ => Self::Low,
        }
    }

    /// The two priority bits.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::System => "system",
            Self::Normal => "normal",
            Self::Urgent => "urgent",
            Self::Low => "low",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Service families and capability bits
// =============================================================================

/// KNXnet/IP service family identifiers announced in SEARCH_RESPONSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceFamily {
    /// Core services
    Core = 0x02,
    /// Device management
    DeviceManagement = 0x03,
    /// Tunnelling
    Tunnelling = 0x04,
    /// Routing
    Routing = 0x05,
    /// Remote logging
    RemoteLogging = 0x06,
    /// Remote configuration and diagnosis
    RemoteConfiguration = 0x07,
    /// Object server
    ObjectServer = 0x08,
}

impl ServiceFamily {
    /// Convert a family id to a `ServiceFamily`.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x02 => Some(Self::Core),
            0x03 => Some(Self::DeviceManagement),
            0x04 => Some(Self::Tunnelling),
            0x05 => Some(Self::Routing),
            0x06 => Some(Self::RemoteLogging),
            0x07 => Some(Self::RemoteConfiguration),
            0x08 => Some(Self::ObjectServer),
            _ => None,
        }
    }

    /// Capability bit derived from this family.
    pub const fn capability(self) -> u32 {
        match self {
            Self::Core => CAP_CORE,
            Self::DeviceManagement => CAP_DEVICE_MANAGEMENT,
            Self::Tunnelling => CAP_TUNNELLING,
            Self::Routing => CAP_ROUTING,
            Self::RemoteLogging => CAP_REMOTE_LOGGING,
            Self::RemoteConfiguration => CAP_REMOTE_CONFIGURATION,
            Self::ObjectServer => CAP_OBJECT_SERVER,
        }
    }
}

/// Endpoint supports the core services.
pub const CAP_CORE: u32 = 1 << 0;
/// Endpoint supports device management connections.
pub const CAP_DEVICE_MANAGEMENT: u32 = 1 << 1;
/// Endpoint supports tunnelling connections.
pub const CAP_TUNNELLING: u32 = 1 << 2;
/// Endpoint supports routing.
pub const CAP_ROUTING: u32 = 1 << 3;
/// Endpoint supports remote logging.
pub const CAP_REMOTE_LOGGING: u32 = 1 << 4;
/// Endpoint supports remote configuration.
pub const CAP_REMOTE_CONFIGURATION: u32 = 1 << 5;
/// Endpoint supports the object server protocol.
pub const CAP_OBJECT_SERVER: u32 = 1 << 6;

// =============================================================================
// KNX USB transfer protocol
// =============================================================================

/// USB transfer protocol version implemented here.
pub const USB_PROTOCOL_VERSION: u8 = 0x00;

/// USB transfer protocol header length.
pub const USB_HEADER_LENGTH: u8 = 0x08;

/// Transfer protocol id: KNX tunnel (EMI frames).
pub const USB_PROTOCOL_KNX_TUNNEL: u8 = 0x01;

/// Transfer protocol id: bus access server feature service.
pub const USB_PROTOCOL_FEATURE_SERVICE: u8 = 0x0F;

/// EMI flavour announced in the transfer protocol header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EmiId {
    /// EMI1
    Emi1 = 0x01,
    /// EMI2
    Emi2 = 0x02,
    /// Common EMI - the only flavour this crate speaks
    Cemi = 0x03,
}

/// Feature service id: get a feature value.
pub const FEATURE_GET: u8 = 0x01;
/// Feature service id: feature value response.
pub const FEATURE_RESPONSE: u8 = 0x02;
/// Feature service id: set a feature value.
pub const FEATURE_SET: u8 = 0x03;
/// Feature service id: spontaneous feature info.
pub const FEATURE_INFO: u8 = 0x04;

/// Feature identifier: active EMI type.
pub const FEATURE_ACTIVE_EMI_TYPE: u8 = 0x05;

// =============================================================================
// Interface object properties used by the USB init sequence
// =============================================================================

/// Interface object type of the cEMI server object.
pub const CEMI_SERVER_OBJECT: u16 = 0x0008;

/// Property id of the communication mode property.
pub const PID_COMM_MODE: u8 = 52;

/// `PID_COMM_MODE` value: data link layer.
pub const COMM_MODE_LINK_LAYER: u8 = 0x00;

/// `PID_COMM_MODE` value: data link layer bus monitor.
pub const COMM_MODE_BUSMONITOR: u8 = 0x01;
