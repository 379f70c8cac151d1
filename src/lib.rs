//! # knx-bus
//!
//! KNX bus access for Rust: a uniform, event-driven bus interface over
//! KNXnet/IP (routing, tunneling, device management) and KNX USB HID
//! interfaces, built around a cEMI frame codec.
//!
//! Every transport implements the same [`BusInterface`] contract - open,
//! close, send a [`CemiFrame`], receive [`BusEvent`]s - and differs only
//! in its delivery semantics: routing is multicast fire-and-forget,
//! tunneling is a sequenced unicast connection with per-frame ACKs and a
//! heartbeat, USB re-frames cEMI through the KNX USB transfer protocol.
//! Device management connections expose interface-object property access
//! instead.
//!
//! Sockets and HID devices stay behind narrow capability traits
//! ([`net::AsyncTransport`], [`usb::HidDevice`]), so every state machine
//! in this crate runs unmodified against the bundled mocks.
//!
//! ## Example
//!
//! ```no_run
//! use knx_bus::{BusInterface, TunnelConfig, TunnelInterface};
//!
//! # async fn run() -> knx_bus::Result<()> {
//! let server = "192.168.1.10:3671".parse().unwrap();
//! let mut tunnel = TunnelInterface::udp(server, TunnelConfig::default()).await?;
//! tunnel.open().await?;
//! loop {
//!     match tunnel.recv().await? {
//!         knx_bus::BusEvent::Frame(frame) => println!("{frame}"),
//!         other => println!("{other:?}"),
//!     }
//! }
//! # }
//! ```

pub mod addressing;
pub mod bus;
mod connection;
pub mod discovery;
pub mod error;
pub mod management;
pub mod net;
pub mod protocol;
pub mod routing;
pub mod tunneling;
pub mod usb;

pub use addressing::{GroupAddress, IndividualAddress};
pub use bus::{BusEvent, BusInterface};
pub use discovery::{discover, DiscoveredEndpoint, DiscoveryConfig};
pub use error::{KnxError, Result};
pub use management::{ManagementConfig, ManagementInterface};
pub use protocol::cemi::CemiFrame;
pub use routing::{RoutingConfig, RoutingInterface};
pub use tunneling::{TunnelConfig, TunnelInterface};
pub use usb::{UsbConfig, UsbInterface};
