//! `knxbus` - command-line access to the KNX bus.
//!
//! Subcommands: `discover` lists KNXnet/IP interfaces, `dump` prints bus
//! traffic through a selected transport, `read-property` and
//! `write-property` access interface object properties. Logging follows
//! `RUST_LOG`; the process exits 0 on success and 1 on any error.

use clap::{Args, Parser, Subcommand};
use knx_bus::management::{ManagementConfig, ManagementInterface};
use knx_bus::routing::{RoutingConfig, RoutingInterface};
use knx_bus::tunneling::{TunnelConfig, TunnelInterface};
use knx_bus::{discover, BusEvent, BusInterface, DiscoveryConfig, KnxError, Result};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "knxbus", version, about = "KNX bus access over KNXnet/IP and USB")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Discover KNXnet/IP interfaces on the local network
    Discover {
        /// Seconds to collect search responses
        #[arg(long, default_value_t = 3)]
        timeout: u64,
        /// UDP port to search on
        #[arg(long, default_value_t = 3671)]
        port: u16,
    },
    /// Print every frame received from the bus
    Dump {
        #[command(flatten)]
        transport: TransportArgs,
    },
    /// Read an interface object property
    ReadProperty {
        #[command(flatten)]
        transport: TransportArgs,
        #[command(flatten)]
        property: PropertyArgs,
        /// Number of elements to read
        #[arg(long, default_value_t = 1)]
        elements: u8,
    },
    /// Write an interface object property
    WriteProperty {
        #[command(flatten)]
        transport: TransportArgs,
        #[command(flatten)]
        property: PropertyArgs,
        /// Number of elements to write
        #[arg(long, default_value_t = 1)]
        elements: u8,
        /// Property data as hex (e.g. "00" or "0A1B")
        #[arg(long)]
        data: String,
    },
}

#[derive(Args)]
struct TransportArgs {
    /// Gateway IP address (tunneling / device management)
    #[arg(long)]
    address: Option<Ipv4Addr>,
    /// UDP port of the gateway or multicast group
    #[arg(long, default_value_t = 3671)]
    port: u16,
    /// Use routing (multicast) instead of a tunnel
    #[arg(long)]
    routing: bool,
    /// Multicast group for routing
    #[arg(long, default_value_t = Ipv4Addr::new(224, 0, 23, 12))]
    multicast: Ipv4Addr,
    /// Use a KNX USB interface
    #[arg(long)]
    usb: bool,
    /// USB device selector: "bus:address" or a product substring
    #[arg(long)]
    device: Option<String>,
    /// Open the connection in busmonitor layer
    #[arg(long)]
    busmonitor: bool,
}

#[derive(Args)]
struct PropertyArgs {
    /// Interface object type (default: cEMI server object)
    #[arg(long, value_parser = parse_u16, default_value = "8")]
    object: u16,
    /// Object instance
    #[arg(long, default_value_t = 1)]
    instance: u8,
    /// Property identifier
    #[arg(long)]
    property: u8,
    /// Start index
    #[arg(long, value_parser = parse_u16, default_value = "1")]
    start: u16,
}

fn missing_address() -> KnxError {
    KnxError::Io(std::io::Error::other(
        "a gateway --address is required for this transport",
    ))
}

/// Accept decimal or 0x-prefixed hex.
fn parse_u16(s: &str) -> std::result::Result<u16, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|_| format!("invalid number: {s}"))
}

/// Parse a hex string ("0A1B", "0a 1b", "0a:1b") into bytes.
fn parse_hex(s: &str) -> std::result::Result<Vec<u8>, String> {
    let cleaned: String = s.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    if cleaned.len() % 2 != 0 {
        return Err("hex data must have an even number of digits".into());
    }
    (0..cleaned.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&cleaned[i..i + 2], 16)
                .map_err(|_| format!("invalid hex data: {s}"))
        })
        .collect()
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");
    if let Err(e) = rt.block_on(run(cli)) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Discover { timeout, port } => {
            let config = DiscoveryConfig {
                search_timeout: Duration::from_secs(timeout),
                port,
                ..DiscoveryConfig::default()
            };
            let endpoints = discover(&config).await?;
            if endpoints.is_empty() {
                println!("no KNXnet/IP interfaces found");
                return Ok(());
            }
            for endpoint in endpoints {
                print_endpoint(&endpoint);
            }
            Ok(())
        }
        Command::Dump { transport } => dump(transport).await,
        Command::ReadProperty {
            transport,
            property,
            elements,
        } => {
            let data = read_property(transport, &property, elements).await?;
            let hex: Vec<String> = data.iter().map(|b| format!("{b:02X}")).collect();
            println!("{}", hex.join(" "));
            Ok(())
        }
        Command::WriteProperty {
            transport,
            property,
            elements,
            data,
        } => {
            let bytes = parse_hex(&data).map_err(KnxError::Hid)?;
            write_property(transport, &property, elements, bytes).await?;
            println!("ok");
            Ok(())
        }
    }
}

fn print_endpoint(endpoint: &knx_bus::DiscoveredEndpoint) {
    let mut caps = Vec::new();
    if endpoint.supports_device_management() {
        caps.push("mgmt");
    }
    if endpoint.supports_tunnelling() {
        caps.push("tunnel");
    }
    if endpoint.supports_routing() {
        caps.push("routing");
    }

    println!("{}  \"{}\"  [{}]", endpoint.address, endpoint.friendly_name, caps.join(", "));
    if let Some(addr) = endpoint.knx_address {
        println!("    knx address: {addr}");
    }
    if let Some(mac) = endpoint.mac {
        let mac: Vec<String> = mac.iter().map(|b| format!("{b:02x}")).collect();
        println!("    mac: {}", mac.join(":"));
    }
    if let Some(serial) = endpoint.serial {
        let serial: Vec<String> = serial.iter().map(|b| format!("{b:02x}")).collect();
        println!("    serial: {}", serial.join(""));
    }
}

async fn dump(args: TransportArgs) -> Result<()> {
    if args.usb {
        return dump_usb(&args).await;
    }
    if args.routing {
        if args.busmonitor {
            // Routers do not forward monitor frames.
            return Err(KnxError::InvalidMode);
        }
        let config = RoutingConfig {
            group: args.multicast,
            port: args.port,
            ..RoutingConfig::default()
        };
        let bus = RoutingInterface::udp(config)?;
        return run_dump(bus).await;
    }

    let address = args.address.ok_or_else(missing_address)?;
    let config = if args.busmonitor {
        TunnelConfig::busmonitor()
    } else {
        TunnelConfig::link_layer()
    };
    let bus = TunnelInterface::udp(SocketAddrV4::new(address, args.port), config).await?;
    run_dump(bus).await
}

async fn run_dump<B: BusInterface>(mut bus: B) -> Result<()> {
    bus.open().await?;
    loop {
        match bus.recv().await? {
            BusEvent::Frame(frame) => println!("{frame}"),
            BusEvent::Error(e) => eprintln!("frame error: {e}"),
            BusEvent::LostMessage { device_state, lost } => {
                println!("router lost {lost} frame(s), device state 0x{device_state:02X}");
            }
            BusEvent::Busy {
                wait_time,
                control,
                count,
            } => {
                println!("router busy: wait {wait_time} ms, control 0x{control:04X}, count {count}");
            }
            BusEvent::Reset => println!("interface reset"),
        }
    }
}

#[cfg(feature = "usb")]
async fn dump_usb(args: &TransportArgs) -> Result<()> {
    use knx_bus::usb::{NusbHid, UsbConfig, UsbInterface};

    let hid = NusbHid::open(args.device.as_deref()).await?;
    let bus = UsbInterface::new(
        hid,
        UsbConfig {
            busmonitor: args.busmonitor,
            ..UsbConfig::default()
        },
    );
    run_dump(bus).await
}

#[cfg(not(feature = "usb"))]
async fn dump_usb(_args: &TransportArgs) -> Result<()> {
    Err(KnxError::Hid(
        "this build has no USB support (enable the `usb` feature)".into(),
    ))
}

async fn read_property(
    transport: TransportArgs,
    property: &PropertyArgs,
    elements: u8,
) -> Result<Vec<u8>> {
    if transport.usb {
        return usb_property(
            &transport,
            property,
            elements,
            None,
        )
        .await;
    }
    let mut mgmt = open_management(&transport).await?;
    let result = mgmt
        .read_property(
            property.object,
            property.instance,
            property.property,
            elements,
            property.start,
        )
        .await;
    mgmt.close().await?;
    result
}

async fn write_property(
    transport: TransportArgs,
    property: &PropertyArgs,
    elements: u8,
    data: Vec<u8>,
) -> Result<()> {
    if transport.usb {
        usb_property(&transport, property, elements, Some(data)).await?;
        return Ok(());
    }
    let mut mgmt = open_management(&transport).await?;
    let result = mgmt
        .write_property(
            property.object,
            property.instance,
            property.property,
            elements,
            property.start,
            data,
        )
        .await;
    mgmt.close().await?;
    result
}

async fn open_management(transport: &TransportArgs) -> Result<ManagementInterface<knx_bus::net::UdpTransport>> {
    let address = transport.address.ok_or_else(missing_address)?;
    let mut mgmt = ManagementInterface::udp(
        SocketAddrV4::new(address, transport.port),
        ManagementConfig::default(),
    )
    .await?;
    mgmt.open().await?;
    Ok(mgmt)
}

/// Property access over USB: `data` selects read (None) or write (Some).
#[cfg(feature = "usb")]
async fn usb_property(
    transport: &TransportArgs,
    property: &PropertyArgs,
    elements: u8,
    data: Option<Vec<u8>>,
) -> Result<Vec<u8>> {
    use knx_bus::usb::{NusbHid, UsbConfig, UsbInterface};

    let hid = NusbHid::open(transport.device.as_deref()).await?;
    let mut bus = UsbInterface::new(hid, UsbConfig::default());
    bus.open().await?;
    let result = match data {
        None => {
            bus.read_property(
                property.object,
                property.instance,
                property.property,
                elements,
                property.start,
            )
            .await
        }
        Some(bytes) => bus
            .write_property(
                property.object,
                property.instance,
                property.property,
                elements,
                property.start,
                bytes,
            )
            .await
            .map(|()| Vec::new()),
    };
    bus.close().await?;
    result
}

#[cfg(not(feature = "usb"))]
async fn usb_property(
    _transport: &TransportArgs,
    _property: &PropertyArgs,
    _elements: u8,
    _data: Option<Vec<u8>>,
) -> Result<Vec<u8>> {
    Err(KnxError::Hid(
        "this build has no USB support (enable the `usb` feature)".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_numbers() {
        assert_eq!(parse_u16("8").unwrap(), 8);
        assert_eq!(parse_u16("0x0008").unwrap(), 8);
        assert!(parse_u16("zz").is_err());
    }

    #[test]
    fn parse_hex_data() {
        assert_eq!(parse_hex("0A1B").unwrap(), vec![0x0A, 0x1B]);
        assert_eq!(parse_hex("0a 1b").unwrap(), vec![0x0A, 0x1B]);
        assert_eq!(parse_hex("0a:1b").unwrap(), vec![0x0A, 0x1B]);
        assert!(parse_hex("0a1").is_err());
        assert!(parse_hex("zz").is_err());
    }
}
