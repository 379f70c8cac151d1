//! nusb-backed KNX USB HID device.
//!
//! KNX USB interfaces expose a single HID interface with one interrupt
//! endpoint per direction and 64-byte reports. Enumeration matches a
//! short list of known KNX vendors, a product string containing "knx", or
//! an explicit selector (a `bus:address` pair or a product substring).

use crate::error::{KnxError, Result};
use crate::protocol::usb_transfer::HID_REPORT_SIZE;
use crate::usb::hid::HidDevice;
use log::{debug, info};
use nusb::io::{EndpointRead, EndpointWrite};
use nusb::transfer::Interrupt;
use nusb::DeviceInfo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Vendors known to ship KNX USB interfaces.
const KNX_VENDOR_IDS: &[u16] = &[
    0x0E77, // Weinzierl
    0x145C, // Busch-Jaeger
    0x0908, // Siemens
];

/// HID interface number on KNX USB devices.
const HID_INTERFACE: u8 = 0;
/// Interrupt IN endpoint address.
const ENDPOINT_IN: u8 = 0x81;
/// Interrupt OUT endpoint address.
const ENDPOINT_OUT: u8 = 0x01;

/// [`HidDevice`] over a nusb interrupt endpoint pair.
pub struct NusbHid {
    reader: EndpointRead<Interrupt>,
    writer: EndpointWrite<Interrupt>,
    _interface: nusb::Interface,
}

fn matches_selector(info: &DeviceInfo, selector: Option<&str>) -> bool {
    match selector {
        Some(wanted) => {
            let path = format!("{}:{}", info.bus_id(), info.device_address());
            path == wanted
                || info
                    .product_string()
                    .is_some_and(|product| product.contains(wanted))
        }
        None => {
            KNX_VENDOR_IDS.contains(&info.vendor_id())
                || info
                    .product_string()
                    .is_some_and(|product| product.to_ascii_lowercase().contains("knx"))
        }
    }
}

fn hid_error(e: impl std::fmt::Display) -> KnxError {
    KnxError::Hid(e.to_string())
}

impl NusbHid {
    /// Enumerate HID devices and open the first KNX interface, or the one
    /// matching `selector`.
    pub async fn open(selector: Option<&str>) -> Result<Self> {
        let device_info = nusb::list_devices()
            .await
            .map_err(hid_error)?
            .find(|info| matches_selector(info, selector))
            .ok_or_else(|| KnxError::Hid("no KNX USB interface found".into()))?;

        info!(
            "opening KNX USB interface {:04x}:{:04x} ({})",
            device_info.vendor_id(),
            device_info.product_id(),
            device_info.product_string().unwrap_or("?"),
        );

        let device = device_info.open().await.map_err(hid_error)?;
        // The OS HID driver usually owns the interface; take it over.
        if let Err(e) = device.detach_kernel_driver(HID_INTERFACE) {
            debug!("could not detach kernel driver: {e}");
        }
        let interface = device
            .claim_interface(HID_INTERFACE)
            .await
            .map_err(hid_error)?;

        let ep_in = interface
            .endpoint::<Interrupt, _>(ENDPOINT_IN)
            .map_err(hid_error)?;
        let ep_out = interface
            .endpoint::<Interrupt, _>(ENDPOINT_OUT)
            .map_err(hid_error)?;

        Ok(Self {
            reader: ep_in.reader(HID_REPORT_SIZE).with_num_transfers(4),
            writer: ep_out.writer(HID_REPORT_SIZE).with_num_transfers(4),
            _interface: interface,
        })
    }
}

impl HidDevice for NusbHid {
    async fn write_report(&mut self, report: &[u8]) -> Result<()> {
        self.writer.write_all(report).await.map_err(hid_error)?;
        self.writer.flush().await.map_err(hid_error)?;
        Ok(())
    }

    async fn read_report(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reader.read(buf).await.map_err(hid_error)
    }
}
