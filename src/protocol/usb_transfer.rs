//! KNX USB transfer protocol and HID report framing.
//!
//! A cEMI frame travels to a KNX USB interface inside two nested layers:
//!
//! ```text
//! HID report (64 bytes, fixed)
//! ┌───────────┬──────────────────────┬──────────┬──────────────┐
//! │ report id │ seq (4) · pkg type(4)│ body len │ body ...     │
//! └───────────┴──────────────────────┴──────────┴──────────────┘
//!                body = (a slice of) a USB transfer frame:
//! ┌──────────┬────────────┬──────────┬─────────────┬────────┬──────────────┐
//! │ ver 0x00 │ hdrlen 0x08│ body len │ protocol id │ EMI id │ manufacturer │
//! └──────────┴────────────┴──────────┴─────────────┴────────┴──────────────┘
//!                body[0] = EMI message code, body[1..] = rest of the cEMI frame
//! ```
//!
//! Transfer frames longer than one report body are split across reports;
//! the package-type bits mark the first and last slice. [`ReportAssembler`]
//! reverses the split on the receive path.

use crate::error::{KnxError, Result};
use crate::protocol::constants::{
    EmiId, FEATURE_SET, USB_HEADER_LENGTH, USB_PROTOCOL_FEATURE_SERVICE, USB_PROTOCOL_KNX_TUNNEL,
    USB_PROTOCOL_VERSION,
};

/// Fixed size of a KNX HID report.
pub const HID_REPORT_SIZE: usize = 64;

/// Report id used by KNX USB interfaces.
pub const HID_REPORT_ID: u8 = 0x01;

/// Maximum body bytes per report (64 minus the 3-byte report header).
pub const HID_MAX_BODY: usize = 61;

/// Package-type bit: first report of a packet.
pub const PACKAGE_START: u8 = 0x01;

/// Package-type bit: last report of a packet.
pub const PACKAGE_END: u8 = 0x02;

/// Split a USB transfer frame into zero-padded 64-byte HID reports.
///
/// The 4-bit sequence counter starts at 1 and the start/end bits mark the
/// packet boundaries; a frame that fits one report carries both bits.
pub fn encode_reports(transfer: &[u8]) -> Vec<[u8; HID_REPORT_SIZE]> {
    let chunks: Vec<&[u8]> = transfer.chunks(HID_MAX_BODY).collect();
    let mut reports = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let mut package_type = 0;
        if i == 0 {
            package_type |= PACKAGE_START;
        }
        if i == chunks.len() - 1 {
            package_type |= PACKAGE_END;
        }
        let seq = ((i as u8 + 1) & 0x0F) << 4;

        let mut report = [0u8; HID_REPORT_SIZE];
        report[0] = HID_REPORT_ID;
        report[1] = seq | package_type;
        report[2] = chunk.len() as u8;
        report[3..3 + chunk.len()].copy_from_slice(chunk);
        reports.push(report);
    }
    reports
}

/// Reassembles USB transfer frames from a stream of HID reports.
#[derive(Debug, Default)]
pub struct ReportAssembler {
    buf: Vec<u8>,
    active: bool,
}

impl ReportAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one received report.
    ///
    /// Returns the assembled transfer frame when the end bit is seen. A
    /// start bit always replaces the buffer, so a packet interrupted
    /// mid-stream is discarded when the next one begins. Reports with a
    /// foreign report id or continuation reports without a preceding start
    /// are ignored.
    pub fn push(&mut self, report: &[u8]) -> Option<Vec<u8>> {
        if report.len() < 3 || report[0] != HID_REPORT_ID {
            return None;
        }
        let package_type = report[1] & 0x0F;
        let body_len = report[2] as usize;
        let Some(body) = report.get(3..3 + body_len) else {
            self.active = false;
            self.buf.clear();
            return None;
        };

        if package_type & PACKAGE_START != 0 {
            self.buf.clear();
            self.buf.extend_from_slice(body);
            self.active = true;
        } else if self.active {
            self.buf.extend_from_slice(body);
        } else {
            return None;
        }

        if package_type & PACKAGE_END != 0 {
            self.active = false;
            return Some(core::mem::take(&mut self.buf));
        }
        None
    }
}

/// A KNX USB transfer protocol frame.
///
/// For the KNX tunnel protocol `emi_id` names the EMI flavour of the body;
/// for the bus-access-server feature protocol the same slot carries the
/// feature service identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbTransferFrame {
    /// Protocol id (KNX tunnel or feature service).
    pub protocol_id: u8,
    /// EMI id, or feature service id on the feature protocol.
    pub emi_id: u8,
    /// Manufacturer code, 0 for standard frames.
    pub manufacturer: u16,
    /// Frame body. On the KNX tunnel protocol this is the complete cEMI
    /// frame, starting with its message code.
    pub body: Vec<u8>,
}

impl UsbTransferFrame {
    /// Transfer protocol header size.
    pub const HEADER_SIZE: usize = USB_HEADER_LENGTH as usize;

    /// Wrap a cEMI frame for the KNX tunnel protocol.
    pub fn knx_tunnel(cemi: &[u8]) -> Self {
        Self {
            protocol_id: USB_PROTOCOL_KNX_TUNNEL,
            emi_id: EmiId::Cemi as u8,
            manufacturer: 0,
            body: cemi.to_vec(),
        }
    }

    /// Build a bus-access-server "feature set" frame.
    pub fn feature_set(feature_id: u8, value: &[u8]) -> Self {
        let mut body = Vec::with_capacity(1 + value.len());
        body.push(feature_id);
        body.extend_from_slice(value);
        Self {
            protocol_id: USB_PROTOCOL_FEATURE_SERVICE,
            emi_id: FEATURE_SET,
            manufacturer: 0,
            body,
        }
    }

    /// Parse a transfer frame.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::HEADER_SIZE {
            return Err(KnxError::LengthMismatch);
        }
        if data[0] != USB_PROTOCOL_VERSION {
            return Err(KnxError::BadVersion);
        }
        if data[1] != USB_HEADER_LENGTH {
            return Err(KnxError::BadHeader);
        }
        let body_len = u16::from_be_bytes([data[2], data[3]]) as usize;
        if data.len() < Self::HEADER_SIZE + body_len {
            return Err(KnxError::LengthMismatch);
        }
        Ok(Self {
            protocol_id: data[4],
            emi_id: data[5],
            manufacturer: u16::from_be_bytes([data[6], data[7]]),
            body: data[Self::HEADER_SIZE..Self::HEADER_SIZE + body_len].to_vec(),
        })
    }

    /// Encode the transfer frame.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER_SIZE + self.body.len());
        out.push(USB_PROTOCOL_VERSION);
        out.push(USB_HEADER_LENGTH);
        out.extend_from_slice(&(self.body.len() as u16).to_be_bytes());
        out.push(self.protocol_id);
        out.push(self.emi_id);
        out.extend_from_slice(&self.manufacturer.to_be_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    /// True for KNX tunnel frames (EMI payload).
    pub fn is_knx_tunnel(&self) -> bool {
        self.protocol_id == USB_PROTOCOL_KNX_TUNNEL
    }

    /// True for bus-access-server feature frames.
    pub fn is_feature_service(&self) -> bool {
        self.protocol_id == USB_PROTOCOL_FEATURE_SERVICE
    }

    /// The EMI message code: first body byte of a KNX tunnel frame.
    pub fn emi_message_code(&self) -> Option<u8> {
        if self.is_knx_tunnel() {
            self.body.first().copied()
        } else {
            None
        }
    }
}
