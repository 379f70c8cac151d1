//! Common External Message Interface (cEMI) frame codec.
//!
//! cEMI is the neutral Layer-2 frame format carried inside every KNXnet/IP
//! data service and every USB transfer frame:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Message Code (1 byte)                    │
//! ├──────────────────────────────────────────┤
//! │ Additional Info Length (1 byte)          │
//! ├──────────────────────────────────────────┤
//! │ Additional Info (variable)               │
//! ├──────────────────────────────────────────┤
//! │ Service Information (variable)           │
//! └──────────────────────────────────────────┘
//! ```
//!
//! For L_Data frames the service information is either the standard layout
//! (control field 2 merged into the upper nibble of the length byte) or the
//! extended layout (a full control field 2 byte and a full length byte),
//! distinguished by the frame-type bit of control field 1:
//!
//! ```text
//! standard: CTRL1 | src (2) | dst (2) | CTRL2h·len | TPDU...
//! extended: CTRL1 | CTRL2 | src (2) | dst (2) | len | TPDU...
//! ```
//!
//! Frames parse once into an owned [`CemiFrame`]; the getters never go back
//! to the wire bytes, and [`CemiFrame::to_bytes`] reconstructs the exact
//! input for well-formed frames.

use crate::addressing::{GroupAddress, IndividualAddress};
use crate::error::{KnxError, Result};
use crate::protocol::constants::{MessageCode, Priority};
use crate::protocol::property::PropertyFrame;
use core::fmt;

// =============================================================================
// Control fields
// =============================================================================

/// Control field 1 of an L_Data frame.
///
/// ```text
/// Bit 7: Frame type (1=standard, 0=extended)
/// Bit 6: Reserved
/// Bit 5: Repeat (1=do not repeat)
/// Bit 4: System broadcast (1=broadcast)
/// Bit 3-2: Priority
/// Bit 1: Acknowledge requested
/// Bit 0: Confirm (1=error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlField1 {
    raw: u8,
}

impl From<u8> for ControlField1 {
    #[inline]
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl ControlField1 {
    /// Raw byte value.
    #[inline]
    pub const fn raw(self) -> u8 {
        self.raw
    }

    /// Standard frame (true) or extended frame (false).
    #[inline]
    pub const fn is_standard_frame(self) -> bool {
        (self.raw & 0x80) != 0
    }

    /// Repeat suppression flag.
    #[inline]
    pub const fn do_not_repeat(self) -> bool {
        (self.raw & 0x20) != 0
    }

    /// Broadcast (true) or system broadcast (false).
    #[inline]
    pub const fn is_broadcast(self) -> bool {
        (self.raw & 0x10) != 0
    }

    /// Frame priority.
    #[inline]
    pub const fn priority(self) -> Priority {
        Priority::from_u8((self.raw >> 2) & 0x03)
    }

    /// Layer-2 acknowledge requested.
    #[inline]
    pub const fn ack_requested(self) -> bool {
        (self.raw & 0x02) != 0
    }

    /// Confirmation error flag.
    #[inline]
    pub const fn has_error(self) -> bool {
        (self.raw & 0x01) != 0
    }

    /// Compose a control field 1.
    pub const fn new(
        standard_frame: bool,
        do_not_repeat: bool,
        broadcast: bool,
        priority: Priority,
        ack_requested: bool,
        confirm_error: bool,
    ) -> Self {
        let mut raw = (priority.to_u8() & 0x03) << 2;
        if standard_frame {
            raw |= 0x80;
        }
        if do_not_repeat {
            raw |= 0x20;
        }
        if broadcast {
            raw |= 0x10;
        }
        if ack_requested {
            raw |= 0x02;
        }
        if confirm_error {
            raw |= 0x01;
        }
        Self { raw }
    }
}

impl Default for ControlField1 {
    fn default() -> Self {
        // Standard frame, no repeat, broadcast, low priority: 0xBC
        Self { raw: 0xBC }
    }
}

/// Control field 2 of an L_Data frame.
///
/// ```text
/// Bit 7: Destination address type (1=group, 0=individual)
/// Bit 6-4: Hop count
/// Bit 3-0: Extended frame format (0 = standard)
/// ```
///
/// In standard frames only the upper nibble exists on the wire, merged with
/// the data length; the lower nibble reads as zero there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlField2 {
    raw: u8,
}

impl From<u8> for ControlField2 {
    #[inline]
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl ControlField2 {
    /// Raw byte value.
    #[inline]
    pub const fn raw(self) -> u8 {
        self.raw
    }

    /// Destination is a group address.
    #[inline]
    pub const fn is_group_address(self) -> bool {
        (self.raw & 0x80) != 0
    }

    /// Hop count (0-7).
    #[inline]
    pub const fn hop_count(self) -> u8 {
        (self.raw >> 4) & 0x07
    }

    /// Extended frame format bits.
    #[inline]
    pub const fn extended_format(self) -> u8 {
        self.raw & 0x0F
    }

    /// Compose a control field 2.
    pub const fn new(is_group: bool, hop_count: u8, extended_format: u8) -> Self {
        let mut raw = ((hop_count & 0x07) << 4) | (extended_format & 0x0F);
        if is_group {
            raw |= 0x80;
        }
        Self { raw }
    }
}

impl Default for ControlField2 {
    fn default() -> Self {
        // Group address, hop count 6: 0xE0
        Self { raw: 0xE0 }
    }
}

// =============================================================================
// Additional information
// =============================================================================

/// One additional-information entry (`{type, length, data}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionalInfo {
    /// Type code (PL/RF medium info, busmonitor status, timestamps, ...).
    pub kind: u8,
    /// Entry payload.
    pub data: Vec<u8>,
}

impl AdditionalInfo {
    /// Parse a block of entries covering exactly `block`.
    ///
    /// A malformed block (an entry overrunning it) parses as empty rather
    /// than failing: the optional data is discarded, the frame behind it
    /// stays usable.
    pub fn parse_block(block: &[u8]) -> Vec<AdditionalInfo> {
        let mut entries = Vec::new();
        let mut offset = 0;
        while offset < block.len() {
            if offset + 2 > block.len() {
                return Vec::new();
            }
            let kind = block[offset];
            let len = block[offset + 1] as usize;
            if offset + 2 + len > block.len() {
                return Vec::new();
            }
            entries.push(AdditionalInfo {
                kind,
                data: block[offset + 2..offset + 2 + len].to_vec(),
            });
            offset += 2 + len;
        }
        entries
    }

    /// Encoded size of this entry.
    pub fn encoded_len(&self) -> usize {
        2 + self.data.len()
    }
}

// =============================================================================
// L_Data service information
// =============================================================================

/// Parsed L_Data service information.
///
/// `data_len` is the raw length-field value and `tpdu` holds the TPCI/APCI
/// byte(s) plus application payload verbatim, so re-encoding a parsed frame
/// is byte-exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LData {
    /// Control field 1.
    pub ctrl1: ControlField1,
    /// Control field 2 (reconstructed from the merged nibble on standard
    /// frames).
    pub ctrl2: ControlField2,
    /// Source individual address.
    pub source: IndividualAddress,
    /// Raw destination; interpret via [`LData::is_group_address`].
    pub destination: u16,
    /// Raw length field (application payload length).
    pub data_len: u8,
    /// TPCI/APCI byte(s) and application payload.
    pub tpdu: Vec<u8>,
}

impl LData {
    /// Minimum service-information size of a standard frame.
    pub const MIN_SIZE: usize = 6;

    /// Parse L_Data service information.
    pub fn parse(service: &[u8]) -> Result<Self> {
        if service.is_empty() {
            return Err(KnxError::BadCemi);
        }
        let ctrl1 = ControlField1::from(service[0]);

        if ctrl1.is_standard_frame() {
            if service.len() < Self::MIN_SIZE {
                return Err(KnxError::BadCemi);
            }
            let merged = service[5];
            Ok(Self {
                ctrl1,
                ctrl2: ControlField2::from(merged & 0xF0),
                source: IndividualAddress::from(u16::from_be_bytes([service[1], service[2]])),
                destination: u16::from_be_bytes([service[3], service[4]]),
                data_len: merged & 0x0F,
                tpdu: service[6..].to_vec(),
            })
        } else {
            if service.len() < 7 {
                return Err(KnxError::BadCemi);
            }
            Ok(Self {
                ctrl1,
                ctrl2: ControlField2::from(service[1]),
                source: IndividualAddress::from(u16::from_be_bytes([service[2], service[3]])),
                destination: u16::from_be_bytes([service[4], service[5]]),
                data_len: service[6],
                tpdu: service[7..].to_vec(),
            })
        }
    }

    /// Append the encoded service information to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.ctrl1.raw());
        if self.ctrl1.is_standard_frame() {
            out.extend_from_slice(&u16::from(self.source).to_be_bytes());
            out.extend_from_slice(&self.destination.to_be_bytes());
            out.push((self.ctrl2.raw() & 0xF0) | (self.data_len & 0x0F));
        } else {
            out.push(self.ctrl2.raw());
            out.extend_from_slice(&u16::from(self.source).to_be_bytes());
            out.extend_from_slice(&self.destination.to_be_bytes());
            out.push(self.data_len);
        }
        out.extend_from_slice(&self.tpdu);
    }

    /// Encoded size of the service information.
    pub fn encoded_len(&self) -> usize {
        let fixed = if self.ctrl1.is_standard_frame() { 6 } else { 7 };
        fixed + self.tpdu.len()
    }

    /// Frame priority (control field 1).
    #[inline]
    pub const fn priority(&self) -> Priority {
        self.ctrl1.priority()
    }

    /// Hop count (control field 2).
    #[inline]
    pub const fn hop_count(&self) -> u8 {
        self.ctrl2.hop_count()
    }

    /// Destination is a group address (control field 2).
    #[inline]
    pub const fn is_group_address(&self) -> bool {
        self.ctrl2.is_group_address()
    }

    /// TPCI: top six bits of the first TPDU byte.
    pub fn tpci(&self) -> u8 {
        self.tpdu.first().map_or(0, |b| b >> 2)
    }

    /// APCI: ten bits spanning the first two TPDU bytes.
    pub fn apci(&self) -> u16 {
        match self.tpdu.as_slice() {
            [] => 0,
            [b0] => (u16::from(*b0) & 0x03) << 8,
            [b0, b1, ..] => ((u16::from(*b0) & 0x03) << 8) | u16::from(*b1),
        }
    }

    /// Application payload after the TPCI/APCI bytes. For short-APCI frames
    /// the single payload byte is embedded in the APCI byte and this slice
    /// is empty.
    pub fn application_data(&self) -> &[u8] {
        if self.tpdu.len() > 2 {
            &self.tpdu[2..]
        } else {
            &[]
        }
    }

    /// Destination as a group address, if the group bit is set.
    pub fn destination_group(&self) -> Option<GroupAddress> {
        self.is_group_address()
            .then(|| GroupAddress::from(self.destination))
    }

    /// Destination as an individual address, if the group bit is clear.
    pub fn destination_individual(&self) -> Option<IndividualAddress> {
        (!self.is_group_address()).then(|| IndividualAddress::from(self.destination))
    }
}

// =============================================================================
// cEMI frame
// =============================================================================

/// Service information of a cEMI frame, keyed by the message code family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CemiBody {
    /// L_Data request / indication / confirmation.
    LData(LData),
    /// L_Busmon.ind: the raw bus frame as seen by the monitor.
    Busmon(Vec<u8>),
    /// M_PropRead / M_PropWrite services.
    Property(PropertyFrame),
    /// M_Reset services carry no service information.
    Reset,
}

/// A parsed cEMI frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CemiFrame {
    /// Message code.
    pub message_code: MessageCode,
    /// Parsed additional-information entries (empty for malformed blocks).
    pub additional_info: Vec<AdditionalInfo>,
    /// Service information.
    pub body: CemiBody,
}

impl CemiFrame {
    /// Minimum cEMI frame size (message code + additional info length).
    pub const MIN_SIZE: usize = 2;

    /// Parse a cEMI frame.
    ///
    /// # Errors
    ///
    /// [`KnxError::BadCemi`] when the buffer is shorter than two bytes, the
    /// message code is unknown, or the service information is too short for
    /// its message code. A malformed additional-information block is *not*
    /// an error; it parses as empty.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::MIN_SIZE {
            return Err(KnxError::BadCemi);
        }
        let message_code = MessageCode::from_u8(bytes[0]).ok_or(KnxError::BadCemi)?;

        let declared = bytes[1] as usize;
        let (additional_info, service_start) = if declared == 0 {
            (Vec::new(), 2)
        } else if 2 + declared <= bytes.len() {
            (AdditionalInfo::parse_block(&bytes[2..2 + declared]), 2 + declared)
        } else {
            // Length overruns the buffer: report the block as empty instead
            // of desynchronising the rest of the frame.
            (Vec::new(), 2)
        };

        let service = &bytes[service_start..];
        let body = match message_code {
            MessageCode::LDataReq | MessageCode::LDataInd | MessageCode::LDataCon => {
                CemiBody::LData(LData::parse(service)?)
            }
            MessageCode::LBusmonInd => CemiBody::Busmon(service.to_vec()),
            MessageCode::MPropReadReq
            | MessageCode::MPropReadCon
            | MessageCode::MPropWriteReq
            | MessageCode::MPropWriteCon => CemiBody::Property(PropertyFrame::parse(service)?),
            MessageCode::MResetReq | MessageCode::MResetInd => CemiBody::Reset,
        };

        Ok(Self {
            message_code,
            additional_info,
            body,
        })
    }

    /// Quick structural check without building a frame: known message code,
    /// and for the L_Data family enough bytes for the service information.
    pub fn is_valid(bytes: &[u8]) -> bool {
        if bytes.len() < Self::MIN_SIZE {
            return false;
        }
        let Some(code) = MessageCode::from_u8(bytes[0]) else {
            return false;
        };
        let declared = bytes[1] as usize;
        let service_start = if 2 + declared <= bytes.len() { 2 + declared } else { 2 };
        if code.is_ldata() {
            bytes.len() >= service_start + LData::MIN_SIZE
        } else {
            true
        }
    }

    /// Encode the frame.
    pub fn to_bytes(&self) -> Vec<u8> {
        let info_len: usize = self.additional_info.iter().map(AdditionalInfo::encoded_len).sum();
        let body_len = match &self.body {
            CemiBody::LData(l) => l.encoded_len(),
            CemiBody::Busmon(d) => d.len(),
            CemiBody::Property(p) => p.encoded_len(),
            CemiBody::Reset => 0,
        };

        let mut out = Vec::with_capacity(2 + info_len + body_len);
        out.push(self.message_code.to_u8());
        out.push(info_len as u8);
        for entry in &self.additional_info {
            out.push(entry.kind);
            out.push(entry.data.len() as u8);
            out.extend_from_slice(&entry.data);
        }
        match &self.body {
            CemiBody::LData(l) => l.encode(&mut out),
            CemiBody::Busmon(d) => out.extend_from_slice(d),
            CemiBody::Property(p) => p.encode(&mut out),
            CemiBody::Reset => {}
        }
        out
    }

    /// The L_Data service information, if this is an L_Data frame.
    pub fn ldata(&self) -> Option<&LData> {
        match &self.body {
            CemiBody::LData(l) => Some(l),
            _ => None,
        }
    }

    /// The property frame, if this is an M_Prop service.
    pub fn property(&self) -> Option<&PropertyFrame> {
        match &self.body {
            CemiBody::Property(p) => Some(p),
            _ => None,
        }
    }

    /// Build a standard L_Data frame with the given message code.
    ///
    /// `tpdu` carries the TPCI/APCI byte(s) plus application payload; the
    /// length field is set to `tpdu.len()`.
    pub fn ldata_frame(
        message_code: MessageCode,
        source: IndividualAddress,
        destination: u16,
        group: bool,
        priority: Priority,
        hop_count: u8,
        tpdu: Vec<u8>,
    ) -> Self {
        let data_len = tpdu.len() as u8;
        Self {
            message_code,
            additional_info: Vec::new(),
            body: CemiBody::LData(LData {
                ctrl1: ControlField1::new(true, true, true, priority, false, false),
                ctrl2: ControlField2::new(group, hop_count, 0),
                source,
                destination,
                data_len,
                tpdu,
            }),
        }
    }

    /// Build an M_Prop frame.
    pub fn property_frame(message_code: MessageCode, property: PropertyFrame) -> Self {
        Self {
            message_code,
            additional_info: Vec::new(),
            body: CemiBody::Property(property),
        }
    }

    /// Build an M_Reset frame.
    pub fn reset_frame(message_code: MessageCode) -> Self {
        Self {
            message_code,
            additional_info: Vec::new(),
            body: CemiBody::Reset,
        }
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{b:02X}")?;
    }
    Ok(())
}

impl fmt::Display for CemiFrame {
    /// Stable single-line rendering, e.g.
    /// `L_Data.ind prio=low hop=6 1.1.1 -> 1/2/3 len=2 data=00 80`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            CemiBody::LData(l) => {
                write!(
                    f,
                    "{} prio={} hop={} {} -> ",
                    self.message_code,
                    l.priority(),
                    l.hop_count(),
                    l.source
                )?;
                if let Some(group) = l.destination_group() {
                    write!(f, "{group}")?;
                } else {
                    write!(f, "{}", IndividualAddress::from(l.destination))?;
                }
                write!(f, " len={} data=", l.data_len)?;
                write_hex(f, &l.tpdu)
            }
            CemiBody::Busmon(data) => {
                write!(f, "{} len={} data=", self.message_code, data.len())?;
                write_hex(f, data)
            }
            CemiBody::Property(p) => {
                write!(
                    f,
                    "{} obj={:#06X} inst={} pid={} elems={} start={} data=",
                    self.message_code,
                    p.object_type,
                    p.object_instance,
                    p.property_id,
                    p.elements,
                    p.start_index
                )?;
                write_hex(f, &p.data)
            }
            CemiBody::Reset => write!(f, "{}", self.message_code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_field1_semantics() {
        // 0xBC: standard, do-not-repeat, broadcast, low priority
        let ctrl = ControlField1::from(0xBCu8);
        assert!(ctrl.is_standard_frame());
        assert!(ctrl.do_not_repeat());
        assert!(ctrl.is_broadcast());
        assert_eq!(ctrl.priority(), Priority::Low);
        assert!(!ctrl.ack_requested());
        assert!(!ctrl.has_error());

        let composed = ControlField1::new(true, true, true, Priority::Low, false, false);
        assert_eq!(composed.raw(), 0xBC);
    }

    #[test]
    fn control_field2_semantics() {
        let ctrl = ControlField2::new(true, 6, 0);
        assert_eq!(ctrl.raw(), 0xE0);
        assert!(ctrl.is_group_address());
        assert_eq!(ctrl.hop_count(), 6);
        assert_eq!(ctrl.extended_format(), 0);
    }

    #[test]
    fn parse_standard_ldata_ind() {
        let bytes = [0x29, 0x00, 0xBC, 0xD0, 0x11, 0x04, 0x01, 0x00, 0x00, 0x81];
        let frame = CemiFrame::parse(&bytes).unwrap();
        assert_eq!(frame.message_code, MessageCode::LDataInd);
        assert!(frame.additional_info.is_empty());

        let ldata = frame.ldata().unwrap();
        assert!(ldata.ctrl1.is_standard_frame());
        assert_eq!(ldata.ctrl1.raw(), 0xBC);
        assert_eq!(ldata.priority(), Priority::Low);
        assert_eq!(ldata.hop_count(), 0);
        assert_eq!(ldata.source.to_string(), "13.0.17");
        assert!(!ldata.is_group_address());
        assert_eq!(
            ldata.destination_individual().unwrap().to_string(),
            "0.4.1"
        );
        assert_eq!(ldata.data_len, 0);
        assert!(ldata.application_data().is_empty());
        assert_eq!(ldata.tpci(), 0);
        assert_eq!(ldata.apci(), 0x081);

        // Byte-exact round trip
        assert_eq!(frame.to_bytes(), bytes);
    }

    #[test]
    fn parse_with_additional_info() {
        let bytes = [
            0x29, 0x04, 0x03, 0x02, 0x12, 0x34, 0xBC, 0xD0, 0x11, 0x04, 0x01, 0x00, 0x81,
        ];
        let frame = CemiFrame::parse(&bytes).unwrap();
        assert_eq!(frame.additional_info.len(), 1);
        assert_eq!(frame.additional_info[0].kind, 0x03);
        assert_eq!(frame.additional_info[0].data, [0x12, 0x34]);

        let ldata = frame.ldata().unwrap();
        assert_eq!(ldata.source.to_string(), "13.0.17");
        assert_eq!(ldata.destination, 0x0401);
        assert_eq!(ldata.data_len, 0);

        assert_eq!(frame.to_bytes(), bytes);
    }

    #[test]
    fn parse_group_destination() {
        let bytes = [0x29, 0x00, 0xFC, 0xD0, 0x11, 0x04, 0x01, 0x81, 0x00, 0x80];
        let frame = CemiFrame::parse(&bytes).unwrap();
        let ldata = frame.ldata().unwrap();
        assert!(ldata.is_group_address());
        assert_eq!(ldata.destination_group().unwrap().to_string(), "0/4/1");
        assert_eq!(ldata.data_len, 1);
        assert_eq!(frame.to_bytes(), bytes);
    }

    #[test]
    fn build_round_trip() {
        let frame = CemiFrame::ldata_frame(
            MessageCode::LDataReq,
            IndividualAddress::from(0x1101u16),
            0x0801,
            true,
            Priority::Low,
            6,
            vec![0x00, 0x80],
        );
        let bytes = frame.to_bytes();
        let parsed = CemiFrame::parse(&bytes).unwrap();
        assert_eq!(parsed, frame);

        let ldata = parsed.ldata().unwrap();
        assert_eq!(u16::from(ldata.source), 0x1101);
        assert_eq!(ldata.destination, 0x0801);
        assert_eq!(ldata.data_len, 2);
        assert_eq!(ldata.priority(), Priority::Low);
        assert_eq!(ldata.hop_count(), 6);
    }

    #[test]
    fn extended_frame_offsets() {
        // CTRL1 0x3C: frame-type bit clear, so CTRL2 is a full byte and the
        // length field a full byte further out.
        let bytes = [
            0x29, 0x00, 0x3C, 0xE0, 0x11, 0x01, 0x0A, 0x03, 0x03, 0x00, 0x80, 0x0D,
        ];
        let frame = CemiFrame::parse(&bytes).unwrap();
        let ldata = frame.ldata().unwrap();
        assert!(!ldata.ctrl1.is_standard_frame());
        assert_eq!(ldata.source.to_string(), "1.1.1");
        assert_eq!(ldata.destination_group().unwrap().to_string(), "1/2/3");
        assert_eq!(ldata.hop_count(), 6);
        assert_eq!(ldata.data_len, 3);
        assert_eq!(ldata.tpdu, [0x00, 0x80, 0x0D]);
        assert_eq!(ldata.application_data(), [0x0D]);
        assert_eq!(frame.to_bytes(), bytes);
    }

    #[test]
    fn add_info_overrun_parses_as_empty() {
        // Declared additional-info length far beyond the buffer: the block
        // reads as empty and the service info follows at offset 2.
        let bytes = [0x29, 0xFF, 0xBC, 0xD0, 0x11, 0x04, 0x01, 0x00, 0x00, 0x81];
        let frame = CemiFrame::parse(&bytes).unwrap();
        assert!(frame.additional_info.is_empty());
        assert_eq!(frame.ldata().unwrap().source.to_string(), "13.0.17");
    }

    #[test]
    fn malformed_add_info_entries_parse_as_empty() {
        // Block length fits, but the single entry overruns it.
        let bytes = [
            0x29, 0x03, 0x03, 0x05, 0xAA, 0xBC, 0xD0, 0x11, 0x04, 0x01, 0x00, 0x81,
        ];
        let frame = CemiFrame::parse(&bytes).unwrap();
        assert!(frame.additional_info.is_empty());
        assert_eq!(frame.ldata().unwrap().destination, 0x0401);
    }

    #[test]
    fn reset_frames_are_two_bytes() {
        let frame = CemiFrame::parse(&[0xF1, 0x00]).unwrap();
        assert_eq!(frame.message_code, MessageCode::MResetReq);
        assert_eq!(frame.body, CemiBody::Reset);
        assert_eq!(frame.to_bytes(), vec![0xF1, 0x00]);
        assert!(CemiFrame::is_valid(&[0xF1, 0x00]));
    }

    #[test]
    fn validity_boundaries() {
        // Too short
        assert!(!CemiFrame::is_valid(&[0x29]));
        // Unknown message code
        assert!(!CemiFrame::is_valid(&[0x42, 0x00, 0xBC]));
        // L_Data code without service info
        assert!(!CemiFrame::is_valid(&[0x29, 0x00]));
        assert!(CemiFrame::parse(&[0x29, 0x00]).is_err());
        // Minimal standard frame
        assert!(CemiFrame::is_valid(&[0x29, 0x00, 0xBC, 0x11, 0x01, 0x0A, 0x03, 0x00]));
    }

    #[test]
    fn busmon_round_trip() {
        let bytes = [0x2B, 0x00, 0xCC, 0x11, 0x01, 0x0A, 0x03, 0xE1, 0x00, 0x81, 0x3F];
        let frame = CemiFrame::parse(&bytes).unwrap();
        assert!(matches!(frame.body, CemiBody::Busmon(_)));
        assert_eq!(frame.to_bytes(), bytes);
    }

    #[test]
    fn property_frame_round_trip() {
        let bytes = [0xFC, 0x00, 0x00, 0x08, 0x01, 0x34, 0x10, 0x01];
        let frame = CemiFrame::parse(&bytes).unwrap();
        let prop = frame.property().unwrap();
        assert_eq!(prop.object_type, 0x0008);
        assert_eq!(prop.property_id, 52);
        assert_eq!(prop.elements, 1);
        assert_eq!(prop.start_index, 1);
        assert_eq!(frame.to_bytes(), bytes);
    }

    #[test]
    fn display_line() {
        let bytes = [0x29, 0x00, 0xFC, 0xD0, 0x11, 0x04, 0x01, 0x81, 0x00, 0x80];
        let frame = CemiFrame::parse(&bytes).unwrap();
        let line = frame.to_string();
        assert_eq!(line, "L_Data.ind prio=low hop=0 13.0.17 -> 0/4/1 len=1 data=00 80");
    }
}
