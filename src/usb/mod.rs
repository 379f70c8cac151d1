//! KNX USB transport.
//!
//! A KNX USB interface frames cEMI in the USB transfer protocol and ships
//! it in 64-byte HID reports. Opening the transport runs the common init
//! batch: reset the interface, select cEMI as the active EMI flavour via
//! the bus-access-server feature service, then write `PID_COMM_MODE` on
//! the cEMI server object to pick link layer or busmonitor. The init
//! sequence is vendor-sensitive; a HID failure while it runs aborts the
//! open.

pub mod hid;
#[cfg(feature = "usb")]
pub mod nusb;

#[doc(inline)]
pub use hid::{HidDevice, MockHid};
#[cfg(feature = "usb")]
#[doc(inline)]
pub use self::nusb::NusbHid;

use crate::bus::{BusEvent, BusInterface};
use crate::error::{KnxError, Result};
use crate::protocol::cemi::CemiFrame;
use crate::protocol::constants::{
    MessageCode, CEMI_SERVER_OBJECT, COMM_MODE_BUSMONITOR, COMM_MODE_LINK_LAYER, EmiId,
    FEATURE_ACTIVE_EMI_TYPE, PID_COMM_MODE,
};
use crate::protocol::property::PropertyFrame;
use crate::protocol::usb_transfer::{
    encode_reports, ReportAssembler, UsbTransferFrame, HID_REPORT_SIZE,
};
use log::debug;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};

/// USB transport configuration.
#[derive(Debug, Clone, Copy)]
pub struct UsbConfig {
    /// Run the interface as a busmonitor (receive-only).
    pub busmonitor: bool,
    /// Pause between init frames.
    pub init_delay: Duration,
    /// Wait budget for the comm-mode write confirmation; on expiry the
    /// open proceeds anyway (not every interface confirms).
    pub comm_mode_timeout: Duration,
    /// Wait budget for a property confirmation.
    pub response_timeout: Duration,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            busmonitor: false,
            init_delay: Duration::from_millis(100),
            comm_mode_timeout: Duration::from_millis(500),
            response_timeout: Duration::from_secs(5),
        }
    }
}

/// A bus interface over a KNX USB HID device.
pub struct UsbInterface<H: HidDevice> {
    hid: H,
    config: UsbConfig,
    assembler: ReportAssembler,
    /// Frames collected while a property call awaited its confirmation.
    pending: VecDeque<BusEvent>,
    open: bool,
}

impl<H: HidDevice> UsbInterface<H> {
    /// Create a USB interface over an opened HID device.
    pub fn new(hid: H, config: UsbConfig) -> Self {
        Self {
            hid,
            config,
            assembler: ReportAssembler::new(),
            pending: VecDeque::new(),
            open: false,
        }
    }

    /// True while the interface is open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Ship one USB transfer frame as HID reports.
    async fn write_transfer(&mut self, transfer: &UsbTransferFrame) -> Result<()> {
        for report in encode_reports(&transfer.to_bytes()) {
            self.hid.write_report(&report).await?;
        }
        Ok(())
    }

    /// Wrap a cEMI frame in the KNX tunnel protocol and ship it.
    async fn write_cemi(&mut self, cemi: &[u8]) -> Result<()> {
        self.write_transfer(&UsbTransferFrame::knx_tunnel(cemi)).await
    }

    /// Read reports until one USB transfer frame is assembled. Packets
    /// with an unparseable transfer header are logged and skipped.
    async fn read_transfer(&mut self) -> Result<UsbTransferFrame> {
        loop {
            let mut buf = [0u8; HID_REPORT_SIZE];
            let len = self.hid.read_report(&mut buf).await?;
            let Some(packet) = self.assembler.push(&buf[..len]) else {
                continue;
            };
            match UsbTransferFrame::parse(&packet) {
                Ok(transfer) => return Ok(transfer),
                Err(e) => debug!("usb: dropping unparseable transfer frame: {e}"),
            }
        }
    }

    /// Wait briefly for the comm-mode write confirmation; a silent
    /// interface is tolerated, an error confirmation or HID failure is
    /// not.
    async fn await_comm_mode_confirmation(&mut self, request: &PropertyFrame) -> Result<()> {
        let deadline = Instant::now() + self.config.comm_mode_timeout;
        loop {
            let transfer = match timeout_at(deadline, self.read_transfer()).await {
                Err(_) | Ok(Err(KnxError::ConnectionTimeout)) => {
                    debug!("usb: comm-mode write not confirmed, proceeding");
                    return Ok(());
                }
                Ok(Err(e)) => return Err(e),
                Ok(Ok(transfer)) => transfer,
            };
            if transfer.emi_message_code() != Some(MessageCode::MPropWriteCon.to_u8()) {
                // Bus traffic can already flow during init; keep it for
                // the consumer instead of dropping it.
                if let Some(event) = self.dispatch_transfer(transfer) {
                    self.pending.push_back(event);
                }
                continue;
            }
            let Ok(frame) = CemiFrame::parse(&transfer.body) else {
                continue;
            };
            let Some(confirmation) = frame.property() else {
                continue;
            };
            if !request.matches(confirmation) {
                continue;
            }
            if confirmation.is_error() {
                return Err(KnxError::PropertyError(confirmation.error_code()));
            }
            return Ok(());
        }
    }

    /// Property access over the USB link: send the request, collect the
    /// matching confirmation, queue bus traffic seen meanwhile.
    async fn property_call(
        &mut self,
        request_code: MessageCode,
        confirmation_code: MessageCode,
        request: PropertyFrame,
    ) -> Result<Vec<u8>> {
        if !self.open {
            return Err(KnxError::NotConnected);
        }
        let frame = CemiFrame::property_frame(request_code, request.clone());
        self.write_cemi(&frame.to_bytes()).await?;

        let deadline = Instant::now() + self.config.response_timeout;
        loop {
            let transfer = match timeout_at(deadline, self.read_transfer()).await {
                Err(_) | Ok(Err(KnxError::ConnectionTimeout)) => {
                    return Err(KnxError::ConnectionTimeout)
                }
                Ok(Err(e)) => return Err(e),
                Ok(Ok(transfer)) => transfer,
            };
            let Some(code) = transfer.emi_message_code() else {
                continue;
            };
            if code == confirmation_code.to_u8() {
                let Ok(frame) = CemiFrame::parse(&transfer.body) else {
                    continue;
                };
                if let Some(confirmation) = frame.property() {
                    if request.matches(confirmation) {
                        if confirmation.is_error() {
                            return Err(KnxError::PropertyError(confirmation.error_code()));
                        }
                        return Ok(confirmation.data.clone());
                    }
                }
                continue;
            }
            // Not our confirmation: feed it through the normal dispatch so
            // the consumer still sees the frame.
            if let Some(event) = self.dispatch_transfer(transfer) {
                self.pending.push_back(event);
            }
        }
    }

    /// Map one received transfer frame to a bus event, if it carries one.
    fn dispatch_transfer(&mut self, transfer: UsbTransferFrame) -> Option<BusEvent> {
        if transfer.is_feature_service() {
            debug!("usb: ignoring feature-service frame");
            return None;
        }
        let code = transfer.emi_message_code()?;
        match MessageCode::from_u8(code) {
            Some(MessageCode::MResetInd) => Some(BusEvent::Reset),
            Some(
                MessageCode::LDataInd | MessageCode::LDataCon | MessageCode::LBusmonInd,
            ) => match CemiFrame::parse(&transfer.body) {
                Ok(frame) => Some(BusEvent::Frame(frame)),
                Err(e) => Some(BusEvent::Error(e)),
            },
            Some(MessageCode::MPropReadCon | MessageCode::MPropWriteCon) => {
                debug!("usb: dropping unsolicited property confirmation");
                None
            }
            _ => {
                debug!("usb: ignoring EMI message code 0x{code:02X}");
                None
            }
        }
    }

    /// Read `elements` values of a property of the interface itself.
    pub async fn read_property(
        &mut self,
        object_type: u16,
        object_instance: u8,
        property_id: u8,
        elements: u8,
        start_index: u16,
    ) -> Result<Vec<u8>> {
        let request =
            PropertyFrame::new(object_type, object_instance, property_id, elements, start_index);
        self.property_call(MessageCode::MPropReadReq, MessageCode::MPropReadCon, request)
            .await
    }

    /// Write property data to the interface.
    pub async fn write_property(
        &mut self,
        object_type: u16,
        object_instance: u8,
        property_id: u8,
        elements: u8,
        start_index: u16,
        data: Vec<u8>,
    ) -> Result<()> {
        let request =
            PropertyFrame::new(object_type, object_instance, property_id, elements, start_index)
                .with_data(data);
        self.property_call(MessageCode::MPropWriteReq, MessageCode::MPropWriteCon, request)
            .await
            .map(|_| ())
    }
}

impl<H: HidDevice> BusInterface for UsbInterface<H> {
    /// Run the init batch: M_Reset.req, set active EMI to cEMI, write
    /// `PID_COMM_MODE`. Idempotent.
    async fn open(&mut self) -> Result<()> {
        if self.open {
            return Ok(());
        }

        let reset = CemiFrame::reset_frame(MessageCode::MResetReq);
        self.write_cemi(&reset.to_bytes()).await?;
        sleep(self.config.init_delay).await;

        let select_cemi =
            UsbTransferFrame::feature_set(FEATURE_ACTIVE_EMI_TYPE, &[EmiId::Cemi as u8]);
        self.write_transfer(&select_cemi).await?;
        sleep(self.config.init_delay).await;

        let mode = if self.config.busmonitor {
            COMM_MODE_BUSMONITOR
        } else {
            COMM_MODE_LINK_LAYER
        };
        let comm_mode = PropertyFrame::new(CEMI_SERVER_OBJECT, 1, PID_COMM_MODE, 1, 1)
            .with_data(vec![mode]);
        let frame = CemiFrame::property_frame(MessageCode::MPropWriteReq, comm_mode.clone());
        self.write_cemi(&frame.to_bytes()).await?;
        self.await_comm_mode_confirmation(&comm_mode).await?;

        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.hid.close();
        self.open = false;
        self.pending.clear();
        Ok(())
    }

    async fn send(&mut self, frame: &CemiFrame) -> Result<()> {
        if self.config.busmonitor {
            return Err(KnxError::InvalidMode);
        }
        if !self.open {
            return Err(KnxError::NotConnected);
        }
        self.write_cemi(&frame.to_bytes()).await
    }

    async fn recv(&mut self) -> Result<BusEvent> {
        loop {
            if !self.open {
                return Err(KnxError::NotConnected);
            }
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }
            let transfer = self.read_transfer().await?;
            if let Some(event) = self.dispatch_transfer(transfer) {
                return Ok(event);
            }
        }
    }
}
