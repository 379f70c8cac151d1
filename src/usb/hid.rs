//! HID device capability trait.
//!
//! The USB transport only needs to exchange fixed-size HID reports; device
//! enumeration and endpoint plumbing stay behind this trait the same way
//! sockets stay behind [`AsyncTransport`](crate::net::AsyncTransport).
//! The `usb` cargo feature supplies a nusb-backed implementation;
//! [`MockHid`] scripts exchanges for tests.

use crate::error::{KnxError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Shared record of written reports, in order.
pub type WrittenLog = Arc<Mutex<Vec<Vec<u8>>>>;

/// Shared queue of input reports awaiting delivery.
pub type ReportQueue = Arc<Mutex<VecDeque<Vec<u8>>>>;

/// A HID device exchanging 64-byte KNX reports.
#[allow(async_fn_in_trait)]
pub trait HidDevice {
    /// Write one output report.
    async fn write_report(&mut self, report: &[u8]) -> Result<()>;

    /// Read one input report into `buf`, returning its length.
    async fn read_report(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Release the device. Default is a no-op for devices that close on
    /// drop.
    fn close(&mut self) {}
}

/// Scripted [`HidDevice`] for tests, mirroring
/// [`MockTransport`](crate::net::MockTransport): queued reports replay in
/// FIFO order, writes are recorded, and an exhausted queue reports
/// [`KnxError::ConnectionTimeout`].
#[derive(Debug, Default)]
pub struct MockHid {
    reports: ReportQueue,
    written: WrittenLog,
    closed: bool,
}

impl MockHid {
    /// Create an empty mock device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an input report.
    pub fn add_report(&mut self, report: Vec<u8>) {
        self.reports.lock().unwrap().push_back(report);
    }

    /// Handle on the input queue; lets a test feed reports after the
    /// device moved into a transport.
    pub fn report_queue(&self) -> ReportQueue {
        Arc::clone(&self.reports)
    }

    /// Handle on the written-report log; survives handing the device to a
    /// transport.
    pub fn written_log(&self) -> WrittenLog {
        Arc::clone(&self.written)
    }

    /// Snapshot of all reports written so far.
    pub fn written_reports(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl HidDevice for MockHid {
    async fn write_report(&mut self, report: &[u8]) -> Result<()> {
        self.written.lock().unwrap().push(report.to_vec());
        Ok(())
    }

    async fn read_report(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.reports.lock().unwrap().pop_front() {
            Some(report) => {
                let len = report.len().min(buf.len());
                buf[..len].copy_from_slice(&report[..len]);
                Ok(len)
            }
            None => Err(KnxError::ConnectionTimeout),
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.reports.lock().unwrap().clear();
    }
}
