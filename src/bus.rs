//! The transport-agnostic bus interface.
//!
//! Every transport (routing, tunneling, USB) hands the application the
//! same contract: open, close, send a cEMI frame, and receive a stream of
//! [`BusEvent`]s. Each transport instance is a single-task cooperative
//! state machine - the caller drives `recv` from one task, and all
//! protocol timers (heartbeat, busy window) are folded into that call.

use crate::error::{KnxError, Result};
use crate::protocol::cemi::CemiFrame;

/// An event surfaced by a bus interface.
#[derive(Debug)]
pub enum BusEvent {
    /// An accepted cEMI frame.
    Frame(CemiFrame),
    /// A non-fatal receive error (malformed datagram, bad cEMI). The
    /// offending data was dropped; the transport keeps running.
    Error(KnxError),
    /// A router reported dropped frames (routing only).
    LostMessage {
        /// Router device state.
        device_state: u8,
        /// Number of frames lost.
        lost: u16,
    },
    /// A router asked senders to back off (routing only). Pacing is the
    /// consumer's responsibility.
    Busy {
        /// Requested wait time in milliseconds.
        wait_time: u16,
        /// Busy control field.
        control: u16,
        /// Busy frames seen within the current busy window.
        count: u32,
    },
    /// The interface reported a reset (USB only).
    Reset,
}

/// Uniform bus-interface contract shared by all transports.
#[allow(async_fn_in_trait)]
pub trait BusInterface {
    /// Open the interface. Idempotent.
    async fn open(&mut self) -> Result<()>;

    /// Close the interface. Idempotent; after it returns no further events
    /// are delivered.
    async fn close(&mut self) -> Result<()>;

    /// Send one cEMI frame. Acknowledgement semantics are per transport:
    /// routing is fire-and-forget, tunneling awaits the per-frame ACK.
    async fn send(&mut self, frame: &CemiFrame) -> Result<()>;

    /// Receive the next event. Cancel-safe operation is not required; the
    /// transports expect a single driving task.
    async fn recv(&mut self) -> Result<BusEvent>;
}
