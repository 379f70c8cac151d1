//! KNX protocol layers.
//!
//! The codec modules are transport-free: they parse and build the KNXnet/IP
//! envelope, the cEMI frames carried inside it, the connection-oriented
//! service frames, and the USB transfer framing. The transports in the
//! crate root drive them.

pub mod cemi;
pub mod constants;
pub mod frame;
pub mod property;
pub mod services;
pub mod usb_transfer;

pub use cemi::*;
pub use constants::*;
pub use frame::*;
pub use property::*;
pub use services::*;
pub use usb_transfer::*;
