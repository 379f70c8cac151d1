//! Error types for KNX operations.
//!
//! One flat error enum covers the whole crate: envelope and cEMI parse
//! failures, connection lifecycle errors and the I/O errors of the
//! underlying transports. Inbound parse failures never tear a transport
//! down; they are contained by the receive loops and surfaced as
//! non-fatal [`BusEvent::Error`](crate::bus::BusEvent) events. Lifecycle
//! errors propagate to the awaiting caller.

use core::fmt;

/// Result type alias for KNX operations.
pub type Result<T> = core::result::Result<T, KnxError>;

/// KNX protocol and transport error.
#[derive(Debug)]
pub enum KnxError {
    /// KNXnet/IP header length field is not 0x06.
    BadHeader,
    /// KNXnet/IP protocol version is not 0x10.
    BadVersion,
    /// Datagram shorter than the total length announced by its header.
    LengthMismatch,
    /// cEMI frame too short or unparseable.
    BadCemi,
    /// KNXnet/IP service type this endpoint does not handle.
    UnknownServiceType(u16),
    /// Caller-provided buffer cannot hold the encoded structure.
    BufferTooSmall,
    /// Frame body exceeds the maximum KNXnet/IP frame size.
    PayloadTooLarge,
    /// Individual or group address component out of range.
    InvalidAddress,
    /// The expected response or acknowledgement did not arrive in time.
    ConnectionTimeout,
    /// CONNECT_RESPONSE carried a non-zero status code.
    ConnectionRefused(u8),
    /// TUNNELLING_ACK or DEVICE_CONFIGURATION_ACK carried a non-zero status.
    AckError(u8),
    /// Heartbeat failed or the peer closed the connection.
    ConnectionLost,
    /// Operation requires an open connection.
    NotConnected,
    /// Operation not permitted in the selected layer (e.g. send in busmonitor).
    InvalidMode,
    /// Property access confirmation reported an error code.
    PropertyError(u8),
    /// Failure of the underlying HID device.
    Hid(String),
    /// Socket-level I/O failure.
    Io(std::io::Error),
}

impl fmt::Display for KnxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnxError::BadHeader => write!(f, "invalid KNXnet/IP header"),
            KnxError::BadVersion => write!(f, "unsupported KNXnet/IP protocol version"),
            KnxError::LengthMismatch => write!(f, "KNXnet/IP frame length mismatch"),
            KnxError::BadCemi => write!(f, "invalid cEMI frame"),
            KnxError::UnknownServiceType(s) => write!(f, "unknown service type 0x{s:04X}"),
            KnxError::BufferTooSmall => write!(f, "buffer too small"),
            KnxError::PayloadTooLarge => write!(f, "payload too large"),
            KnxError::InvalidAddress => write!(f, "invalid KNX address"),
            KnxError::ConnectionTimeout => write!(f, "connection timeout"),
            KnxError::ConnectionRefused(status) => {
                write!(f, "connection refused (status 0x{status:02X})")
            }
            KnxError::AckError(status) => {
                write!(f, "request not acknowledged (status 0x{status:02X})")
            }
            KnxError::ConnectionLost => write!(f, "connection lost"),
            KnxError::NotConnected => write!(f, "not connected"),
            KnxError::InvalidMode => write!(f, "operation not allowed in this mode"),
            KnxError::PropertyError(code) => {
                write!(f, "property access failed (code 0x{code:02X})")
            }
            KnxError::Hid(msg) => write!(f, "HID device error: {msg}"),
            KnxError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for KnxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KnxError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KnxError {
    fn from(e: std::io::Error) -> Self {
        KnxError::Io(e)
    }
}

impl KnxError {
    /// True for errors that a receive loop contains (frame dropped,
    /// `error` event emitted) rather than propagates.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            KnxError::BadHeader
                | KnxError::BadVersion
                | KnxError::LengthMismatch
                | KnxError::BadCemi
                | KnxError::UnknownServiceType(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status_codes() {
        let msg = KnxError::ConnectionRefused(0x24).to_string();
        assert!(msg.contains("0x24"));

        let msg = KnxError::UnknownServiceType(0x0533).to_string();
        assert!(msg.contains("0x0533"));
    }

    #[test]
    fn parse_errors_are_contained() {
        assert!(KnxError::BadCemi.is_parse_error());
        assert!(KnxError::LengthMismatch.is_parse_error());
        assert!(!KnxError::ConnectionLost.is_parse_error());
        assert!(!KnxError::NotConnected.is_parse_error());
    }
}
