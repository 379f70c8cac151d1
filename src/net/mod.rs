//! Network transport layer.
//!
//! OS sockets stay behind the [`AsyncTransport`] trait; the protocol state
//! machines are generic over it and never name a socket type.

pub mod mock;
pub mod transport;
pub mod udp;

#[doc(inline)]
pub use mock::MockTransport;
#[doc(inline)]
pub use transport::AsyncTransport;
#[doc(inline)]
pub use udp::UdpTransport;
