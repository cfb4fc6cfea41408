pub mod channel;
pub mod datagram;
pub mod receiver;

use std::net::SocketAddr;

use anyhow::Result;

pub use channel::{ImuChannel, MountYaw, OrientationOffset};
pub use datagram::{format_datagram, parse_datagram, DatagramError};
pub use receiver::{CycleTrigger, ImuReceiver, DEFAULT_MOUNTS};

/// A participant-worn data source that is brought up on request.
pub trait Sensor {
    type Endpoint;

    /// Opens the transport. Connecting an already connected sensor returns
    /// the existing address.
    fn connect(&mut self, endpoint: Self::Endpoint) -> Result<SocketAddr>;

    fn on_connected(&mut self, _addr: SocketAddr) {}
}
