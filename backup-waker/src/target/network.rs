//! Network primitives the wake logic relies on.

use super::mac::MacAddress;
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No link-layer entry for {0}")]
    NoArpEntry(IpAddr),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Probe timed out after {0:?}")]
    ProbeTimeout(Duration),
}

/// OS-level operations: name resolution, hardware address discovery, ICMP
/// echo and broadcast send.
#[async_trait]
pub trait NetworkPrimitives: Send + Sync {
    /// Resolve a host name to its addresses, in resolver order.
    async fn resolve_host(&self, host: &str) -> Result<Vec<IpAddr>, NetworkError>;

    /// Discover the hardware address behind `addr` on the local segment.
    async fn resolve_mac(&self, addr: IpAddr) -> Result<MacAddress, NetworkError>;

    /// Send one echo request and report whether a reply arrived in time.
    async fn probe(&self, host: &str, timeout: Duration) -> Result<bool, NetworkError>;

    /// Send `payload` as a single datagram to the limited broadcast address.
    async fn send_broadcast(&self, payload: &[u8], port: u16) -> Result<(), NetworkError>;
}
