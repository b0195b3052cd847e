//! Backup target availability: hardware address discovery, wake-on-LAN and
//! reachability probing.

pub mod availability;
pub mod identity;
pub mod mac;
pub mod network;
pub mod system;
pub mod wake;

pub use availability::{Reachability, ResolveError, TargetAvailability, WakeConfig};
pub use identity::TargetIdentity;
pub use mac::MacAddress;
pub use network::{NetworkError, NetworkPrimitives};
pub use system::SystemNetwork;
pub use wake::{magic_packet, MAGIC_PACKET_LEN};
