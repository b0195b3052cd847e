//! Network identity of the backup target.

use super::mac::MacAddress;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Host name or address of the target plus its cached hardware address.
///
/// The hardware address is resolved at most once and then reused; whoever owns
/// the configuration is responsible for persisting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetIdentity {
    pub host: String,
    pub mac_address: Option<MacAddress>,
}

impl TargetIdentity {
    pub fn new(host: impl Into<String>, mac_address: Option<MacAddress>) -> Self {
        Self {
            host: host.into(),
            // an all-zero address means "never resolved"
            mac_address: mac_address.filter(|mac| !mac.is_zero()),
        }
    }

    /// The host parsed as a literal IP address, if it is one.
    pub fn literal_address(&self) -> Option<IpAddr> {
        self.host.trim().parse().ok()
    }

    pub fn is_literal_address(&self) -> bool {
        self.literal_address().is_some()
    }

    pub fn clear_mac_address(&mut self) {
        self.mac_address = None;
    }
}
