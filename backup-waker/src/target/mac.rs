//! Link-layer (MAC) address.

use crate::utils::WakerError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 6-byte hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const LEN: usize = 6;

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// `00:00:00:00:00:00`, which the ARP cache reports for incomplete entries
    /// and which older config files use for "not resolved yet".
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = WakerError;

    /// Accepts `AA:BB:CC:DD:EE:FF`, `AA-BB-CC-DD-EE-FF` and `AABBCCDDEEFF`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WakerError::InvalidMacAddress(s.to_string());
        let trimmed = s.trim();

        let groups: Vec<&str> = if trimmed.contains([':', '-']) {
            trimmed.split([':', '-']).collect()
        } else if trimmed.len() == 12 && trimmed.is_ascii() {
            (0..6).map(|i| &trimmed[i * 2..i * 2 + 2]).collect()
        } else {
            return Err(invalid());
        };

        if groups.len() != Self::LEN {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        for (slot, group) in bytes.iter_mut().zip(groups) {
            if group.is_empty() || group.len() > 2 {
                return Err(invalid());
            }
            *slot = u8::from_str_radix(group, 16).map_err(|_| invalid())?;
        }

        Ok(Self(bytes))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
