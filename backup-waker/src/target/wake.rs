//! Wake-on-LAN magic packet.

use super::mac::MacAddress;

const SYNC_LEN: usize = 6;
const REPETITIONS: usize = 16;

/// Total payload length: 6 sync bytes plus 16 copies of the address.
pub const MAGIC_PACKET_LEN: usize = SYNC_LEN + REPETITIONS * MacAddress::LEN;

/// Build the 102-byte payload that wakes the device owning `mac`.
pub fn magic_packet(mac: MacAddress) -> [u8; MAGIC_PACKET_LEN] {
    let mut packet = [0xFF; MAGIC_PACKET_LEN];
    let octets = mac.octets();
    for chunk in packet[SYNC_LEN..].chunks_exact_mut(MacAddress::LEN) {
        chunk.copy_from_slice(&octets);
    }
    packet
}
