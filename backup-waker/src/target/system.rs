//! Network primitives backed by the host operating system.
//!
//! - name resolution: the system resolver via `tokio::net::lookup_host`
//! - hardware address: the kernel ARP cache (`/proc/net/arp`), primed with a
//!   throwaway datagram
//! - reachability: the system `ping` utility
//! - wake signal: a UDP datagram to 255.255.255.255

use super::mac::MacAddress;
use super::network::{NetworkError, NetworkPrimitives};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::process::Command;
use tracing::debug;

const ARP_TABLE: &str = "/proc/net/arp";
const ARP_POLL_ATTEMPTS: u32 = 5;
const ARP_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Discard service; only used to make the kernel resolve the neighbour.
const ARP_PRIME_PORT: u16 = 9;

pub struct SystemNetwork {
    arp_table: PathBuf,
}

impl SystemNetwork {
    pub fn new() -> Self {
        Self {
            arp_table: PathBuf::from(ARP_TABLE),
        }
    }

    async fn prime_neighbour(&self, addr: Ipv4Addr) {
        let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
            Ok(socket) => socket,
            Err(e) => {
                debug!(error = %e, "Could not bind socket to prime ARP cache");
                return;
            }
        };
        if let Err(e) = socket.send_to(&[], (addr, ARP_PRIME_PORT)).await {
            debug!(%addr, error = %e, "ARP priming datagram not sent");
        }
    }
}

impl Default for SystemNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkPrimitives for SystemNetwork {
    async fn resolve_host(&self, host: &str) -> Result<Vec<IpAddr>, NetworkError> {
        let mut addrs: Vec<IpAddr> = Vec::new();
        for socket_addr in tokio::net::lookup_host((host, 0)).await? {
            if !addrs.contains(&socket_addr.ip()) {
                addrs.push(socket_addr.ip());
            }
        }
        Ok(addrs)
    }

    async fn resolve_mac(&self, addr: IpAddr) -> Result<MacAddress, NetworkError> {
        let IpAddr::V4(v4) = addr else {
            return Err(NetworkError::Unsupported(format!(
                "hardware address discovery needs an IPv4 address, got {addr}"
            )));
        };

        self.prime_neighbour(v4).await;

        for attempt in 1..=ARP_POLL_ATTEMPTS {
            let table = tokio::fs::read_to_string(&self.arp_table).await?;
            if let Some(mac) = parse_arp_table(&table, v4) {
                return Ok(mac);
            }
            debug!(%addr, attempt, "ARP entry not present yet");
            tokio::time::sleep(ARP_POLL_INTERVAL).await;
        }

        Err(NetworkError::NoArpEntry(addr))
    }

    async fn probe(&self, host: &str, timeout: Duration) -> Result<bool, NetworkError> {
        let mut command = Command::new("ping");
        command
            .args(ping_args(timeout))
            .arg(host)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        // ping enforces its own deadline; this is the backstop
        let deadline = timeout + Duration::from_secs(1);
        match tokio::time::timeout(deadline, command.status()).await {
            Ok(status) => Ok(status?.success()),
            Err(_) => Err(NetworkError::ProbeTimeout(deadline)),
        }
    }

    async fn send_broadcast(&self, payload: &[u8], port: u16) -> Result<(), NetworkError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;
        let target = SocketAddr::from((Ipv4Addr::BROADCAST, port));
        let sent = socket.send_to(payload, target).await?;
        debug!(bytes = sent, %target, "Broadcast datagram sent");
        Ok(())
    }
}

/// Arguments for a single echo request with the given reply deadline.
pub fn ping_args(timeout: Duration) -> Vec<String> {
    if cfg!(windows) {
        let millis = timeout.as_millis().max(1);
        vec!["-n".into(), "1".into(), "-w".into(), millis.to_string()]
    } else if cfg!(target_os = "macos") {
        // macOS takes -W in milliseconds
        let millis = timeout.as_millis().max(1);
        vec!["-c".into(), "1".into(), "-W".into(), millis.to_string()]
    } else {
        let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        vec!["-c".into(), "1".into(), "-W".into(), secs.to_string()]
    }
}

/// Find the complete entry for `addr` in the contents of `/proc/net/arp`.
pub fn parse_arp_table(table: &str, addr: Ipv4Addr) -> Option<MacAddress> {
    const ATF_COM: u32 = 0x2;

    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [ip, _hw_type, flags, hw_addr, ..] = fields.as_slice() else {
            return None;
        };
        if ip.parse::<Ipv4Addr>().ok()? != addr {
            return None;
        }
        let flags = u32::from_str_radix(flags.trim_start_matches("0x"), 16).ok()?;
        if flags & ATF_COM == 0 {
            return None;
        }
        hw_addr.parse::<MacAddress>().ok().filter(|mac| !mac.is_zero())
    })
}
