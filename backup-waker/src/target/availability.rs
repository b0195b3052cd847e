//! Makes sure the backup target is up before a backup starts.
//!
//! One call to [`TargetAvailability::ensure_reachable`] makes at most one wake
//! attempt: probe, send the magic packet, wait once for the configured startup
//! time, probe again. Callers that want another attempt call it again on the
//! next cycle.

use super::identity::TargetIdentity;
use super::mac::MacAddress;
use super::network::{NetworkError, NetworkPrimitives};
use super::wake::magic_packet;
use crate::utils::time::local_time_after;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("No DNS record for {0}")]
    NoDnsRecord(String),

    #[error("Name resolution for {host} failed: {source}")]
    Lookup {
        host: String,
        #[source]
        source: NetworkError,
    },

    #[error("Hardware address resolution for {addr} failed: {source}")]
    AddressResolutionFailed {
        addr: IpAddr,
        #[source]
        source: NetworkError,
    },
}

#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// How long a woken target gets to boot before the second probe.
    pub max_startup_wait: Duration,
    /// Reply deadline for a single probe.
    pub probe_timeout: Duration,
    /// Destination port of the magic packet.
    pub wake_port: u16,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            max_startup_wait: Duration::from_secs(120),
            probe_timeout: Duration::from_secs(2),
            wake_port: 9,
        }
    }
}

/// Result of an availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable,
    /// Shutdown was requested while waiting for the target to boot.
    Cancelled,
}

impl Reachability {
    pub fn is_reachable(self) -> bool {
        self == Reachability::Reachable
    }
}

impl From<bool> for Reachability {
    fn from(reachable: bool) -> Self {
        if reachable {
            Reachability::Reachable
        } else {
            Reachability::Unreachable
        }
    }
}

pub struct TargetAvailability {
    network: Arc<dyn NetworkPrimitives>,
    config: WakeConfig,
}

impl TargetAvailability {
    pub fn new(network: Arc<dyn NetworkPrimitives>, config: WakeConfig) -> Self {
        Self { network, config }
    }

    pub fn config(&self) -> &WakeConfig {
        &self.config
    }

    /// Resolve and cache the target's hardware address.
    pub async fn resolve_mac_address(
        &self,
        identity: &mut TargetIdentity,
    ) -> Result<MacAddress, ResolveError> {
        let addr = match identity.literal_address() {
            Some(addr) => {
                info!(host = %identity.host, "Target host is an IP address");
                addr
            }
            None => self.lookup(&identity.host).await?,
        };

        let mac = self
            .network
            .resolve_mac(addr)
            .await
            .map_err(|source| ResolveError::AddressResolutionFailed { addr, source })?;

        info!(host = %identity.host, %addr, %mac, "Resolved target hardware address");
        identity.mac_address = Some(mac);
        Ok(mac)
    }

    async fn lookup(&self, host: &str) -> Result<IpAddr, ResolveError> {
        let addrs = self
            .network
            .resolve_host(host)
            .await
            .map_err(|source| ResolveError::Lookup {
                host: host.to_string(),
                source,
            })?;

        match addrs.as_slice() {
            [] => Err(ResolveError::NoDnsRecord(host.to_string())),
            [only] => {
                info!(host, addr = %only, "Target resolved to a single address");
                Ok(*only)
            }
            [first, ..] => {
                // resolver order is not guaranteed to be stable
                info!(host, count = addrs.len(), addr = %first, "Target resolved to several addresses, using the first");
                Ok(*first)
            }
        }
    }

    /// Single reachability probe. Failures count as "not reachable".
    pub async fn probe(&self, identity: &TargetIdentity) -> bool {
        match self.network.probe(&identity.host, self.config.probe_timeout).await {
            Ok(true) => {
                info!(host = %identity.host, "Target is up");
                true
            }
            Ok(false) => {
                info!(host = %identity.host, "Target is not up");
                false
            }
            Err(e) => {
                info!(host = %identity.host, error = %e, "Probe failed");
                false
            }
        }
    }

    /// Make sure the target answers probes, waking it if needed.
    pub async fn ensure_reachable(
        &self,
        identity: &mut TargetIdentity,
        shutdown: &CancellationToken,
    ) -> Reachability {
        let mac = match identity.mac_address {
            Some(mac) => mac,
            None => {
                info!(host = %identity.host, "Determining target hardware address...");
                match self.resolve_mac_address(identity).await {
                    Ok(mac) => mac,
                    Err(e) => {
                        error!(host = %identity.host, error = %e, "Cannot wake target with unknown hardware address");
                        return Reachability::Unreachable;
                    }
                }
            }
        };

        if self.probe(identity).await {
            return Reachability::Reachable;
        }

        info!(host = %identity.host, %mac, port = self.config.wake_port, "Sending wake-on-LAN packet...");
        let packet = magic_packet(mac);
        if let Err(e) = self.network.send_broadcast(&packet, self.config.wake_port).await {
            // the post-wait probe still decides the outcome
            warn!(error = %e, "Failed to send wake-on-LAN packet");
        }

        let wait = self.config.max_startup_wait;
        info!(
            until = %local_time_after(chrono::Utc::now(), wait),
            wait_secs = wait.as_secs(),
            "Waiting for target to boot..."
        );

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.cancelled() => {
                debug!("Startup wait interrupted by shutdown");
                return Reachability::Cancelled;
            }
        }

        self.probe(identity).await.into()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scriptable network. Probe replies are consumed in order; once the
    /// script runs out the last reply repeats.
    #[derive(Default)]
    pub(crate) struct FakeNetwork {
        pub dns: Mutex<Option<Result<Vec<IpAddr>, ()>>>,
        pub mac: Mutex<Option<MacAddress>>,
        pub probes: Mutex<VecDeque<bool>>,
        pub probe_calls: Mutex<u32>,
        pub mac_lookups: Mutex<Vec<IpAddr>>,
        pub broadcasts: Mutex<Vec<(Vec<u8>, u16)>>,
        pub broadcast_fails: Mutex<bool>,
    }

    impl FakeNetwork {
        pub(crate) fn with_probes(probes: &[bool]) -> Self {
            let network = Self::default();
            *network.probes.lock().unwrap() = probes.iter().copied().collect();
            *network.mac.lock().unwrap() = Some(MacAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]));
            network
        }

        pub(crate) fn broadcast_count(&self) -> usize {
            self.broadcasts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl NetworkPrimitives for FakeNetwork {
        async fn resolve_host(&self, host: &str) -> Result<Vec<IpAddr>, NetworkError> {
            match self.dns.lock().unwrap().clone() {
                Some(Ok(addrs)) => Ok(addrs),
                Some(Err(())) => Err(NetworkError::Unsupported(format!("lookup of {host} failed"))),
                None => Ok(Vec::new()),
            }
        }

        async fn resolve_mac(&self, addr: IpAddr) -> Result<MacAddress, NetworkError> {
            self.mac_lookups.lock().unwrap().push(addr);
            self.mac.lock().unwrap().ok_or(NetworkError::NoArpEntry(addr))
        }

        async fn probe(&self, _host: &str, _timeout: Duration) -> Result<bool, NetworkError> {
            *self.probe_calls.lock().unwrap() += 1;
            let mut probes = self.probes.lock().unwrap();
            let reply = if probes.len() > 1 {
                probes.pop_front()
            } else {
                probes.front().copied()
            };
            Ok(reply.unwrap_or(false))
        }

        async fn send_broadcast(&self, payload: &[u8], port: u16) -> Result<(), NetworkError> {
            self.broadcasts.lock().unwrap().push((payload.to_vec(), port));
            if *self.broadcast_fails.lock().unwrap() {
                return Err(NetworkError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "broadcast not permitted",
                )));
            }
            Ok(())
        }
    }

    fn availability(network: &Arc<FakeNetwork>) -> TargetAvailability {
        TargetAvailability::new(
            network.clone(),
            WakeConfig {
                max_startup_wait: Duration::from_secs(120),
                probe_timeout: Duration::from_secs(1),
                wake_port: 9,
            },
        )
    }

    fn known_mac() -> Option<MacAddress> {
        Some(MacAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]))
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_awake_skips_wake_and_wait() {
        let network = Arc::new(FakeNetwork::with_probes(&[true]));
        let mut identity = TargetIdentity::new("nas.local", known_mac());

        let started = tokio::time::Instant::now();
        let result = availability(&network)
            .ensure_reachable(&mut identity, &CancellationToken::new())
            .await;

        assert_eq!(result, Reachability::Reachable);
        assert_eq!(network.broadcast_count(), 0);
        assert_eq!(*network.probe_calls.lock().unwrap(), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wakes_then_waits_then_probes_once() {
        let network = Arc::new(FakeNetwork::with_probes(&[false, true]));
        let mut identity = TargetIdentity::new("nas.local", known_mac());

        let started = tokio::time::Instant::now();
        let result = availability(&network)
            .ensure_reachable(&mut identity, &CancellationToken::new())
            .await;

        assert_eq!(result, Reachability::Reachable);
        assert_eq!(*network.probe_calls.lock().unwrap(), 2);
        assert!(started.elapsed() >= Duration::from_secs(120));

        let broadcasts = network.broadcasts.lock().unwrap();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(broadcasts[0].0.len(), 102);
        assert_eq!(broadcasts[0].1, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_wake_send_still_waits_and_probes() {
        let network = Arc::new(FakeNetwork::with_probes(&[false, true]));
        *network.broadcast_fails.lock().unwrap() = true;
        let mut identity = TargetIdentity::new("nas.local", known_mac());

        let started = tokio::time::Instant::now();
        let result = availability(&network)
            .ensure_reachable(&mut identity, &CancellationToken::new())
            .await;

        assert_eq!(result, Reachability::Reachable);
        assert_eq!(network.broadcast_count(), 1);
        assert_eq!(*network.probe_calls.lock().unwrap(), 2);
        assert!(started.elapsed() >= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_that_never_wakes_is_unreachable() {
        let network = Arc::new(FakeNetwork::with_probes(&[false]));
        let mut identity = TargetIdentity::new("nas.local", known_mac());

        let result = availability(&network)
            .ensure_reachable(&mut identity, &CancellationToken::new())
            .await;

        assert_eq!(result, Reachability::Unreachable);
        assert_eq!(network.broadcast_count(), 1);
        assert_eq!(*network.probe_calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_no_dns_record_fails_without_wake() {
        let network = Arc::new(FakeNetwork::with_probes(&[false]));
        *network.dns.lock().unwrap() = Some(Ok(Vec::new()));
        let mut identity = TargetIdentity::new("missing.local", None);

        let result = availability(&network)
            .ensure_reachable(&mut identity, &CancellationToken::new())
            .await;

        assert_eq!(result, Reachability::Unreachable);
        assert_eq!(network.broadcast_count(), 0);
        assert_eq!(*network.probe_calls.lock().unwrap(), 0);
        assert_eq!(identity.mac_address, None);
    }

    #[tokio::test]
    async fn test_arp_failure_fails_without_wake() {
        let network = Arc::new(FakeNetwork::with_probes(&[false]));
        *network.mac.lock().unwrap() = None;
        let mut identity = TargetIdentity::new("192.168.1.20", None);

        let result = availability(&network)
            .ensure_reachable(&mut identity, &CancellationToken::new())
            .await;

        assert_eq!(result, Reachability::Unreachable);
        assert_eq!(network.broadcast_count(), 0);
    }

    #[tokio::test]
    async fn test_literal_address_skips_dns_and_caches_mac() {
        let network = Arc::new(FakeNetwork::with_probes(&[true]));
        *network.dns.lock().unwrap() = Some(Err(()));
        let mut identity = TargetIdentity::new("192.168.1.20", None);

        let mac = availability(&network).resolve_mac_address(&mut identity).await.unwrap();

        assert_eq!(identity.mac_address, Some(mac));
        assert_eq!(
            *network.mac_lookups.lock().unwrap(),
            vec!["192.168.1.20".parse::<IpAddr>().unwrap()]
        );
    }

    #[tokio::test]
    async fn test_multiple_dns_records_use_first() {
        let network = Arc::new(FakeNetwork::with_probes(&[true]));
        let first: IpAddr = "10.0.0.5".parse().unwrap();
        let second: IpAddr = "10.0.0.6".parse().unwrap();
        *network.dns.lock().unwrap() = Some(Ok(vec![first, second]));
        let mut identity = TargetIdentity::new("nas.local", None);

        availability(&network).resolve_mac_address(&mut identity).await.unwrap();

        assert_eq!(*network.mac_lookups.lock().unwrap(), vec![first]);
    }

    #[tokio::test]
    async fn test_lookup_error_is_reported() {
        let network = Arc::new(FakeNetwork::with_probes(&[true]));
        *network.dns.lock().unwrap() = Some(Err(()));
        let mut identity = TargetIdentity::new("nas.local", None);

        let result = availability(&network).resolve_mac_address(&mut identity).await;
        assert!(matches!(result, Err(ResolveError::Lookup { .. })));
    }

    #[tokio::test]
    async fn test_cached_mac_is_not_resolved_again() {
        let network = Arc::new(FakeNetwork::with_probes(&[true]));
        let mut identity = TargetIdentity::new("nas.local", known_mac());

        availability(&network)
            .ensure_reachable(&mut identity, &CancellationToken::new())
            .await;

        assert!(network.mac_lookups.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_startup_wait() {
        let network = Arc::new(FakeNetwork::with_probes(&[false]));
        let mut identity = TargetIdentity::new("nas.local", known_mac());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result = availability(&network).ensure_reachable(&mut identity, &shutdown).await;

        assert_eq!(result, Reachability::Cancelled);
        assert_eq!(*network.probe_calls.lock().unwrap(), 1);
    }
}
