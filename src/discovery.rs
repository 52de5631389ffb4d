//! Locating an air unit on the local network.
//!
//! A fixed probe is broadcast on every usable interface and the unit answers with a fixed reply
//! from its own address. UDP being what it is, nothing here is guaranteed: a scan may come up
//! empty even if a unit is present, and replies arriving after the listening window are lost.

use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, RwLock};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

pub const DISCOVERY_PORT: u16 = 30045;
pub const PROBE: [u8; 9] = [0x0c, 0x00, 0x30, 0x00, 0x11, 0x00, 0x12, 0x00, 0x13];
pub const REPLY: [u8; 7] = [0x0d, 0x00, 0x07, 0x00, 0x02, 0x02, 0x00];

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not enumerate the network interfaces")]
    Interfaces(#[source] nix::Error),
    #[error("could not bind a UDP socket")]
    Bind(#[source] std::io::Error),
    #[error("could not enable broadcast on the UDP socket")]
    EnableBroadcast(#[source] std::io::Error),
    #[error("could not send the discovery probe to {1}")]
    Send(#[source] std::io::Error, SocketAddr),
    #[error("could not receive a discovery reply")]
    Receive(#[source] std::io::Error),
}

#[derive(clap::Parser, Clone, Debug)]
#[group(id = "discovery::Args")]
pub struct Args {
    /// The UDP port air units listen for discovery probes on.
    #[arg(long, default_value = "30045")]
    pub discovery_port: u16,

    /// Stop listening for discovery replies on an interface after this much silence.
    #[arg(long, default_value = "500ms")]
    pub discovery_timeout: humantime::Duration,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            discovery_port: DISCOVERY_PORT,
            discovery_timeout: std::time::Duration::from_millis(500).into(),
        }
    }
}

/// The host name of the most recently discovered air unit.
///
/// Only [`Discovery`] ever writes to the cache, everybody else only reads it.
#[derive(Default, Debug)]
pub struct DiscoveryCache {
    host: RwLock<Option<String>>,
}

impl DiscoveryCache {
    pub fn host(&self) -> Option<String> {
        self.host.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_host(&self, host: String) {
        *self.host.write().unwrap_or_else(|e| e.into_inner()) = Some(host);
    }
}

/// A local IPv4 address on an interface that can broadcast.
#[derive(Debug, Clone)]
pub struct BroadcastTarget {
    pub interface: String,
    pub local: Option<Ipv4Addr>,
    pub broadcast: Ipv4Addr,
}

/// Addresses of interfaces that are up, not loopback, and have a broadcast address configured.
pub fn broadcast_targets() -> Result<Vec<BroadcastTarget>, Error> {
    let mut targets = Vec::new();
    for address in getifaddrs().map_err(Error::Interfaces)? {
        let flags = address.flags;
        if flags.contains(InterfaceFlags::IFF_LOOPBACK) || !flags.contains(InterfaceFlags::IFF_UP) {
            continue;
        }
        let Some(broadcast) = address.broadcast.as_ref().and_then(|a| a.as_sockaddr_in()) else {
            continue;
        };
        let local = address.address.as_ref().and_then(|a| a.as_sockaddr_in());
        targets.push(BroadcastTarget {
            interface: address.interface_name,
            local: local.map(|&a| *SocketAddrV4::from(a).ip()),
            broadcast: *SocketAddrV4::from(*broadcast).ip(),
        });
    }
    Ok(targets)
}

/// Held for the duration of a scan. Scans never overlap anywhere in the process.
static SCANNING: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

pub struct Discovery {
    args: Args,
    cache: Arc<DiscoveryCache>,
}

impl Discovery {
    pub fn new(args: Args, cache: Arc<DiscoveryCache>) -> Self {
        Self { args, cache }
    }

    pub fn cache(&self) -> &Arc<DiscoveryCache> {
        &self.cache
    }

    /// Probe every interface in turn and record whichever air unit answers.
    ///
    /// Only one scan runs at a time in the whole process, regardless of which [`Discovery`] it
    /// was started from. Concurrent callers wait for the running scan to finish and then scan
    /// again. Failures are logged, never reported.
    pub async fn scan_for_device(&self) {
        self.scan(broadcast_targets).await
    }

    async fn scan(&self, targets: impl FnOnce() -> Result<Vec<BroadcastTarget>, Error>) {
        let _scanning = SCANNING.lock().await;
        debug!("scanning for air units");
        let targets = match targets() {
            Ok(targets) => targets,
            Err(e) => {
                warn!(message = "no air unit found", error = (&e as &dyn std::error::Error));
                return;
            }
        };
        for target in targets {
            debug!(
                message = "probing",
                interface = %target.interface,
                local = ?target.local,
                broadcast = %target.broadcast
            );
            if let Err(e) = self.probe(target.broadcast).await {
                warn!(
                    message = "probing failed",
                    interface = %target.interface,
                    error = (&e as &dyn std::error::Error)
                );
            }
        }
        debug!(message = "scan complete", host = ?self.cache.host());
    }

    /// Send a single probe to `broadcast` and collect replies until the line goes quiet.
    ///
    /// Listening continues after a matching reply, so with several answers the cache ends up
    /// holding the last one.
    pub async fn probe(&self, broadcast: Ipv4Addr) -> Result<(), Error> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.map_err(Error::Bind)?;
        socket.set_broadcast(true).map_err(Error::EnableBroadcast)?;
        let destination = SocketAddr::from((broadcast, self.args.discovery_port));
        socket.send_to(&PROBE, destination).await.map_err(|e| Error::Send(e, destination))?;
        trace!(message = "probe sent", %destination);
        loop {
            let mut buffer = [0; REPLY.len()];
            let receive = socket.recv_from(&mut buffer);
            let Ok(received) = tokio::time::timeout(*self.args.discovery_timeout, receive).await
            else {
                trace!(message = "no more replies", %destination);
                return Ok(());
            };
            let (length, sender) = received.map_err(Error::Receive)?;
            if buffer[..length] != REPLY {
                trace!(message = "ignoring unexpected datagram", %sender, data = ?&buffer[..length]);
                continue;
            }
            let host = resolve_host_name(sender.ip()).await;
            info!(message = "found an air unit", %host, address = %sender.ip());
            self.cache.set_host(host);
        }
    }
}

/// Reverse lookup of `address`, falling back to its textual form.
async fn resolve_host_name(address: IpAddr) -> String {
    let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&address)).await;
    match lookup {
        Ok(Ok(host)) => host,
        Ok(Err(e)) => {
            debug!(
                message = "reverse lookup failed",
                %address,
                error = (&e as &dyn std::error::Error)
            );
            address.to_string()
        }
        Err(e) => {
            debug!(message = "reverse lookup task failed", error = (&e as &dyn std::error::Error));
            address.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Stands in for an air unit: waits for a probe and answers it with `replies`.
    async fn fake_unit(replies: Vec<Vec<u8>>) -> (u16, tokio::task::JoinHandle<Vec<u8>>) {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = socket.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let mut probe = [0; 32];
            let (length, sender) = socket.recv_from(&mut probe).await.unwrap();
            for reply in replies {
                socket.send_to(&reply, sender).await.unwrap();
            }
            probe[..length].to_vec()
        });
        (port, task)
    }

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn args(port: u16) -> Args {
        Args { discovery_port: port, discovery_timeout: TIMEOUT.into() }
    }

    fn discovery(port: u16) -> Discovery {
        Discovery::new(args(port), Arc::default())
    }

    fn loopback() -> Result<Vec<BroadcastTarget>, Error> {
        Ok(vec![BroadcastTarget {
            interface: "lo".into(),
            local: Some(Ipv4Addr::LOCALHOST),
            broadcast: Ipv4Addr::LOCALHOST,
        }])
    }

    #[tokio::test]
    async fn matching_reply_updates_the_cache() {
        let (port, unit) = fake_unit(vec![REPLY.to_vec()]).await;
        let discovery = discovery(port);
        discovery.probe(Ipv4Addr::LOCALHOST).await.unwrap();
        assert_eq!(unit.await.unwrap(), PROBE);
        let expected = resolve_host_name(IpAddr::from(Ipv4Addr::LOCALHOST)).await;
        assert_eq!(discovery.cache().host(), Some(expected));
    }

    #[tokio::test]
    async fn other_replies_are_ignored() {
        let (port, unit) = fake_unit(vec![
            vec![0; 7],
            vec![0x0d, 0x00, 0x07, 0x00, 0x02, 0x02, 0x01],
            vec![0x0d, 0x00, 0x07, 0x00, 0x02, 0x02],
        ])
        .await;
        let discovery = discovery(port);
        discovery.probe(Ipv4Addr::LOCALHOST).await.unwrap();
        unit.await.unwrap();
        assert_eq!(discovery.cache().host(), None);
    }

    #[tokio::test]
    async fn keeps_listening_after_a_match() {
        let (port, unit) = fake_unit(vec![vec![1; 7], REPLY.to_vec(), vec![2; 7]]).await;
        let discovery = discovery(port);
        discovery.probe(Ipv4Addr::LOCALHOST).await.unwrap();
        unit.await.unwrap();
        assert!(discovery.cache().host().is_some());
    }

    #[tokio::test]
    async fn silence_ends_listening() {
        let (port, unit) = fake_unit(vec![]).await;
        let discovery = discovery(port);
        let started = tokio::time::Instant::now();
        discovery.probe(Ipv4Addr::LOCALHOST).await.unwrap();
        assert!(started.elapsed() >= TIMEOUT);
        unit.await.unwrap();
        assert_eq!(discovery.cache().host(), None);
    }

    #[tokio::test]
    async fn scan_records_the_responding_unit() {
        let (port, unit) = fake_unit(vec![REPLY.to_vec()]).await;
        let discovery = discovery(port);
        discovery.scan(loopback).await;
        unit.await.unwrap();
        let expected = resolve_host_name(IpAddr::from(Ipv4Addr::LOCALHOST)).await;
        assert_eq!(discovery.cache().host(), Some(expected));
    }

    #[tokio::test]
    async fn scan_swallows_errors() {
        let discovery = discovery(0);
        discovery.scan(|| Err(Error::Interfaces(nix::Error::EACCES))).await;
        // Sending to port zero is refused by the OS.
        discovery.scan(loopback).await;
        assert_eq!(discovery.cache().host(), None);
    }

    #[tokio::test]
    async fn scans_sharing_a_cache_do_not_overlap() {
        // Receives the probes but never answers, so every scan waits out its full window.
        let unit = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = unit.local_addr().unwrap().port();
        let cache = Arc::new(DiscoveryCache::default());
        let first = Discovery::new(args(port), Arc::clone(&cache));
        let second = Discovery::new(args(port), Arc::clone(&cache));
        let started = tokio::time::Instant::now();
        tokio::join!(first.scan(loopback), second.scan(loopback));
        assert!(started.elapsed() >= 2 * TIMEOUT);
        assert_eq!(cache.host(), None);
        drop(unit);
    }

    #[tokio::test]
    async fn scans_on_one_discovery_do_not_overlap() {
        let unit = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = unit.local_addr().unwrap().port();
        let discovery = discovery(port);
        let started = tokio::time::Instant::now();
        tokio::join!(discovery.scan(loopback), discovery.scan(loopback));
        assert!(started.elapsed() >= 2 * TIMEOUT);
        drop(unit);
    }

    #[test]
    fn cache_keeps_the_latest_host() {
        let cache = DiscoveryCache::default();
        assert_eq!(cache.host(), None);
        cache.set_host("first".into());
        cache.set_host("second".into());
        assert_eq!(cache.host().as_deref(), Some("second"));
    }

    #[test]
    fn loopback_is_never_a_target() {
        let Ok(targets) = broadcast_targets() else { return };
        assert!(targets.iter().all(|t| !t.broadcast.is_loopback()));
    }
}
