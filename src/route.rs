//! Picking the local address a peer can reach.
//!
//! A multi-homed host (Wi-Fi plus Ethernet, a VPN, a container bridge) has
//! several IPv4 addresses. An advertisement is only useful if it carries the
//! address on the querier's side of the host, so the responder asks a
//! [RouteSelector] for every query.

#[cfg(feature = "logging")]
use crate::log::trace;
use if_addrs::IfAddr;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

/// Chooses the local IPv4 address to offer to `peer`.
///
/// Implementations must be cheap enough to call once per query, and must
/// always return an address: loopback is the fallback.
pub trait RouteSelector: Send + Sync {
    fn best_local_addr_for(&self, peer: Ipv4Addr) -> Ipv4Addr;
}

/// Asks the OS routing table by "connecting" an unbound UDP socket to the
/// peer, without sending anything, and reading back the local address.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectRoute;

impl ConnectRoute {
    fn local_addr_towards(peer: Ipv4Addr) -> Option<Ipv4Addr> {
        let sock = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).ok()?;

        // Any port works: connect() on UDP only selects a route.
        sock.connect(SocketAddrV4::new(peer, 9)).ok()?;
        match sock.local_addr().ok()? {
            std::net::SocketAddr::V4(addr) if !addr.ip().is_unspecified() => Some(*addr.ip()),
            _ => None,
        }
    }
}

impl RouteSelector for ConnectRoute {
    fn best_local_addr_for(&self, peer: Ipv4Addr) -> Ipv4Addr {
        Self::local_addr_towards(peer).unwrap_or(Ipv4Addr::LOCALHOST)
    }
}

/// A snapshot of local IPv4 interfaces as (address, netmask) pairs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InterfaceTable {
    entries: Vec<(Ipv4Addr, Ipv4Addr)>,
}

impl InterfaceTable {
    pub fn new(entries: Vec<(Ipv4Addr, Ipv4Addr)>) -> Self {
        Self { entries }
    }

    /// Reads the non-loopback IPv4 interfaces of this host.
    ///
    /// Returns an empty table if the interfaces cannot be listed.
    pub fn from_system() -> Self {
        let entries = if_addrs::get_if_addrs()
            .unwrap_or_default()
            .into_iter()
            .filter(|i| !i.is_loopback())
            .filter_map(|i| match i.addr {
                IfAddr::V4(v4) => Some((v4.ip, v4.netmask)),
                IfAddr::V6(_) => None,
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[(Ipv4Addr, Ipv4Addr)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the address of the interface whose subnet contains `peer`.
    ///
    /// When subnets overlap the longest netmask wins; on a tie, the first
    /// interface listed.
    pub fn lookup(&self, peer: Ipv4Addr) -> Option<Ipv4Addr> {
        let mut best: Option<(Ipv4Addr, u32)> = None;
        for &(ip, netmask) in &self.entries {
            if !same_subnet(peer, ip, netmask) {
                continue;
            }
            let prefix = u32::from(netmask).count_ones();
            if best.map_or(true, |(_, best_prefix)| prefix > best_prefix) {
                best = Some((ip, prefix));
            }
        }
        best.map(|(ip, _)| ip)
    }
}

impl RouteSelector for InterfaceTable {
    fn best_local_addr_for(&self, peer: Ipv4Addr) -> Ipv4Addr {
        self.lookup(peer).unwrap_or(Ipv4Addr::LOCALHOST)
    }
}

/// The default selector.
///
/// Loopback peers get 127.0.0.1. Otherwise the current interface table is
/// read and the peer's subnet looked up, and when the peer is not on any
/// local subnet the OS routing table decides via [ConnectRoute].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRoute;

impl RouteSelector for SystemRoute {
    fn best_local_addr_for(&self, peer: Ipv4Addr) -> Ipv4Addr {
        if peer.is_loopback() {
            return Ipv4Addr::LOCALHOST;
        }

        if let Some(addr) = InterfaceTable::from_system().lookup(peer) {
            return addr;
        }

        trace!("{} is not on a local subnet, asking the routing table", peer);
        ConnectRoute.best_local_addr_for(peer)
    }
}

/// Returns true if `addr` is in the same network as `ip`/`netmask`.
fn same_subnet(addr: Ipv4Addr, ip: Ipv4Addr, netmask: Ipv4Addr) -> bool {
    let netmask = u32::from(netmask);
    let intf_net = u32::from(ip) & netmask;
    let addr_net = u32::from(addr) & netmask;
    addr_net == intf_net
}

#[cfg(test)]
mod tests {
    use super::{ConnectRoute, InterfaceTable, RouteSelector, SystemRoute};
    use std::net::Ipv4Addr;
    use test_log::test;

    fn two_nics() -> InterfaceTable {
        InterfaceTable::new(vec![
            (Ipv4Addr::new(192, 168, 1, 20), Ipv4Addr::new(255, 255, 255, 0)),
            (Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(255, 0, 0, 0)),
        ])
    }

    #[test]
    fn test_lookup_by_subnet() {
        let table = two_nics();
        assert_eq!(
            table.best_local_addr_for(Ipv4Addr::new(192, 168, 1, 77)),
            Ipv4Addr::new(192, 168, 1, 20)
        );
        assert_eq!(
            table.best_local_addr_for(Ipv4Addr::new(10, 9, 8, 7)),
            Ipv4Addr::new(10, 0, 0, 5)
        );
        assert_eq!(table.lookup(Ipv4Addr::new(172, 16, 0, 1)), None);
        assert_eq!(
            table.best_local_addr_for(Ipv4Addr::new(172, 16, 0, 1)),
            Ipv4Addr::LOCALHOST
        );
    }

    #[test]
    fn test_longest_netmask_wins() {
        let table = InterfaceTable::new(vec![
            (Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(255, 0, 0, 0)),
            (Ipv4Addr::new(10, 1, 2, 3), Ipv4Addr::new(255, 255, 255, 0)),
        ]);
        assert_eq!(
            table.lookup(Ipv4Addr::new(10, 1, 2, 200)),
            Some(Ipv4Addr::new(10, 1, 2, 3))
        );
        assert_eq!(
            table.lookup(Ipv4Addr::new(10, 1, 3, 200)),
            Some(Ipv4Addr::new(10, 0, 0, 5))
        );
    }

    #[test]
    fn test_loopback_peer() {
        assert_eq!(
            SystemRoute.best_local_addr_for(Ipv4Addr::new(127, 0, 0, 1)),
            Ipv4Addr::LOCALHOST
        );
        assert_eq!(
            ConnectRoute.best_local_addr_for(Ipv4Addr::new(127, 0, 0, 1)),
            Ipv4Addr::LOCALHOST
        );
    }

    #[test]
    fn test_system_table_has_no_loopback() {
        let table = InterfaceTable::from_system();
        assert!(table.entries().iter().all(|(ip, _)| !ip.is_loopback()));
    }
}
