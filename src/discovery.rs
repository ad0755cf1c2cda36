//! One-shot lookups of the audio hub, used when no hub address is configured.
//!
//! Everything here blocks the calling thread, bounded by the platform
//! resolver for forward lookups and by [DiscoveryClient::with_timeout] for
//! reverse lookups. Failures are logged and returned as `None`.

#[cfg(feature = "logging")]
use crate::log::{debug, info, trace};
use crate::{
    dns_parser::{
        DnsIncoming, DnsOutgoing, DnsPointer, DnsRecordExt, RRType, FLAGS_QR_QUERY,
        MAX_MSG_ABSOLUTE,
    },
    zeroconf::{GROUP_ADDR_V4, MDNS_PORT},
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket},
    time::{Duration, Instant},
};

/// The hub host name looked up by [discover_advertised_url].
pub const PEER_HOSTNAME: &str = "audiohub.local";

/// Path of the hub's menu page.
pub const DESKTOP_MENU_PATH: &str = "/site/DesktopMenu";

const REVERSE_TIMEOUT_DEFAULT: Duration = Duration::from_secs(2);

/// Blocking resolver for the hub address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryClient {
    peer_hostname: String,
    timeout: Duration,
    mdns_addr: SocketAddr,
}

impl Default for DiscoveryClient {
    fn default() -> Self {
        Self {
            peer_hostname: PEER_HOSTNAME.to_string(),
            timeout: REVERSE_TIMEOUT_DEFAULT,
            mdns_addr: SocketAddrV4::new(GROUP_ADDR_V4, MDNS_PORT).into(),
        }
    }
}

impl DiscoveryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer_hostname(mut self, hostname: &str) -> Self {
        self.peer_hostname = hostname.to_string();
        self
    }

    /// How long [DiscoveryClient::reverse_resolve] waits for an answer.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Where reverse queries are sent. Defaults to the mDNS group.
    pub fn with_mdns_addr(mut self, addr: SocketAddr) -> Self {
        self.mdns_addr = addr;
        self
    }

    pub fn peer_hostname(&self) -> &str {
        &self.peer_hostname
    }

    /// Resolves `hostname` with the platform resolver and returns its first
    /// IPv4 address.
    pub fn resolve_address(&self, hostname: &str) -> Option<Ipv4Addr> {
        let addrs = match (hostname, 0).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!("resolve {} failed: {}", hostname, e);
                return None;
            }
        };

        let found = addrs.into_iter().find_map(|addr| match addr.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        });
        if found.is_none() {
            debug!("resolve {}: no IPv4 address", hostname);
        }
        found
    }

    /// Looks up the host name of `addr` with a multicast PTR query for
    /// `<d.c.b.a>.in-addr.arpa.`, waiting at most the configured timeout.
    ///
    /// Only peers that answer mDNS reverse queries are found. A host that
    /// has a PTR record on a unicast DNS server only resolves to `None`.
    ///
    /// The returned name has no trailing dot.
    pub fn reverse_resolve(&self, addr: Ipv4Addr) -> Option<String> {
        let name = reverse_name(addr);
        let sock = match UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)) {
            Ok(sock) => sock,
            Err(e) => {
                debug!("reverse {}: bind failed: {}", addr, e);
                return None;
            }
        };

        let mut query = DnsOutgoing::new(FLAGS_QR_QUERY);
        query.set_id(fastrand::u16(1..));
        query.add_question(&name, RRType::PTR);
        if let Err(e) = sock.send_to(&query.to_data_on_wire(), self.mdns_addr) {
            debug!("reverse {}: send to {} failed: {}", addr, self.mdns_addr, e);
            return None;
        }

        let deadline = Instant::now() + self.timeout;
        let mut buf = vec![0u8; MAX_MSG_ABSOLUTE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("reverse {}: no answer within {:?}", addr, self.timeout);
                return None;
            }
            if let Err(e) = sock.set_read_timeout(Some(remaining)) {
                debug!("reverse {}: set_read_timeout: {}", addr, e);
                return None;
            }

            let (sz, from) = match sock.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) => {
                    debug!("reverse {}: {}", addr, e);
                    return None;
                }
            };

            match DnsIncoming::new(buf[..sz].to_vec()) {
                Ok(msg) if msg.is_response() => {
                    if let Some(host) = ptr_answer(&msg, &name) {
                        return Some(host);
                    }
                    trace!("reverse {}: unrelated response from {}", addr, from);
                }
                Ok(_) => trace!("reverse {}: ignore query from {}", addr, from),
                Err(e) => debug!("reverse {}: bad packet from {}: {}", addr, from, e),
            }
        }
    }

    /// Resolves the hub host name and returns `https://<addr>/site/DesktopMenu`.
    ///
    /// The reverse lookup is only logged, it never changes the URL.
    pub fn discover_advertised_url(&self) -> Option<String> {
        let addr = self.resolve_address(&self.peer_hostname)?;

        match self.reverse_resolve(addr) {
            Some(host) => info!("{} is at {} ({})", self.peer_hostname, addr, host),
            None => info!("{} is at {}", self.peer_hostname, addr),
        }

        Some(menu_url(addr))
    }
}

/// [DiscoveryClient::resolve_address] with the default client.
pub fn resolve_address(hostname: &str) -> Option<Ipv4Addr> {
    DiscoveryClient::default().resolve_address(hostname)
}

/// [DiscoveryClient::reverse_resolve] with the default client.
pub fn reverse_resolve(addr: Ipv4Addr) -> Option<String> {
    DiscoveryClient::default().reverse_resolve(addr)
}

/// [DiscoveryClient::discover_advertised_url] with the default client.
pub fn discover_advertised_url() -> Option<String> {
    DiscoveryClient::default().discover_advertised_url()
}

fn menu_url(addr: Ipv4Addr) -> String {
    format!("https://{}{}", addr, DESKTOP_MENU_PATH)
}

/// Returns the reverse-lookup name, e.g. `20.1.168.192.in-addr.arpa.`
fn reverse_name(addr: Ipv4Addr) -> String {
    let [a, b, c, d] = addr.octets();
    format!("{}.{}.{}.{}.in-addr.arpa.", d, c, b, a)
}

/// Returns the PTR target for `name` in `msg`, without trailing dots.
fn ptr_answer(msg: &DnsIncoming, name: &str) -> Option<String> {
    msg.answers()
        .iter()
        .filter(|answer| answer.get_name().eq_ignore_ascii_case(name))
        .find_map(|answer| answer.any().downcast_ref::<DnsPointer>())
        .map(|ptr| ptr.alias().trim_end_matches('.').to_string())
        .filter(|host| !host.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{menu_url, reverse_name, DiscoveryClient};
    use crate::dns_parser::{
        DnsIncoming, DnsOutgoing, DnsPointer, RRType, CLASS_IN, FLAGS_AA, FLAGS_QR_RESPONSE,
    };
    use std::{
        net::{Ipv4Addr, UdpSocket},
        thread,
        time::{Duration, Instant},
    };
    use test_log::test;

    #[test]
    fn test_reverse_name() {
        assert_eq!(
            reverse_name(Ipv4Addr::new(192, 168, 1, 20)),
            "20.1.168.192.in-addr.arpa."
        );
    }

    #[test]
    fn test_menu_url() {
        assert_eq!(
            menu_url(Ipv4Addr::new(10, 0, 0, 7)),
            "https://10.0.0.7/site/DesktopMenu"
        );
    }

    #[test]
    fn test_resolve_literal_and_invalid() {
        let client = DiscoveryClient::new();
        assert_eq!(
            client.resolve_address("127.0.0.1"),
            Some(Ipv4Addr::new(127, 0, 0, 1))
        );
        assert_eq!(client.resolve_address("name.invalid"), None);
        assert_eq!(client.resolve_address(""), None);
    }

    #[test]
    fn test_discover_url_from_literal_peer() {
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = DiscoveryClient::new()
            .with_peer_hostname("127.0.0.1")
            .with_timeout(Duration::from_millis(100))
            .with_mdns_addr(silent.local_addr().unwrap());

        assert_eq!(
            client.discover_advertised_url().as_deref(),
            Some("https://127.0.0.1/site/DesktopMenu")
        );
    }

    #[test]
    fn test_reverse_resolve_trims_trailing_dot() {
        let responder = UdpSocket::bind("127.0.0.1:0").unwrap();
        let responder_addr = responder.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let mut buf = [0u8; 1500];
            let (sz, from) = responder.recv_from(&mut buf).unwrap();
            let query = DnsIncoming::new_query(buf[..sz].to_vec()).unwrap();
            let question = &query.questions()[0];
            assert_eq!(question.entry_type(), Some(RRType::PTR));

            // Some noise first: a response about another name.
            let mut other = DnsOutgoing::new(FLAGS_QR_RESPONSE | FLAGS_AA);
            other.add_answer(DnsPointer::new(
                "1.0.0.10.in-addr.arpa.",
                CLASS_IN,
                120,
                "other.local.".to_string(),
            ));
            responder.send_to(&other.to_data_on_wire(), from).unwrap();

            let mut out = DnsOutgoing::response_to(&query);
            out.add_answer(DnsPointer::new(
                question.entry_name(),
                CLASS_IN,
                120,
                "audiohub.local.".to_string(),
            ));
            responder.send_to(&out.to_data_on_wire(), from).unwrap();
        });

        let client = DiscoveryClient::new().with_mdns_addr(responder_addr);
        assert_eq!(
            client.reverse_resolve(Ipv4Addr::new(192, 168, 1, 20)).as_deref(),
            Some("audiohub.local")
        );
        handle.join().unwrap();
    }

    #[test]
    fn test_reverse_resolve_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = DiscoveryClient::new()
            .with_timeout(Duration::from_millis(200))
            .with_mdns_addr(silent.local_addr().unwrap());

        let start = Instant::now();
        assert_eq!(client.reverse_resolve(Ipv4Addr::new(192, 168, 1, 20)), None);
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
