//! Route-aware mDNS responder for the audio-sink service.
//!
//! The responder answers queries about one service instance, on the standard
//! mDNS port. Unlike a classic responder that announces one fixed address,
//! every answer carries the local address that the querier can reach, chosen
//! by a [RouteSelector] from the querier's source address.
//!
//! Naming used below, following RFC 6763:
//! - `service_type` is `<service>.<domain>`, e.g. `_audiosink._udp.local.`
//! - `fullname` is `<instance>.<service>.<domain>`, e.g. `kitchen._audiosink._udp.local.`

#[cfg(feature = "logging")]
use crate::log::{debug, info, trace};
use crate::{
    dns_parser::{
        same_name, DnsAddress, DnsIncoming, DnsOutgoing, DnsPointer, DnsQuestion, DnsSrv, DnsTxt,
        RRType, CLASS_IN, LABEL_LEN_MAX,
    },
    error::{e_fmt, Result},
    identity::ReceiverIdentity,
    route::{InterfaceTable, RouteSelector, SystemRoute},
    service_daemon::{new_socket, DaemonSlot, DaemonStatus, DatagramHandler, Metrics, ServiceDaemon},
    Receiver,
};
use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket},
    sync::Arc,
};

/// The standard mDNS port.
pub const MDNS_PORT: u16 = 5353;

/// The mDNS IPv4 multicast group.
pub const GROUP_ADDR_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// Any question whose name contains this string is answered.
pub const SERVICE_SHORT_NAME: &str = "audiosink";

pub const SERVICE_TYPE: &str = "_audiosink._udp.local.";

/// The port advertised in the SRV record.
pub const SERVICE_PORT: u16 = 8010;

/// Instance label used while no receiver identity is set.
pub const DEFAULT_INSTANCE_NAME: &str = "AudioSink";

pub const DEFAULT_HOST_NAME: &str = "audiosink.local.";

/// TTL of every advertised record, in seconds.
pub const ADVERTISE_TTL: u32 = 3600;

/// Options of a [ZeroconfResponder].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZeroconfConfig {
    port: u16,
    service_type: String,
    short_name: String,
    instance_name: String,
    host_name: String,
    service_port: u16,
    ttl: u32,
    multicast_loop: bool,
}

impl Default for ZeroconfConfig {
    fn default() -> Self {
        Self {
            port: MDNS_PORT,
            service_type: SERVICE_TYPE.to_string(),
            short_name: SERVICE_SHORT_NAME.to_string(),
            instance_name: DEFAULT_INSTANCE_NAME.to_string(),
            host_name: DEFAULT_HOST_NAME.to_string(),
            service_port: SERVICE_PORT,
            ttl: ADVERTISE_TTL,
            multicast_loop: true,
        }
    }
}

impl ZeroconfConfig {
    /// The UDP port to listen on. 0 lets the OS pick one.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_service_type(mut self, service_type: &str) -> Self {
        self.service_type = service_type.to_string();
        self
    }

    pub fn with_short_name(mut self, short_name: &str) -> Self {
        self.short_name = short_name.to_lowercase();
        self
    }

    pub fn with_instance_name(mut self, instance_name: &str) -> Self {
        self.instance_name = instance_name.to_string();
        self
    }

    pub fn with_host_name(mut self, host_name: &str) -> Self {
        self.host_name = host_name.to_string();
        self
    }

    pub fn with_service_port(mut self, service_port: u16) -> Self {
        self.service_port = service_port;
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Whether multicast sent from this host loops back to it. On by default.
    pub fn with_multicast_loop(mut self, on: bool) -> Self {
        self.multicast_loop = on;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn service_port(&self) -> u16 {
        self.service_port
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }
}

/// The multicast discovery responder.
///
/// `start` and `stop` take `&self` and can be called from any thread, in any
/// order and any number of times.
pub struct ZeroconfResponder {
    config: ZeroconfConfig,
    identity: ReceiverIdentity,
    route: Arc<dyn RouteSelector>,
    slot: DaemonSlot,
}

impl ZeroconfResponder {
    pub fn new(config: ZeroconfConfig, identity: ReceiverIdentity) -> Self {
        Self {
            config,
            identity,
            route: Arc::new(SystemRoute),
            slot: DaemonSlot::default(),
        }
    }

    /// Replaces the default [SystemRoute]. Takes effect at the next `start`.
    pub fn with_route_selector(mut self, route: Arc<dyn RouteSelector>) -> Self {
        self.route = route;
        self
    }

    /// Binds the mDNS socket, joins the multicast group and starts answering.
    ///
    /// Does nothing if already running. On error, the responder stays stopped.
    pub fn start(&self) -> Result<()> {
        self.slot.start_with(|| {
            let sock = open_mdns_socket(&self.config)?;
            let handler = ZeroconfHandler {
                config: self.config.clone(),
                identity: self.identity.clone(),
                route: self.route.clone(),
            };
            let daemon = ServiceDaemon::spawn("zeroconf_responder", sock, handler)?;
            info!("zeroconf responder listening on {}", daemon.local_addr());
            Ok(daemon)
        })
    }

    /// Stops answering and closes the socket. Safe to call when not running.
    pub fn stop(&self) {
        if let Some(status) = self.slot.stop() {
            info!("zeroconf responder stopped: {:?}", status);
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_running()
    }

    /// The bound socket address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.slot.local_addr()
    }

    /// Returns a channel receiver for a snapshot of the packet counters.
    pub fn get_metrics(&self) -> Result<Receiver<Metrics>> {
        self.slot.get_metrics()
    }

    pub fn status(&self) -> Result<Receiver<DaemonStatus>> {
        self.slot.status()
    }
}

impl Drop for ZeroconfResponder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Creates the socket shared by receiving queries and sending replies.
///
/// Such socket has to bind to INADDR_ANY to receive multicast.
fn open_mdns_socket(config: &ZeroconfConfig) -> Result<UdpSocket> {
    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port);
    let sock = new_socket(addr.into(), true)?;

    // Join mDNS group on every interface to receive packets.
    let mut joined = 0;
    for (ip, _) in InterfaceTable::from_system().entries() {
        match sock.join_multicast_v4(&GROUP_ADDR_V4, ip) {
            Ok(()) => joined += 1,
            Err(e) => debug!("join multicast group on addr {}: {}", ip, e),
        }
    }

    if joined == 0 {
        // Let the OS pick the interface.
        sock.join_multicast_v4(&GROUP_ADDR_V4, &Ipv4Addr::UNSPECIFIED)
            .map_err(|e| e_fmt!("join multicast group {}: {}", GROUP_ADDR_V4, e))?;
    }

    sock.set_multicast_loop_v4(config.multicast_loop)
        .map_err(|e| e_fmt!("failed to set multicast loop v4: {}", e))?;

    Ok(UdpSocket::from(sock))
}

/// Upper bound on questions repeated in one response.
const MAX_ECHOED_QUESTIONS: usize = 4;

/// Returns true if `id` can be used as one instance label as is.
fn is_single_label(id: &str) -> bool {
    !id.is_empty() && !id.contains('.') && id.len() <= LABEL_LEN_MAX
}

/// Which record kinds a query asks for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Wanted {
    addr: bool,
    ptr: bool,
    srv: bool,
    txt: bool,
}

impl Wanted {
    fn add(&mut self, qtype: Option<RRType>) {
        match qtype {
            Some(RRType::A) => self.addr = true,
            Some(RRType::PTR) => self.ptr = true,
            Some(RRType::SRV) => self.srv = true,
            Some(RRType::TXT) => self.txt = true,
            Some(RRType::ANY) => {
                *self = Wanted {
                    addr: true,
                    ptr: true,
                    srv: true,
                    txt: true,
                }
            }
            None => {}
        }
    }

    fn any(&self) -> bool {
        self.addr || self.ptr || self.srv || self.txt
    }
}

/// Runs on the responder thread.
struct ZeroconfHandler {
    config: ZeroconfConfig,
    identity: ReceiverIdentity,
    route: Arc<dyn RouteSelector>,
}

impl ZeroconfHandler {
    /// Returns true if `name` is about our service, host or instance.
    fn is_ours(&self, name: &str, fullname: &str) -> bool {
        same_name(name, &self.config.service_type)
            || same_name(name, fullname)
            || same_name(name, &self.config.host_name)
            || name.to_lowercase().contains(&self.config.short_name)
    }

    /// Builds the answer to `query` from `peer`, or `None` if there is nothing to say.
    fn respond(&self, query: &DnsIncoming, peer: Ipv4Addr) -> Option<DnsOutgoing> {
        // One snapshot for the whole response.
        let identity = self.identity.get();
        let instance = match identity.as_deref() {
            Some(id) if is_single_label(id) => id,
            Some(id) => {
                debug!(
                    "receiver id {:?} is not a single DNS label, advertising as {}",
                    id, self.config.instance_name
                );
                self.config.instance_name.as_str()
            }
            None => self.config.instance_name.as_str(),
        };
        let fullname = format!("{}.{}", instance, self.config.service_type);

        // Only questions that get an answer are echoed, once each.
        let mut wanted = Wanted::default();
        let mut echoed: Vec<&DnsQuestion> = Vec::new();
        for question in query.questions() {
            if !self.is_ours(question.entry_name(), &fullname) {
                trace!("not our question: {}", question.entry_name());
                continue;
            }
            if question.entry_type().is_none() {
                continue;
            }
            wanted.add(question.entry_type());

            let seen = echoed.iter().any(|q| {
                q.raw_type() == question.raw_type()
                    && same_name(q.entry_name(), question.entry_name())
            });
            if !seen && echoed.len() < MAX_ECHOED_QUESTIONS {
                echoed.push(question);
            }
        }

        if !wanted.any() {
            return None;
        }

        let mut out = DnsOutgoing::response_to(query);
        for question in echoed {
            out.add_question_entry(question);
        }

        let ttl = self.config.ttl;
        if wanted.addr {
            let addr = self.route.best_local_addr_for(peer);
            debug!("offering {} to {}", addr, peer);
            out.add_answer(DnsAddress::new(&self.config.host_name, CLASS_IN, ttl, addr));
        }
        if wanted.ptr {
            out.add_answer(DnsPointer::new(
                &self.config.service_type,
                CLASS_IN,
                ttl,
                fullname.clone(),
            ));
        }
        if wanted.srv {
            out.add_answer(DnsSrv::new(
                &fullname,
                CLASS_IN,
                ttl,
                0,
                0,
                self.config.service_port,
                self.config.host_name.clone(),
            ));
        }
        if wanted.txt {
            let mut strings = vec!["type=sink".to_string()];
            if let Some(id) = identity.as_deref() {
                strings.push(format!("receiver_id={}", id));
            }
            out.add_answer(DnsTxt::from_strings(&fullname, CLASS_IN, ttl, &strings));
        }

        Some(out)
    }
}

impl DatagramHandler for ZeroconfHandler {
    fn handle_datagram(&mut self, packet: &[u8], from: SocketAddr) -> Result<Option<Vec<u8>>> {
        let peer = match from {
            SocketAddr::V4(v4) => *v4.ip(),
            SocketAddr::V6(_) => {
                trace!("ignore IPv6 source {}", from);
                return Ok(None);
            }
        };

        let msg = DnsIncoming::new(packet.to_vec())?;

        // Other responders' announcements arrive on the same group.
        if !msg.is_query() || msg.questions().is_empty() {
            return Ok(None);
        }

        Ok(self.respond(&msg, peer).map(|out| out.to_data_on_wire()))
    }
}
