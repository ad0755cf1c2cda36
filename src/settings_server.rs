//! Unicast settings query server.
//!
//! Peers ask for the current audio format with a plain DNS TXT query for
//! [SETTINGS_DOMAIN] on a private port. The answer is one TXT string:
//!
//! ```text
//! bit_depth=24;sample_rate=96000;channels=2;channel_layout=stereo;receiver_id=kitchen
//! ```
//!
//! The status code tells a querier what to do next: SERVFAIL means "ask
//! again shortly", NXDOMAIN means "wrong question".

#[cfg(feature = "logging")]
use crate::log::{debug, info, trace};
use crate::{
    dns_parser::{
        same_name, DnsIncoming, DnsOutgoing, DnsTxt, RRType, CLASS_IN, RCODE_NAME_ERROR,
        RCODE_SERVER_FAILURE,
    },
    error::Result,
    identity::ReceiverIdentity,
    service_daemon::{new_socket, DaemonSlot, DaemonStatus, DatagramHandler, Metrics, ServiceDaemon},
    Receiver,
};
use std::{
    fmt,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket},
    sync::Arc,
};

/// The only name this server knows.
pub const SETTINGS_DOMAIN: &str = "settings.audiosink.local.";

pub const SETTINGS_PORT: u16 = 15353;

/// TTL of the settings record, in seconds. Short, as the format can change any time.
pub const SETTINGS_TTL: u32 = 60;

/// The current audio format of the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSettings {
    pub bit_depth: u32,
    pub sample_rate: u32,
    pub channels: u32,
    pub channel_layout: String,
}

impl AudioSettings {
    pub fn new(bit_depth: u32, sample_rate: u32, channels: u32, channel_layout: &str) -> Self {
        Self {
            bit_depth,
            sample_rate,
            channels,
            channel_layout: channel_layout.to_string(),
        }
    }
}

impl fmt::Display for AudioSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bit_depth={};sample_rate={};channels={};channel_layout={}",
            self.bit_depth, self.sample_rate, self.channels, self.channel_layout
        )
    }
}

/// Supplies the audio format on every settings query.
///
/// Implemented for any `Fn() -> Option<AudioSettings>` closure. It is
/// called on the server thread, so it should return quickly.
pub trait SettingsProvider: Send + Sync + 'static {
    /// Returns `None` while the format is unknown.
    fn current_settings(&self) -> Option<AudioSettings>;
}

impl<F> SettingsProvider for F
where
    F: Fn() -> Option<AudioSettings> + Send + Sync + 'static,
{
    fn current_settings(&self) -> Option<AudioSettings> {
        self()
    }
}

/// Options of a [SettingsServer].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsServerConfig {
    bind_addr: SocketAddr,
    domain: String,
    ttl: u32,
}

impl Default for SettingsServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, SETTINGS_PORT).into(),
            domain: SETTINGS_DOMAIN.to_string(),
            ttl: SETTINGS_TTL,
        }
    }
}

impl SettingsServerConfig {
    /// Port 0 lets the OS pick one, see [SettingsServer::local_addr].
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_string();
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }
}

/// The settings query server.
///
/// `start` and `stop` follow the same rules as
/// [ZeroconfResponder](crate::ZeroconfResponder).
pub struct SettingsServer {
    config: SettingsServerConfig,
    identity: ReceiverIdentity,
    provider: Arc<dyn SettingsProvider>,
    slot: DaemonSlot,
}

impl SettingsServer {
    pub fn new<P: SettingsProvider>(
        config: SettingsServerConfig,
        identity: ReceiverIdentity,
        provider: P,
    ) -> Self {
        Self {
            config,
            identity,
            provider: Arc::new(provider),
            slot: DaemonSlot::default(),
        }
    }

    /// Updates the identity in responses, starting with the next query.
    ///
    /// Same as calling `set` on the [ReceiverIdentity] given to `new`.
    pub fn set_receiver_identity(&self, id: &str) {
        self.identity.set(id);
    }

    pub fn receiver_identity(&self) -> &ReceiverIdentity {
        &self.identity
    }

    /// Binds the server socket and starts answering.
    ///
    /// Does nothing if already running. On error, the server stays stopped.
    pub fn start(&self) -> Result<()> {
        self.slot.start_with(|| {
            let sock = new_socket(self.config.bind_addr, false)?;
            let handler = SettingsHandler {
                domain: self.config.domain.clone(),
                ttl: self.config.ttl,
                identity: self.identity.clone(),
                provider: self.provider.clone(),
            };
            let daemon = ServiceDaemon::spawn("settings_server", UdpSocket::from(sock), handler)?;
            info!("settings server listening on {}", daemon.local_addr());
            Ok(daemon)
        })
    }

    /// Stops answering and closes the socket. Safe to call when not running.
    pub fn stop(&self) {
        if let Some(status) = self.slot.stop() {
            info!("settings server stopped: {:?}", status);
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

impl Drop for SettingsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs on the server thread.
struct SettingsHandler {
    domain: String,
    ttl: u32,
    identity: ReceiverIdentity,
    provider: Arc<dyn SettingsProvider>,
}

impl SettingsHandler {
    /// Only the first question is dispatched and echoed.
    fn respond(&self, query: &DnsIncoming) -> Option<DnsOutgoing> {
        let question = query.questions().first()?;
        if query.questions().len() > 1 {
            trace!("ignore {} extra questions", query.questions().len() - 1);
        }

        let mut out = DnsOutgoing::response_to(query);
        out.add_question_entry(question);

        let name = question.entry_name();
        if question.entry_type() != Some(RRType::TXT) || !same_name(name, &self.domain) {
            trace!("no such name: {} type {}", name, question.raw_type());
            out.set_rcode(RCODE_NAME_ERROR);
            return Some(out);
        }

        match (self.provider.current_settings(), self.identity.get()) {
            (Some(settings), Some(id)) => {
                let text = format!("{};receiver_id={}", settings, id);
                trace!("settings answer: {}", &text);
                out.add_answer(DnsTxt::from_strings(name, CLASS_IN, self.ttl, &[text]));
            }
            (settings, id) => {
                debug!(
                    "settings unavailable (settings: {}, identity: {})",
                    settings.is_some(),
                    id.is_some()
                );
                out.set_rcode(RCODE_SERVER_FAILURE);
            }
        }

        Some(out)
    }
}

impl DatagramHandler for SettingsHandler {
    fn handle_datagram(&mut self, packet: &[u8], _from: SocketAddr) -> Result<Option<Vec<u8>>> {
        let msg = DnsIncoming::new(packet.to_vec())?;
        if !msg.is_query() {
            return Ok(None);
        }
        Ok(self.respond(&msg).map(|out| out.to_data_on_wire()))
    }
}
