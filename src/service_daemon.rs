//! Background service loop shared by the responders.
//!
//! A [ServiceDaemon] owns one named thread that polls a single UDP socket
//! together with a loopback "signal" socket. Commands reach the thread over a
//! `flume` channel, and a datagram sent to the signal socket wakes the poller
//! so a command never waits for the poll timeout:
//!
//!```text
//!  Host                    <channel>              daemon thread
//!    |                                                 | poll(500ms)
//!    |  --- Command::GetMetrics ---> + signal -->      |
//!    |  <-- Metrics ---                                |
//!    |                                                 | datagram in
//!    |                                                 |  -> DatagramHandler
//!    |                                                 |  -> response out
//!    |  --- Command::Exit ---------> + signal -->      |
//!    |  <-- DaemonStatus::Shutdown ---                 | socket closed
//!```
//!
//! What the thread does with a datagram is up to its [DatagramHandler].

#[cfg(feature = "logging")]
use crate::log::{debug, trace};
use crate::{
    dns_parser::MAX_MSG_ABSOLUTE,
    error::{e_fmt, Error, Result},
    Receiver,
};
use flume::{bounded, Sender, TryRecvError, TrySendError};
use mio::{net::UdpSocket as MioUdpSocket, Poll};
use socket2::Socket;
use std::{
    collections::HashMap,
    fmt,
    io::ErrorKind,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket},
    sync::{Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::Duration,
};

const LOOPBACK_V4: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

/// Upper bound of one poll, so the command channel is checked at least this often.
const POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause after a poll or receive error, to avoid spinning on a broken socket.
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

const SERVICE_SOCK_EVENT_KEY: usize = 0;
const SIGNAL_SOCK_EVENT_KEY: usize = usize::MAX - 1; // avoid to overlap with the service socket

/// Status code for the service daemon.
#[derive(Debug, PartialEq, Clone, Eq)]
#[non_exhaustive]
pub enum DaemonStatus {
    /// The daemon is running as normal.
    Running,

    /// The daemon has been shutdown.
    Shutdown,
}

/// Different counters included in the metrics.
#[derive(Hash, Eq, PartialEq, Clone, Copy)]
enum Counter {
    Received,
    DecodeError,
    Ignored,
    Respond,
    SendError,
    RecvError,
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::DecodeError => write!(f, "decode-error"),
            Self::Ignored => write!(f, "ignored"),
            Self::Respond => write!(f, "respond"),
            Self::SendError => write!(f, "send-error"),
            Self::RecvError => write!(f, "recv-error"),
        }
    }
}

/// The metrics is a HashMap of (name_key, i64_value).
/// The main purpose is to help monitoring the packet traffic of a responder.
pub type Metrics = HashMap<String, i64>;

/// Turns one received datagram into an optional reply.
///
/// Returning `Err` counts the datagram as undecodable, `Ok(None)` as ignored.
/// A reply is sent back to `from` on the same socket.
pub(crate) trait DatagramHandler: Send + 'static {
    fn handle_datagram(&mut self, packet: &[u8], from: SocketAddr) -> Result<Option<Vec<u8>>>;
}

/// A handle to a running daemon thread.
pub(crate) struct ServiceDaemon {
    /// Sender handle of the channel to the daemon.
    sender: Sender<Command>,

    /// Send to this addr to signal that a `Command` is coming.
    signal_addr: SocketAddr,

    /// The address of the service socket, with the port the OS picked.
    local_addr: SocketAddr,

    thread: JoinHandle<()>,
}

impl ServiceDaemon {
    /// Spawns a thread named `name` to serve datagrams arriving on `sock`.
    ///
    /// `sock` must be bound and non-blocking already.
    pub(crate) fn spawn<H: DatagramHandler>(
        name: &str,
        sock: UdpSocket,
        handler: H,
    ) -> Result<Self> {
        let local_addr = sock
            .local_addr()
            .map_err(|e| e_fmt!("failed to get service sock addr: {}", e))?;

        // Use port 0 to allow the system assign a random available port,
        // no need for a pre-defined port number.
        let signal_addr = SocketAddrV4::new(LOOPBACK_V4, 0);

        let signal_sock = UdpSocket::bind(signal_addr)
            .map_err(|e| e_fmt!("failed to create signal_sock for daemon: {}", e))?;

        // Get the socket with the OS chosen port
        let signal_addr = signal_sock
            .local_addr()
            .map_err(|e| e_fmt!("failed to get signal sock addr: {}", e))?;

        // Must be nonblocking so we can listen to it together with the service socket.
        signal_sock
            .set_nonblocking(true)
            .map_err(|e| e_fmt!("failed to set nonblocking for signal socket: {}", e))?;

        let poller = Poll::new().map_err(|e| e_fmt!("failed to create mio Poll: {e}"))?;

        let (sender, receiver) = bounded(100);

        let daemon = Daemon {
            poller,
            signal_sock: MioUdpSocket::from_std(signal_sock),
            sock: MioUdpSocket::from_std(sock),
            handler,
            counters: Metrics::new(),
        };

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || daemon_thread(daemon, receiver))
            .map_err(|e| e_fmt!("thread builder failed to spawn: {}", e))?;

        Ok(Self {
            sender,
            signal_addr,
            local_addr,
            thread,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns true if the daemon thread has stopped listening to commands.
    pub(crate) fn is_disconnected(&self) -> bool {
        self.sender.is_disconnected()
    }

    /// Sends `cmd` to the daemon via its channel, and sends a signal
    /// to its sock addr to notify.
    fn send_cmd(&self, cmd: Command) -> Result<()> {
        let cmd_name = cmd.to_string();

        // First, send to the flume channel.
        self.sender.try_send(cmd).map_err(|e| match e {
            TrySendError::Full(_) => Error::Again,
            e => e_fmt!("flume::channel::send failed: {}", e),
        })?;

        // Second, send a signal to notify the daemon.
        let addr = SocketAddrV4::new(LOOPBACK_V4, 0);
        let socket = UdpSocket::bind(addr)
            .map_err(|e| e_fmt!("Failed to create socket to send signal: {}", e))?;
        socket
            .send_to(cmd_name.as_bytes(), self.signal_addr)
            .map_err(|e| {
                e_fmt!(
                    "signal socket send_to {} ({}) failed: {}",
                    self.signal_addr,
                    cmd_name,
                    e
                )
            })?;

        Ok(())
    }

    /// Returns a channel receiver for the metrics, e.g. input/output counters.
    ///
    /// The metrics returned is a snapshot. Hence the caller should call
    /// this method repeatedly if they want to monitor the metrics continuously.
    pub(crate) fn get_metrics(&self) -> Result<Receiver<Metrics>> {
        let (resp_s, resp_r) = bounded(1);
        self.send_cmd(Command::GetMetrics(resp_s))?;
        Ok(resp_r)
    }

    /// Returns the status of the daemon.
    pub(crate) fn status(&self) -> Result<Receiver<DaemonStatus>> {
        let (resp_s, resp_r) = bounded(1);

        if self.sender.is_disconnected() {
            resp_s
                .send(DaemonStatus::Shutdown)
                .map_err(|e| e_fmt!("failed to send daemon status to the client: {}", e))?;
        } else {
            self.send_cmd(Command::GetStatus(resp_s))?;
        }

        Ok(resp_r)
    }

    /// Stops the daemon thread and waits for it to exit.
    ///
    /// The service socket is closed when this returns.
    pub(crate) fn shutdown(self) -> DaemonStatus {
        let (resp_s, resp_r) = bounded(1);
        if let Err(e) = self.send_cmd(Command::Exit(resp_s)) {
            // Dropping the sender below also ends the loop, within one poll timeout.
            debug!("failed to send exit command: {}", e);
        }

        let Self { sender, thread, .. } = self;
        drop(sender);

        if thread.join().is_err() {
            debug!("daemon thread panicked");
        }

        resp_r.try_recv().unwrap_or(DaemonStatus::Shutdown)
    }
}

/// Start/stop bookkeeping for a responder.
///
/// `start_with` and `stop` take `&self` and may race from different threads:
/// the inner lock makes them take turns, and `stop` holds it until the thread
/// has exited so a following `start` can bind the same port again.
#[derive(Default)]
pub(crate) struct DaemonSlot {
    daemon: Mutex<Option<ServiceDaemon>>,
}

impl DaemonSlot {
    fn lock(&self) -> MutexGuard<'_, Option<ServiceDaemon>> {
        self.daemon.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `spawn` unless a daemon is already running. Idempotent.
    pub(crate) fn start_with<F>(&self, spawn: F) -> Result<()>
    where
        F: FnOnce() -> Result<ServiceDaemon>,
    {
        let mut slot = self.lock();
        if slot.is_some() {
            return Ok(());
        }
        *slot = Some(spawn()?);
        Ok(())
    }

    /// Stops the daemon if there is one. Safe to call any number of times.
    pub(crate) fn stop(&self) -> Option<DaemonStatus> {
        let mut slot = self.lock();
        slot.take().map(ServiceDaemon::shutdown)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .map_or(false, |daemon| !daemon.is_disconnected())
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        self.lock().as_ref().map(ServiceDaemon::local_addr)
    }

    pub(crate) fn get_metrics(&self) -> Result<Receiver<Metrics>> {
        match self.lock().as_ref() {
            Some(daemon) => daemon.get_metrics(),
            None => Err(e_fmt!("get_metrics: not running")),
        }
    }

    pub(crate) fn status(&self) -> Result<Receiver<DaemonStatus>> {
        match self.lock().as_ref() {
            Some(daemon) => daemon.status(),
            None => {
                let (resp_s, resp_r) = bounded(1);
                resp_s
                    .send(DaemonStatus::Shutdown)
                    .map_err(|e| e_fmt!("failed to send daemon status to the client: {}", e))?;
                Ok(resp_r)
            }
        }
    }
}

/// Creates a new non-blocking UDP socket bound to `addr` with SO_REUSEADDR,
/// and SO_REUSEPORT on unix when `reuse_port` is true.
pub(crate) fn new_socket(addr: SocketAddr, reuse_port: bool) -> Result<Socket> {
    let domain = match addr {
        SocketAddr::V4(_) => socket2::Domain::IPV4,
        SocketAddr::V6(_) => socket2::Domain::IPV6,
    };

    let fd = Socket::new(domain, socket2::Type::DGRAM, None)
        .map_err(|e| e_fmt!("create socket failed: {}", e))?;

    fd.set_reuse_address(true)
        .map_err(|e| e_fmt!("set ReuseAddr failed: {}", e))?;
    #[cfg(unix)] // this is currently restricted to Unix's in socket2
    if reuse_port {
        fd.set_reuse_port(true)
            .map_err(|e| e_fmt!("set ReusePort failed: {}", e))?;
    }
    #[cfg(not(unix))]
    let _ = reuse_port;

    fd.set_nonblocking(true)
        .map_err(|e| e_fmt!("set O_NONBLOCK: {}", e))?;

    fd.bind(&addr.into())
        .map_err(|e| e_fmt!("socket bind to {} failed: {}", &addr, e))?;

    trace!("new socket bind to {}", &addr);
    Ok(fd)
}

/// State owned by the daemon thread.
struct Daemon<H> {
    poller: Poll,
    signal_sock: MioUdpSocket,
    sock: MioUdpSocket,
    handler: H,
    counters: Metrics,
}

/// Result of one receive attempt on the service socket.
enum ReadStatus {
    Packet,
    Drained,
    Failed,
}

fn daemon_thread<H: DatagramHandler>(daemon: Daemon<H>, receiver: Receiver<Command>) {
    if let Some(cmd) = daemon.run(receiver) {
        match cmd {
            Command::Exit(resp_s) => {
                if let Err(e) = resp_s.send(DaemonStatus::Shutdown) {
                    debug!("exit: failed to send response of shutdown: {}", e);
                }
            }
            _ => {
                debug!("Unexpected command: {}", cmd);
            }
        }
    }
}

impl<H: DatagramHandler> Daemon<H> {
    /// The main event loop of the daemon thread
    ///
    /// In each round, it will:
    /// 1. try_recv on its channel and execute commands.
    /// 2. poll the sockets with a timeout.
    /// 3. process the incoming datagrams if any.
    /// 4. back off for a short while after a poll or receive error.
    ///
    /// Returns the `Exit` command if there is one, `None` when the command
    /// channel is gone or the sockets cannot be polled.
    fn run(mut self, receiver: Receiver<Command>) -> Option<Command> {
        // Add the daemon's signal socket to the poller.
        if let Err(e) = self.poller.registry().register(
            &mut self.signal_sock,
            mio::Token(SIGNAL_SOCK_EVENT_KEY),
            mio::Interest::READABLE,
        ) {
            debug!("failed to add signal socket to the poller: {}", e);
            return None;
        }

        if let Err(e) = self.poller.registry().register(
            &mut self.sock,
            mio::Token(SERVICE_SOCK_EVENT_KEY),
            mio::Interest::READABLE,
        ) {
            debug!("failed to add service socket to the poller: {}", e);
            return None;
        }

        let mut events = mio::Events::with_capacity(64);
        loop {
            // process commands from the command channel
            loop {
                match receiver.try_recv() {
                    Ok(Command::Exit(resp_s)) => return Some(Command::Exit(resp_s)),
                    Ok(command) => self.exec_command(command),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        debug!("command channel closed, daemon exits");
                        return None;
                    }
                }
            }

            events.clear();
            let failed = match self.poller.poll(&mut events, Some(POLL_TIMEOUT)) {
                Ok(_) => self.handle_poller_events(&events),
                Err(e) => {
                    debug!("failed to select from sockets: {}", e);
                    true
                }
            };

            if failed {
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    /// Returns true if reading the service socket failed.
    fn handle_poller_events(&mut self, events: &mio::Events) -> bool {
        let mut failed = false;

        for ev in events.iter() {
            trace!("event received with key {:?}", ev.token());
            if ev.token().0 == SIGNAL_SOCK_EVENT_KEY {
                // Drain signals as we will drain commands as well.
                self.signal_sock_drain();

                if let Err(e) = self.poller.registry().reregister(
                    &mut self.signal_sock,
                    ev.token(),
                    mio::Interest::READABLE,
                ) {
                    debug!("failed to modify poller for signal socket: {}", e);
                }
                continue; // Next event.
            }

            // Read until no more packets available.
            loop {
                match self.handle_read() {
                    ReadStatus::Packet => continue,
                    ReadStatus::Drained => break,
                    ReadStatus::Failed => {
                        failed = true;
                        break;
                    }
                }
            }

            // we continue to monitor this socket.
            if let Err(e) =
                self.poller
                    .registry()
                    .reregister(&mut self.sock, ev.token(), mio::Interest::READABLE)
            {
                debug!("failed to modify poller for service socket: {}", e);
                failed = true;
            }
        }

        failed
    }

    /// Reads one datagram from the service socket and replies to it if needed.
    fn handle_read(&mut self) -> ReadStatus {
        let mut buf = vec![0u8; MAX_MSG_ABSOLUTE];

        // If the datagram is larger than `buf`, excess bytes may or may not
        // be truncated by the socket layer depending on the platform's libc.
        // In any case, such large datagram will not be decoded properly and
        // should not crash.
        let (sz, from) = match self.sock.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return ReadStatus::Drained,
            Err(e) => {
                debug!("service socket read failed: {}", e);
                self.increase_counter(Counter::RecvError, 1);
                return ReadStatus::Failed;
            }
        };

        trace!("received {} bytes from {}", sz, from);
        self.increase_counter(Counter::Received, 1);

        match self.handler.handle_datagram(&buf[..sz], from) {
            Ok(Some(packet)) => self.send_packet(&packet, from),
            Ok(None) => self.increase_counter(Counter::Ignored, 1),
            Err(e) => {
                debug!("dropped datagram from {}: {}", from, e);
                self.increase_counter(Counter::DecodeError, 1);
            }
        }

        ReadStatus::Packet
    }

    fn send_packet(&mut self, packet: &[u8], addr: SocketAddr) {
        match self.sock.send_to(packet, addr) {
            Ok(sz) => {
                trace!("sent out {} bytes to {}", sz, addr);
                self.increase_counter(Counter::Respond, 1);
            }
            Err(e) => {
                debug!("Failed to send to {}: {}", addr, e);
                self.increase_counter(Counter::SendError, 1);
            }
        }
    }

    fn exec_command(&mut self, command: Command) {
        match command {
            Command::GetMetrics(resp_s) => match resp_s.send(self.counters.clone()) {
                Ok(()) => trace!("Sent metrics to the client"),
                Err(e) => debug!("Failed to send metrics: {}", e),
            },

            Command::GetStatus(resp_s) => {
                if let Err(e) = resp_s.send(DaemonStatus::Running) {
                    debug!("Failed to send status: {}", e);
                }
            }

            Command::Exit(_) => {
                debug!("Exit command is handled by the run loop");
            }
        }
    }

    fn increase_counter(&mut self, counter: Counter, count: i64) {
        *self.counters.entry(counter.to_string()).or_insert(0) += count;
    }

    fn signal_sock_drain(&self) {
        let mut signal_buf = [0; 1024];

        // This recv is non-blocking as the socket is non-blocking.
        while let Ok(sz) = self.signal_sock.recv(&mut signal_buf) {
            trace!(
                "signal socket recvd: {}",
                String::from_utf8_lossy(&signal_buf[0..sz])
            );
        }
    }
}

/// Commands supported by the daemon
#[derive(Debug)]
enum Command {
    /// Read the current values of the counters
    GetMetrics(Sender<Metrics>),

    /// Get the current status of the daemon.
    GetStatus(Sender<DaemonStatus>),

    Exit(Sender<DaemonStatus>),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetMetrics(_) => write!(f, "Command GetMetrics"),
            Self::GetStatus(_) => write!(f, "Command GetStatus"),
            Self::Exit(_) => write!(f, "Command Exit"),
        }
    }
}
