//! Route-aware service advertisement for an audio sink on the local network.
//!
//! This library runs two independent UDP responders, each on its own thread,
//! and provides a small blocking client:
//!
//! - [`ZeroconfResponder`] listens on the mDNS port (5353), answers queries
//!   about the audio-sink service and always offers the local address that
//!   the querier can reach, chosen per query by a [`RouteSelector`].
//! - [`SettingsServer`] answers a single TXT query on a private port with the
//!   current audio format, fetched live from a [`SettingsProvider`].
//! - [`DiscoveryClient`] resolves a well-known peer host and builds the URL
//!   of its menu page.
//!
//! Both responders are controlled with `start()` / `stop()`. Internally each
//! one owns a daemon thread that is driven through a
//! [`flume`](https://crates.io/crates/flume) command channel:
//!```text
//!  Host              <channel>            responder thread
//!    |                                         | polls its UDP socket
//!    |   --- GetMetrics -->                    |
//!    |   <-- Metrics --                        |
//!    |                                         | query in -> response out
//!    |   --- Exit -->                          |
//!    |                                         | closes socket, exits
//!```
//!
//! # Usage
//!
//! ```no_run
//! use audiosink_discovery::{
//!     AudioSettings, ReceiverIdentity, SettingsServer, SettingsServerConfig, ZeroconfConfig,
//!     ZeroconfResponder,
//! };
//!
//! let identity = ReceiverIdentity::new();
//! identity.set("living-room");
//!
//! let responder = ZeroconfResponder::new(ZeroconfConfig::default(), identity.clone());
//! responder.start().expect("failed to start the mDNS responder");
//!
//! let server = SettingsServer::new(SettingsServerConfig::default(), identity, || {
//!     Some(AudioSettings::new(24, 96000, 2, "stereo"))
//! });
//! server.start().expect("failed to start the settings server");
//!
//! // ... later
//! server.stop();
//! responder.stop();
//! ```
//!
//! # Limitations
//!
//! - Only IPv4.
//! - No recursion: the responders only answer for their own names.
//! - Discovery traffic is neither authenticated nor encrypted.

#![forbid(unsafe_code)]

// log for logging (optional).
#[cfg(feature = "logging")]
mod log {
    pub(crate) use ::log::{debug, info, trace};
}

#[cfg(not(feature = "logging"))]
#[macro_use]
mod log {
    macro_rules! trace {
        ($($arg:expr),* $(,)?) => {
            {
                let _ = ($($arg),*); // avoid warnings about unused variables.
            }
        };
    }

    macro_rules! debug {
        ($($arg:expr),* $(,)?) => {
            {
                let _ = ($($arg),*);
            }
        };
    }

    macro_rules! info {
        ($($arg:expr),* $(,)?) => {
            {
                let _ = ($($arg),*);
            }
        };
    }
}

mod error;

mod discovery;
mod dns_parser;
mod identity;
mod route;
mod service_daemon;
mod settings_server;
mod zeroconf;

pub use discovery::{
    discover_advertised_url, resolve_address, reverse_resolve, DiscoveryClient,
    DESKTOP_MENU_PATH, PEER_HOSTNAME,
};
pub use dns_parser::{
    DnsAddress, DnsIncoming, DnsOutgoing, DnsPointer, DnsQuestion, DnsRecordBox, DnsRecordExt,
    DnsSrv, DnsTxt, RRType, CLASS_IN, FLAGS_AA, FLAGS_QR_QUERY, FLAGS_QR_RESPONSE, FLAGS_RD,
    MAX_MSG_ABSOLUTE, RCODE_NAME_ERROR, RCODE_NO_ERROR, RCODE_SERVER_FAILURE,
};
pub use error::{Error, Result};
pub use identity::ReceiverIdentity;
pub use route::{ConnectRoute, InterfaceTable, RouteSelector, SystemRoute};
pub use service_daemon::{DaemonStatus, Metrics};
pub use settings_server::{
    AudioSettings, SettingsProvider, SettingsServer, SettingsServerConfig, SETTINGS_DOMAIN,
    SETTINGS_PORT, SETTINGS_TTL,
};
pub use zeroconf::{
    ZeroconfConfig, ZeroconfResponder, ADVERTISE_TTL, DEFAULT_HOST_NAME, DEFAULT_INSTANCE_NAME,
    GROUP_ADDR_V4, MDNS_PORT, SERVICE_PORT, SERVICE_SHORT_NAME, SERVICE_TYPE,
};

/// Re-export from `flume`.
pub use flume::Receiver;
