use audiosink_discovery::{
    DaemonStatus, DnsAddress, DnsIncoming, DnsOutgoing, DnsRecordExt, ReceiverIdentity, RRType,
    ZeroconfConfig, ZeroconfResponder, DEFAULT_HOST_NAME, FLAGS_QR_QUERY, SERVICE_TYPE,
};
use std::{
    io::ErrorKind,
    net::{Ipv4Addr, SocketAddr, UdpSocket},
    time::Duration,
};
use test_log::test;

/// Starts a responder on a random port, or returns `None` if this host
/// cannot join the multicast group at all (e.g. a sandbox without network).
fn start_responder(identity: &ReceiverIdentity) -> Option<ZeroconfResponder> {
    let config = ZeroconfConfig::default().with_port(0);
    let responder = ZeroconfResponder::new(config, identity.clone());
    match responder.start() {
        Ok(()) => Some(responder),
        Err(e) => {
            println!("skipped, cannot start responder: {}", e);
            assert!(!responder.is_running());
            None
        }
    }
}

fn loopback_target(responder: &ZeroconfResponder) -> SocketAddr {
    let port = responder.local_addr().unwrap().port();
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

fn query(name: &str, qtype: RRType) -> Vec<u8> {
    let mut out = DnsOutgoing::new(FLAGS_QR_QUERY);
    out.set_id(fastrand::u16(..));
    out.add_question(name, qtype);
    out.to_data_on_wire()
}

#[test]
fn responder_answers_loopback_querier_with_loopback() {
    let identity = ReceiverIdentity::new();
    identity.set("kitchen");
    let responder = match start_responder(&identity) {
        Some(responder) => responder,
        None => return,
    };
    let target = loopback_target(&responder);

    let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
    sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    sock.send_to(&query(DEFAULT_HOST_NAME, RRType::A), target)
        .unwrap();

    let mut buf = [0u8; 1500];
    let (sz, _) = sock.recv_from(&mut buf).unwrap();
    let msg = DnsIncoming::new(buf[..sz].to_vec()).unwrap();
    assert!(msg.is_response());
    assert!(msg.is_authoritative());
    assert_eq!(msg.answers().len(), 1);

    let a = msg.answers()[0].any().downcast_ref::<DnsAddress>().unwrap();
    assert_eq!(a.get_name(), DEFAULT_HOST_NAME);
    assert_eq!(a.address(), Ipv4Addr::LOCALHOST);
    assert_eq!(a.get_ttl(), 3600);

    responder.stop();
}

#[test]
fn responder_stays_silent_on_unrelated_names() {
    let identity = ReceiverIdentity::new();
    let responder = match start_responder(&identity) {
        Some(responder) => responder,
        None => return,
    };
    let target = loopback_target(&responder);

    let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
    sock.set_read_timeout(Some(Duration::from_millis(500)))
        .unwrap();
    sock.send_to(&query("_printer._tcp.local.", RRType::PTR), target)
        .unwrap();
    sock.send_to(&[0x00, 0x01, 0x02], target).unwrap();

    let mut buf = [0u8; 1500];
    match sock.recv_from(&mut buf) {
        Ok((sz, from)) => panic!("unexpected {} bytes from {}", sz, from),
        Err(e) => assert!(
            matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut),
            "{}",
            e
        ),
    }

    // Both datagrams were seen, neither answered. Other hosts on the
    // segment may add to "received" and "respond".
    let metrics = responder.get_metrics().unwrap().recv().unwrap();
    assert!(metrics["received"] >= 2);
    assert!(metrics.get("decode-error").copied().unwrap_or(0) >= 1);

    // A matching question still gets an answer.
    sock.send_to(&query(SERVICE_TYPE, RRType::PTR), target)
        .unwrap();
    let (sz, _) = sock.recv_from(&mut buf).unwrap();
    let msg = DnsIncoming::new(buf[..sz].to_vec()).unwrap();
    assert_eq!(msg.answers()[0].get_type(), RRType::PTR);
}

#[test]
fn responder_start_stop_is_idempotent() {
    let identity = ReceiverIdentity::new();
    let never_started = ZeroconfResponder::new(ZeroconfConfig::default(), identity.clone());
    never_started.stop();
    never_started.stop();
    assert!(!never_started.is_running());
    assert_eq!(
        never_started.status().unwrap().recv().unwrap(),
        DaemonStatus::Shutdown
    );

    let responder = match start_responder(&identity) {
        Some(responder) => responder,
        None => return,
    };
    let addr = responder.local_addr();
    responder.start().unwrap();
    assert_eq!(responder.local_addr(), addr);
    assert_eq!(
        responder.status().unwrap().recv().unwrap(),
        DaemonStatus::Running
    );

    responder.stop();
    responder.stop();
    assert!(!responder.is_running());

    // And it can run again.
    responder.start().unwrap();
    assert!(responder.is_running());
    responder.stop();
}
