//! End-to-end link scenarios over localhost sockets.
//!
//! A stub TCP listener stands in for the supervising process, and raw UDP
//! sockets stand in for the remote peer wherever a test needs byte-level
//! control over what goes on the wire.

use setu_io::frame;
use setu_io::{Error, LinkConfig, LinkState, UdpLink};
use std::io::Read;
use std::net::{SocketAddr, TcpListener, UdpSocket};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Stub supervisor: accepts any number of link connections and forwards
/// every byte it receives into the channel.
fn spawn_supervisor() -> (u16, mpsc::Receiver<u8>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        while let Ok((mut stream, _)) = listener.accept() {
            let tx = tx.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 16];
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            for &b in &buf[..n] {
                                let _ = tx.send(b);
                            }
                        }
                    }
                }
            });
        }
    });

    (port, rx)
}

fn test_config(tcp_port: u16) -> LinkConfig {
    LinkConfig {
        tcp_port,
        socket_timeout_sec: 0.1,
        ..LinkConfig::default()
    }
}

/// Build a 7-byte handshake datagram
fn hs_bytes(num_outputs: u16, num_inputs: u16, tag: u8, max_age: u16) -> [u8; 7] {
    let mut buf = [0u8; 7];
    buf[0..2].copy_from_slice(&num_outputs.to_le_bytes());
    buf[2..4].copy_from_slice(&num_inputs.to_le_bytes());
    buf[4] = tag;
    buf[5..7].copy_from_slice(&max_age.to_le_bytes());
    buf
}

/// Raw socket standing in for the remote peer of a client-mode link
struct RawPeer {
    socket: UdpSocket,
    link_addr: SocketAddr,
}

impl RawPeer {
    fn send_bytes(&self, bytes: &[u8]) {
        self.socket.send_to(bytes, self.link_addr).unwrap();
    }
}

/// Bring up a client-mode link against a raw peer socket and complete the
/// handshake with a mirrored advertisement.
fn client_link_with_raw_peer(
    num_inputs: u16,
    num_outputs: u16,
    config: LinkConfig,
) -> (UdpLink, RawPeer) {
    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let peer_port = peer.local_addr().unwrap().port();

    let mut link = UdpLink::new(config).unwrap();
    link.setup("127.0.0.1", peer_port, num_inputs, num_outputs, false)
        .unwrap();

    let handshaker = thread::spawn(move || link.handshake(HANDSHAKE_TIMEOUT).map(|_| link));

    let mut buf = [0u8; 16];
    let (n, link_addr) = peer.recv_from(&mut buf).unwrap();
    assert_eq!(n, 7, "link must advertise exactly 7 bytes");
    peer.send_to(&hs_bytes(num_inputs, num_outputs, b'f', 3), link_addr)
        .unwrap();

    let link = handshaker.join().unwrap().expect("handshake failed");
    (link, RawPeer {
        socket: peer,
        link_addr,
    })
}

fn poll_until<F: Fn() -> bool>(deadline: Duration, f: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_pair_handshake_and_round_trip() {
    init_logging();
    let (port, _rx) = spawn_supervisor();

    let mut server = UdpLink::new(test_config(port)).unwrap();
    server.setup("0.0.0.0", 0, 2, 2, true).unwrap();
    let server_port = server.local_addr().unwrap().port();

    let mut client = UdpLink::new(test_config(port)).unwrap();
    client
        .setup("127.0.0.1", server_port, 2, 2, false)
        .unwrap();

    let server_hs = thread::spawn(move || server.handshake(HANDSHAKE_TIMEOUT).map(|_| server));
    client.handshake(HANDSHAKE_TIMEOUT).unwrap();
    let mut server = server_hs.join().unwrap().expect("server handshake failed");

    assert_eq!(client.state(), LinkState::Ready);
    assert_eq!(server.state(), LinkState::Ready);
    let st = client.get_status();
    assert_eq!(st.receive_type, Some('f'));
    assert_eq!(st.num_inputs, 2);
    assert_eq!(st.num_outputs, 2);
    assert_eq!(client.remote_max_age(), Some(3));

    server.start().unwrap();
    client.start().unwrap();
    client.start().unwrap(); // idempotent while running
    assert!(client.get_status().running);

    // Client to server
    client.send(&[1.0, 2.0]).unwrap();
    assert!(poll_until(Duration::from_secs(5), || {
        server.get_status().packets_received >= 1
    }));
    assert_eq!(server.get_latest(), Some(vec![1.0, 2.0]));
    assert_eq!(server.get_latest(), None); // consumed

    // Server to client
    server.send(&[3.0, 4.0]).unwrap();
    assert!(poll_until(Duration::from_secs(5), || {
        client.get_status().packets_received >= 1
    }));
    assert_eq!(client.get_latest(), Some(vec![3.0, 4.0]));

    assert_eq!(client.get_status().packets_sent, 1);
    assert_eq!(server.get_status().packets_sent, 1);

    client.close().unwrap();
    server.close().unwrap();
    assert!(!client.get_status().running);
    assert_eq!(client.state(), LinkState::Closed);
}

#[test]
fn test_handshake_width_mismatch_leaves_bound() {
    init_logging();
    let (port, _rx) = spawn_supervisor();

    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let peer_port = peer.local_addr().unwrap().port();

    let mut link = UdpLink::new(test_config(port)).unwrap();
    link.setup("127.0.0.1", peer_port, 4, 2, false).unwrap();

    let handshaker = thread::spawn(move || {
        let result = link.handshake(HANDSHAKE_TIMEOUT);
        (link, result)
    });

    let mut buf = [0u8; 16];
    let (n, link_addr) = peer.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], &hs_bytes(2, 4, b'f', 3));

    // Peer claims to provide 3 values; we expect 4
    peer.send_to(&hs_bytes(3, 2, b'f', 3), link_addr).unwrap();

    let (link, result) = handshaker.join().unwrap();
    assert!(matches!(result, Err(Error::Handshake(_))));
    assert_eq!(link.state(), LinkState::Bound);
}

#[test]
fn test_handshake_malformed_reply_fails() {
    init_logging();
    let (port, _rx) = spawn_supervisor();

    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let peer_port = peer.local_addr().unwrap().port();

    let mut link = UdpLink::new(test_config(port)).unwrap();
    link.setup("127.0.0.1", peer_port, 4, 2, false).unwrap();

    let handshaker = thread::spawn(move || {
        let result = link.handshake(HANDSHAKE_TIMEOUT);
        (link, result)
    });

    let mut buf = [0u8; 16];
    let (_, link_addr) = peer.recv_from(&mut buf).unwrap();
    // Truncated reply
    peer.send_to(&hs_bytes(2, 4, b'f', 3)[..6], link_addr)
        .unwrap();

    let (link, result) = handshaker.join().unwrap();
    assert!(matches!(result, Err(Error::Handshake(_))));
    assert_eq!(link.state(), LinkState::Bound);
}

#[test]
fn test_handshake_timeout_then_retry() {
    init_logging();
    let (port, _rx) = spawn_supervisor();

    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let peer_port = peer.local_addr().unwrap().port();

    let mut link = UdpLink::new(test_config(port)).unwrap();
    link.setup("127.0.0.1", peer_port, 2, 1, false).unwrap();

    // Peer stays silent for the first attempt
    let result = link.handshake(Duration::from_millis(200));
    assert!(matches!(result, Err(Error::Handshake(_))));
    assert_eq!(link.state(), LinkState::Bound);

    // Second attempt succeeds once the peer answers
    let handshaker = thread::spawn(move || link.handshake(HANDSHAKE_TIMEOUT).map(|_| link));

    let mut buf = [0u8; 16];
    let _ = peer.recv_from(&mut buf).unwrap(); // first attempt's datagram
    let (_, link_addr) = peer.recv_from(&mut buf).unwrap(); // the retry
    peer.send_to(&hs_bytes(2, 1, b'd', 7), link_addr).unwrap();

    let link = handshaker.join().unwrap().expect("retry failed");
    assert_eq!(link.state(), LinkState::Ready);
    assert_eq!(link.get_status().receive_type, Some('d'));
    assert_eq!(link.remote_max_age(), Some(7));
}

#[test]
fn test_at_most_once_delivery() {
    init_logging();
    let (port, _rx) = spawn_supervisor();
    let (mut link, peer) = client_link_with_raw_peer(2, 0, test_config(port));
    link.start().unwrap();

    peer.send_bytes(&frame::encode(&[1.0, 2.0]));
    assert!(poll_until(Duration::from_secs(5), || {
        link.get_status().packets_received >= 1
    }));

    assert_eq!(link.get_latest(), Some(vec![1.0, 2.0]));
    assert_eq!(link.get_latest(), None); // already consumed
    assert!(link.get_status().has_data);
}

#[test]
fn test_corrupt_datagram_dropped() {
    init_logging();
    let (port, _rx) = spawn_supervisor();
    let (mut link, peer) = client_link_with_raw_peer(2, 0, test_config(port));
    link.start().unwrap();

    let mut bytes = frame::encode(&[1.0, 2.0]);
    bytes[2] ^= 0x01; // single flipped payload bit
    peer.send_bytes(&bytes);

    assert!(poll_until(Duration::from_secs(5), || {
        link.get_status().packets_corrupted >= 1
    }));
    let st = link.get_status();
    assert_eq!(st.packets_corrupted, 1);
    assert_eq!(st.packets_received, 0);
    assert_eq!(link.get_latest(), None);
}

#[test]
fn test_wrong_shape_counted() {
    init_logging();
    let (port, _rx) = spawn_supervisor();
    let (mut link, peer) = client_link_with_raw_peer(2, 0, test_config(port));
    link.start().unwrap();

    // Valid CRC but one sample instead of two
    peer.send_bytes(&frame::encode(&[1.0]));
    // Shorter than a CRC trailer
    peer.send_bytes(&[0x42]);

    assert!(poll_until(Duration::from_secs(5), || {
        link.get_status().packets_shape_invalid >= 2
    }));
    let st = link.get_status();
    assert_eq!(st.packets_shape_invalid, 2);
    assert_eq!(st.packets_received, 0);
    assert_eq!(link.get_latest(), None);
}

#[test]
fn test_expired_sample_withheld() {
    init_logging();
    let (port, _rx) = spawn_supervisor();
    let config = LinkConfig {
        max_age_seconds: 0.2,
        ..test_config(port)
    };
    let (mut link, peer) = client_link_with_raw_peer(2, 0, config);
    link.start().unwrap();

    peer.send_bytes(&frame::encode(&[5.0, 6.0]));
    assert!(poll_until(Duration::from_secs(5), || {
        link.get_status().packets_received >= 1
    }));

    // Let the sample age past the horizon before consuming it
    thread::sleep(Duration::from_millis(400));
    assert_eq!(link.get_latest(), None);
    assert_eq!(link.get_status().packets_expired, 1);

    // A fresh packet replaces the stale one and delivers normally
    peer.send_bytes(&frame::encode(&[7.0, 8.0]));
    assert!(poll_until(Duration::from_secs(5), || {
        link.get_status().packets_received >= 2
    }));
    assert_eq!(link.get_latest(), Some(vec![7.0, 8.0]));
}

#[test]
fn test_stall_signals_supervisor_once() {
    init_logging();
    let (port, rx) = spawn_supervisor();
    // 3 * 0.5 truncates to 1, so the 5 s floor applies
    let config = LinkConfig {
        max_age_seconds: 0.5,
        ..test_config(port)
    };
    let (mut link, _peer) = client_link_with_raw_peer(2, 0, config);
    link.start().unwrap();

    // No packets ever arrive; the watchdog trips after the 5 s floor
    let byte = rx
        .recv_timeout(Duration::from_secs(8))
        .expect("no distress signal from watchdog");
    assert_eq!(byte, 0x01);

    // Exactly one distress byte, and the link reports itself dead
    assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
    assert!(poll_until(Duration::from_secs(1), || {
        !link.get_status().running
    }));

    link.close().unwrap();
}
