//! End-to-end broker tests over real loopback sockets.
//!
//! Each test starts its own broker on an ephemeral port, drives it with raw
//! framed TCP clients and records the handler callbacks.

use setu_net::broker::wire::{self, MessageType, PROTOCOL_VERSION};
use setu_net::{Broker, PeerEventHandler, PeerId};
use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Data(PeerId, Vec<u8>),
    Disconnect(PeerId),
}

/// Handler that records every callback for later assertions
#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Poll until the predicate holds or the deadline passes
    fn wait_for(&self, pred: impl Fn(&[Event]) -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if pred(&self.events()) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn disconnects(&self) -> Vec<PeerId> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                Event::Disconnect(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn payloads_of(&self, peer: PeerId) -> Vec<Vec<u8>> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                Event::Data(id, payload) if *id == peer => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }
}

impl PeerEventHandler for Recorder {
    fn on_data(&mut self, peer_id: PeerId, payload: &[u8]) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Data(peer_id, payload.to_vec()));
    }

    fn on_disconnect(&mut self, peer_id: PeerId) {
        self.events.lock().unwrap().push(Event::Disconnect(peer_id));
    }
}

fn start_broker() -> (Broker, Recorder, u16) {
    let recorder = Recorder::default();
    let mut broker = Broker::new(Box::new(recorder.clone()));
    broker.start(0).expect("broker failed to start");
    let port = broker.local_addr().expect("broker has no address").port();
    (broker, recorder, port)
}

fn connect(port: u16) -> TcpStream {
    TcpStream::connect(("127.0.0.1", port)).expect("connect failed")
}

fn send_data(stream: &mut TcpStream, payload: &[u8]) {
    wire::write_frame(stream, MessageType::Data, payload).expect("write failed");
}

fn has_data(events: &[Event], peer: PeerId, payload: &[u8]) -> bool {
    events.contains(&Event::Data(peer, payload.to_vec()))
}

#[test]
fn test_single_data_frame_delivered() {
    let (broker, recorder, port) = start_broker();

    let mut client = connect(port);
    send_data(&mut client, b"hello");

    assert!(recorder.wait_for(|e| has_data(e, 1, b"hello")));
    assert_eq!(recorder.payloads_of(1).len(), 1);
    assert_eq!(broker.connection_count(), 1);
}

#[test]
fn test_abrupt_close_yields_one_disconnect() {
    let (broker, recorder, port) = start_broker();

    let client = connect(port);
    // Give the acceptor time to register the peer before the close
    assert!(wait_until(|| broker.peer_name(1).is_some()));
    drop(client);

    assert!(recorder.wait_for(|e| e.contains(&Event::Disconnect(1))));
    // Settle briefly so a duplicate teardown would be visible
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(recorder.disconnects(), vec![1]);
    assert_eq!(broker.connection_count(), 0);
    // Registry entry is gone
    assert!(broker.peer_name(1).is_none());
}

#[test]
fn test_per_peer_ordering_with_concurrent_clients() {
    let (_broker, recorder, port) = start_broker();

    // First frame from each client pins down its peer id
    let mut a = connect(port);
    send_data(&mut a, b"a1");
    assert!(recorder.wait_for(|e| has_data(e, 1, b"a1")));

    let mut b = connect(port);
    send_data(&mut b, b"b1");
    assert!(recorder.wait_for(|e| has_data(e, 2, b"b1")));

    // Remaining frames sent concurrently
    let sender_a = std::thread::spawn(move || {
        send_data(&mut a, b"a2");
        send_data(&mut a, b"a3");
        a
    });
    let sender_b = std::thread::spawn(move || {
        send_data(&mut b, b"b2");
        send_data(&mut b, b"b3");
        b
    });
    let _a = sender_a.join().unwrap();
    let _b = sender_b.join().unwrap();

    assert!(recorder.wait_for(|e| {
        e.iter().filter(|ev| matches!(ev, Event::Data(..))).count() == 6
    }));

    // Send order is preserved per peer; interleaving across peers is free
    assert_eq!(recorder.payloads_of(1), vec![b"a1".to_vec(), b"a2".to_vec(), b"a3".to_vec()]);
    assert_eq!(recorder.payloads_of(2), vec![b"b1".to_vec(), b"b2".to_vec(), b"b3".to_vec()]);
}

#[test]
fn test_bad_magic_disconnects_only_offender() {
    let (broker, recorder, port) = start_broker();

    let mut good = connect(port);
    send_data(&mut good, b"a1");
    assert!(recorder.wait_for(|e| has_data(e, 1, b"a1")));

    let mut bad = connect(port);
    let mut frame = wire::encode_frame(MessageType::Data, b"evil");
    frame[0] = b'X';
    frame[1] = b'X';
    bad.write_all(&frame).expect("write failed");

    assert!(recorder.wait_for(|e| e.contains(&Event::Disconnect(2))));
    assert_eq!(recorder.disconnects(), vec![2]);

    // The well-behaved peer is unaffected
    send_data(&mut good, b"a2");
    assert!(recorder.wait_for(|e| has_data(e, 1, b"a2")));
    assert_eq!(broker.connection_count(), 1);
}

#[test]
fn test_version_mismatch_disconnects_peer() {
    let (_broker, recorder, port) = start_broker();

    let mut client = connect(port);
    let mut frame = wire::encode_frame(MessageType::Data, b"x");
    frame[2..6].copy_from_slice(&(PROTOCOL_VERSION + 1).to_be_bytes());
    client.write_all(&frame).expect("write failed");

    assert!(recorder.wait_for(|e| e.contains(&Event::Disconnect(1))));
    assert_eq!(recorder.disconnects(), vec![1]);
}

#[test]
fn test_explicit_disconnection_frame() {
    let (broker, recorder, port) = start_broker();

    let mut client = connect(port);
    send_data(&mut client, b"payload");
    assert!(recorder.wait_for(|e| has_data(e, 1, b"payload")));
    assert_eq!(broker.connection_count(), 1);

    wire::write_frame(&mut client, MessageType::Disconnection, b"").expect("write failed");

    assert!(recorder.wait_for(|e| e.contains(&Event::Disconnect(1))));
    // Settle briefly so a duplicate teardown would be visible
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(recorder.disconnects(), vec![1]);
    assert_eq!(broker.connection_count(), 0);
}

#[test]
fn test_connecting_peer_not_counted() {
    let (broker, recorder, port) = start_broker();

    let mut client = connect(port);
    assert!(wait_until(|| broker.peer_name(1).is_some()));
    // Accepted but no data yet: still a pending handshake
    assert_eq!(broker.connection_count(), 0);

    send_data(&mut client, b"first");
    assert!(recorder.wait_for(|e| has_data(e, 1, b"first")));
    assert_eq!(broker.connection_count(), 1);
}

#[test]
fn test_stop_tears_down_all_peers() {
    let (mut broker, recorder, port) = start_broker();

    let mut clients: Vec<TcpStream> = (0..5).map(|_| connect(port)).collect();
    for (i, client) in clients.iter_mut().enumerate() {
        send_data(client, format!("hello-{}", i).as_bytes());
    }
    assert!(recorder.wait_for(|e| {
        e.iter().filter(|ev| matches!(ev, Event::Data(..))).count() == 5
    }));
    assert_eq!(broker.connection_count(), 5);

    broker.stop();

    // Every peer got exactly one disconnect before stop() returned
    let mut disconnects = recorder.disconnects();
    disconnects.sort_unstable();
    assert_eq!(disconnects, vec![1, 2, 3, 4, 5]);
    assert_eq!(broker.connection_count(), 0);
}

#[test]
fn test_stop_with_pending_handshakes() {
    let (mut broker, recorder, port) = start_broker();

    // Two peers that never send anything
    let _a = connect(port);
    let _b = connect(port);
    assert!(wait_until(|| {
        broker.peer_name(1).is_some() && broker.peer_name(2).is_some()
    }));

    broker.stop();

    let mut disconnects = recorder.disconnects();
    disconnects.sort_unstable();
    assert_eq!(disconnects, vec![1, 2]);
}

#[test]
fn test_start_is_idempotent() {
    let (mut broker, _recorder, port) = start_broker();

    broker.start(0).expect("second start failed");
    assert_eq!(broker.local_addr().map(|a| a.port()), Some(port));

    broker.stop();
}

#[test]
fn test_restart_never_reuses_peer_ids() {
    let (mut broker, recorder, port) = start_broker();

    let mut client = connect(port);
    send_data(&mut client, b"one");
    assert!(recorder.wait_for(|e| has_data(e, 1, b"one")));
    let _ = client.shutdown(Shutdown::Both);
    broker.stop();

    broker.start(0).expect("restart failed");
    let port = broker.local_addr().expect("no address").port();
    let mut client = connect(port);
    send_data(&mut client, b"two");

    assert!(recorder.wait_for(|e| has_data(e, 2, b"two")));
    broker.stop();
}

#[test]
fn test_peer_names() {
    let (broker, recorder, port) = start_broker();

    let mut client = connect(port);
    send_data(&mut client, b"hi");
    assert!(recorder.wait_for(|e| has_data(e, 1, b"hi")));

    assert_eq!(broker.peer_name(1).as_deref(), Some(""));
    assert!(broker.set_peer_name(1, "glue-viewer"));
    assert_eq!(broker.peer_name(1).as_deref(), Some("glue-viewer"));

    assert!(!broker.set_peer_name(42, "nobody"));
}

/// Poll an arbitrary condition until it holds or the deadline passes
fn wait_until(pred: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
