//! Live Correlation Test - banyak caller, satu connection
//!
//! Mock peer di ujung lain `UnixStream::pair` membaca request lalu
//! membalas dalam urutan acak.
//!
//! Usage:
//!   cargo test --test live_correlation_test -- --nocapture

#![cfg(unix)]

use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel;
use rand::seq::SliceRandom;

use mpack_rpc::args;
use mpack_rpc::network::{AtomicBatch, Client, IgnoreNotifications, Transport};
use mpack_rpc::protocol::{
    decode_one, encode_packed, Message, Notification, Request, StreamSource, Value,
};
use mpack_rpc::{Error, RpcConfig};

/// Ujung editor dari connection
struct MockPeer {
    source: StreamSource<UnixStream>,
    writer: UnixStream,
}

impl MockPeer {
    fn new(stream: UnixStream) -> Self {
        let writer = stream.try_clone().unwrap();
        Self {
            source: StreamSource::new(stream),
            writer,
        }
    }

    fn read_message(&mut self) -> Message {
        let value = decode_one(&mut self.source).unwrap();
        Message::from_value(value).unwrap()
    }

    fn read_request(&mut self) -> Request {
        match self.read_message() {
            Message::Request(request) => request,
            other => panic!("expected request, got {:?}", other),
        }
    }

    fn send(&mut self, fmt: &str, args: Vec<mpack_rpc::Arg>) {
        use std::io::Write;
        let packed = encode_packed(fmt, &args).unwrap();
        self.writer.write_all(&packed.bytes).unwrap();
        self.writer.flush().unwrap();
    }

    /// `[1, sequence, nil, result]` dengan result integer
    fn respond_int(&mut self, sequence: u32, result: i64) {
        self.send("[d,u,n,l]", args![1, sequence as u64, result]);
    }
}

fn connect_with<H: mpack_rpc::NotificationHandler>(
    config: RpcConfig,
    handler: H,
) -> (Arc<Client>, MockPeer) {
    let (client_side, peer_side) = UnixStream::pair().unwrap();
    let transport = Transport::from_unix(client_side).unwrap();
    let client = Client::from_transport(transport, config, handler).unwrap();
    (Arc::new(client), MockPeer::new(peer_side))
}

fn connect() -> (Arc<Client>, MockPeer) {
    connect_with(RpcConfig::default(), IgnoreNotifications)
}

#[test]
fn test_shuffled_responses_reach_their_callers() {
    const CALLERS: i64 = 32;
    let (client, mut peer) = connect();

    let peer_thread = thread::spawn(move || {
        let mut pending: Vec<(u32, i64)> = (0..CALLERS)
            .map(|_| {
                let request = peer.read_request();
                assert_eq!(request.method, "echo");
                let arg = request.params.index(0).and_then(Value::as_i64).unwrap();
                (request.sequence, arg)
            })
            .collect();
        pending.shuffle(&mut rand::rng());
        for (sequence, arg) in pending {
            peer.respond_int(sequence, arg * 10);
        }
        peer
    });

    let callers: Vec<_> = (0..CALLERS)
        .map(|i| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                let response = client.request("echo", "l", args![i]).unwrap();
                (i, response)
            })
        })
        .collect();

    let mut sequences = Vec::new();
    for caller in callers {
        let (i, response) = caller.join().unwrap();
        assert_eq!(response.result, Value::Int(i * 10), "caller {}", i);
        sequences.push(response.sequence);
    }
    sequences.sort_unstable();
    sequences.dedup();
    assert_eq!(sequences.len(), CALLERS as usize);

    let _peer = peer_thread.join().unwrap();
    assert!(client.connection().registry().is_empty());
}

#[test]
fn test_dead_letter_does_not_stall_reader() {
    let (client, mut peer) = connect();

    let caller = {
        let client = Arc::clone(&client);
        thread::spawn(move || client.request("nvim_eval", "s", args!["1+1"]))
    };

    let request = peer.read_request();
    peer.respond_int(request.sequence.wrapping_add(1000), -1);
    peer.respond_int(request.sequence, 2);

    let response = caller.join().unwrap().unwrap();
    assert_eq!(response.result, Value::Int(2));

    // Reader masih hidup
    let caller = {
        let client = Arc::clone(&client);
        thread::spawn(move || client.request("nvim_eval", "s", args!["3"]))
    };
    let request = peer.read_request();
    peer.respond_int(request.sequence, 3);
    assert_eq!(caller.join().unwrap().unwrap().result, Value::Int(3));
    assert!(!client.is_closed());
}

#[test]
fn test_fire_and_forget_response_is_dropped() {
    let (client, mut peer) = connect();
    client.notify("nvim_command", "s", args!["redraw"]).unwrap();

    let request = peer.read_request();
    assert_eq!(request.method, "nvim_command");
    peer.respond_int(request.sequence, 0);

    let caller = {
        let client = Arc::clone(&client);
        thread::spawn(move || client.call_expect::<i64>("nvim_eval", "s", args!["7"]))
    };
    let request = peer.read_request();
    peer.respond_int(request.sequence, 7);
    assert_eq!(caller.join().unwrap().unwrap(), Some(7));
}

#[test]
fn test_batch_is_one_request() {
    let (client, mut peer) = connect();

    let caller = {
        let client = Arc::clone(&client);
        thread::spawn(move || {
            let mut batch = AtomicBatch::new();
            batch
                .push("nvim_buf_set_var", "d,s,s", args![1, "tag_hl", "on"])
                .add_highlight(1, 5, "Function", 3, 0, 4)
                .clear_highlight(1, 5, 10, -1);
            client.batch_expect(batch)
        })
    };

    let request = peer.read_request();
    assert_eq!(request.method, "nvim_call_atomic");
    let params = request.params.as_array().unwrap();
    assert_eq!(params.len(), 1);
    let calls = params[0].as_array().unwrap();
    assert_eq!(calls.len(), 3);
    let methods: Vec<&str> = calls
        .iter()
        .map(|call| call.index(0).and_then(Value::as_str).unwrap())
        .collect();
    assert_eq!(
        methods,
        [
            "nvim_buf_set_var",
            "nvim_buf_add_highlight",
            "nvim_buf_clear_namespace"
        ]
    );
    assert_eq!(calls[1].index(1).unwrap().index(2).and_then(Value::as_str), Some("Function"));

    peer.send(
        "[d,u,n,[[n,d,n],n]]",
        args![1, request.sequence as u64, 5],
    );
    let result = caller.join().unwrap().unwrap().unwrap();
    assert!(result.is_ok());
    assert_eq!(result.results, vec![Value::Nil, Value::Int(5), Value::Nil]);
}

#[test]
fn test_rpc_error_becomes_none() {
    let (client, mut peer) = connect();
    let caller = {
        let client = Arc::clone(&client);
        thread::spawn(move || client.get_var::<String>("missing"))
    };
    let request = peer.read_request();
    assert_eq!(request.method, "nvim_get_var");
    peer.send(
        "[d,u,[d,s],n]",
        args![1, request.sequence as u64, 1, "Key not found: missing"],
    );
    assert_eq!(caller.join().unwrap().unwrap(), None);
}

#[test]
fn test_timeout_then_late_response() {
    let config = RpcConfig::default().with_call_timeout(Duration::from_millis(50));
    let (client, mut peer) = connect_with(config, IgnoreNotifications);

    match client.request("slow", "", args![]) {
        Err(Error::Timeout { .. }) => {}
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(client.connection().registry().is_empty());

    let late = peer.read_request();
    peer.respond_int(late.sequence, 1);

    let caller = {
        let client = Arc::clone(&client);
        thread::spawn(move || client.request("fast", "", args![]))
    };
    let request = peer.read_request();
    assert_eq!(request.method, "fast");
    peer.respond_int(request.sequence, 2);
    assert_eq!(caller.join().unwrap().unwrap().result, Value::Int(2));
}

#[test]
fn test_notification_and_peer_request() {
    let (tx, rx) = channel::unbounded();
    let handler = move |notification: Notification| {
        tx.send(notification).ok();
    };
    let (_client, mut peer) = connect_with(RpcConfig::default(), handler);

    peer.send("[d,s,[d,b]]", args![2, "nvim_buf_lines_event", 4, false]);
    let notification = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(notification.method, "nvim_buf_lines_event");
    assert_eq!(notification.params.index(0).and_then(Value::as_i64), Some(4));

    peer.send("[d,d,s,[]]", args![0, 77, "poll"]);
    match peer.read_message() {
        Message::Response(response) => {
            assert_eq!(response.sequence, 77);
            assert!(response.is_error());
        }
        other => panic!("expected error response, got {:?}", other),
    }
}

#[test]
fn test_peer_close_wakes_pending_callers() {
    let (client, mut peer) = connect();
    let caller = {
        let client = Arc::clone(&client);
        thread::spawn(move || client.request("never", "", args![]))
    };
    let _ = peer.read_request();
    drop(peer);

    assert!(matches!(caller.join().unwrap(), Err(Error::Disconnected)));
    assert!(matches!(client.join_reader(), Err(Error::Transport(_))));
    assert!(client.is_closed());
    assert!(matches!(
        client.request("after", "", args![]),
        Err(Error::Disconnected) | Err(Error::Transport(_))
    ));
}

#[test]
fn test_dropping_client_closes_socket() {
    let (client, mut peer) = connect();
    let connection = Arc::clone(client.connection());
    drop(client);

    assert!(connection.is_closed());
    // Peer melihat EOF: write half sudah diputus
    assert!(matches!(
        decode_one(&mut peer.source),
        Err(Error::Transport(_))
    ));
    // Reader thread sudah melepas Arc miliknya
    for _ in 0..100 {
        if Arc::strong_count(&connection) == 1 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(Arc::strong_count(&connection), 1);
}
