use std::{
    net::{SocketAddr, TcpListener},
    sync::{Arc, Mutex, mpsc},
    thread,
    time::Duration,
};

use strongbox::{
    AttributeType, Client, ClientConfig, ClientError, ItemStore, Schema, SchemaFlags, Secret,
    SecretServer,
    protocol::{ProtocolTransport, Response},
};

fn store_schema() -> Schema {
    Schema::define(
        "org.mock.type.Store",
        SchemaFlags::NONE,
        [
            ("number", AttributeType::Integer),
            ("string", AttributeType::String),
            ("even", AttributeType::Boolean),
        ],
    )
    .unwrap()
}

fn start_server() -> SocketAddr {
    let mut store = ItemStore::new();
    store.seed(
        "org.mock.type.Store",
        &[("number", "1"), ("string", "one"), ("even", "false")],
        "one",
        Secret::text("111"),
    );
    store.seed(
        "org.mock.type.Store",
        &[("number", "2"), ("string", "two"), ("even", "true")],
        "two",
        Secret::text("222"),
    );

    let server = SecretServer::bind(
        "127.0.0.1:0".parse().unwrap(),
        Arc::new(Mutex::new(store)),
        4,
    )
    .unwrap();
    let address = server.local_addr().unwrap();
    thread::spawn(move || server.listen());
    address
}

#[test]
fn password_round_trip_over_tcp() {
    let address = start_server();
    let client = Client::connect(&ClientConfig::new(address).with_workers(2));
    let schema = store_schema();
    client.connection().ping().unwrap();

    let attributes = [("number", "1"), ("string", "one"), ("even", "false")];
    assert_eq!(
        client.lookup_password(&schema, &attributes).unwrap().as_deref(),
        Some("111")
    );
    assert!(client.remove(&schema, &attributes).unwrap());
    assert_eq!(client.lookup(&schema, &attributes).unwrap(), None);

    let missing = [("number", "11"), ("string", "one"), ("even", "true")];
    assert!(!client.remove(&schema, &missing).unwrap());
}

#[test]
fn concurrent_async_calls_share_one_connection() {
    let address = start_server();
    let client = Client::connect(&ClientConfig::new(address).with_workers(4));
    let schema = store_schema();
    let (tx, rx) = mpsc::channel();

    for number in ["2", "7", "2", "8"] {
        let tx = tx.clone();
        client.lookup_async(&schema, &[("number", number)], move |pending| {
            let found = pending.lookup_password_finish().unwrap();
            tx.send(found).unwrap();
        });
    }
    drop(tx);

    let mut results: Vec<Option<String>> = rx.iter().collect();
    results.sort();
    assert_eq!(
        results,
        vec![None, None, Some("222".to_string()), Some("222".to_string())]
    );
}

#[test]
fn closing_fails_later_calls() {
    let address = start_server();
    let client = Client::connect(&ClientConfig::new(address));
    let schema = store_schema();

    assert!(client.lookup(&schema, &[("number", "2")]).unwrap().is_some());
    client.close();

    assert!(matches!(
        client.lookup(&schema, &[("number", "2")]),
        Err(ClientError::Connection(_))
    ));
}

/// Backend that answers the first request with `NotFound` and then reads
/// requests without ever replying. Each unanswered request is reported on the
/// returned channel.
fn start_stalled_server() -> (SocketAddr, mpsc::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::channel();

    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut transport = ProtocolTransport::new(stream);
        transport.read_request().unwrap();
        transport.write_response(&Response::NotFound).unwrap();

        while transport.read_request().is_ok() {
            let _ = seen_tx.send(());
        }
    });
    (address, seen_rx)
}

#[test]
fn close_with_idle_stream_does_not_wait_for_backend() {
    let (address, _seen) = start_stalled_server();
    let client = Client::connect(&ClientConfig::new(address));
    let schema = store_schema();
    assert_eq!(client.lookup(&schema, &[("number", "2")]).unwrap(), None);

    let (done_tx, done_rx) = mpsc::channel();
    let closer = client.clone();
    thread::spawn(move || {
        closer.close();
        done_tx.send(()).unwrap();
    });

    assert!(done_rx.recv_timeout(Duration::from_secs(3)).is_ok());
    assert!(matches!(
        client.lookup(&schema, &[("number", "2")]),
        Err(ClientError::Connection(_))
    ));
}

#[test]
fn close_fails_in_flight_and_queued_calls() {
    let (address, seen) = start_stalled_server();
    let client = Client::connect(&ClientConfig::new(address).with_workers(2));
    let schema = store_schema();
    assert_eq!(client.lookup(&schema, &[("number", "2")]).unwrap(), None);

    let (tx, rx) = mpsc::channel();
    for number in ["2", "3"] {
        let tx = tx.clone();
        client.lookup_async(&schema, &[("number", number)], move |pending| {
            tx.send(pending.lookup_finish()).unwrap();
        });
    }
    drop(tx);

    // One lookup is waiting on the backend, the other on the stream.
    seen.recv_timeout(Duration::from_secs(3)).unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let closer = client.clone();
    thread::spawn(move || {
        closer.close();
        done_tx.send(()).unwrap();
    });
    assert!(done_rx.recv_timeout(Duration::from_secs(3)).is_ok());

    for _ in 0..2 {
        let result = rx.recv_timeout(Duration::from_secs(3)).unwrap();
        assert!(
            matches!(result, Err(ClientError::Connection(_))),
            "{result:?}"
        );
    }
}
