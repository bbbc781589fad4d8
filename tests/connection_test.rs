mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{
    connected_pair, wait_until, CountingHooks, RecordingDispatcher, MAX_FRAME_SIZE,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use wirebound::{Connection, ConnectionRegistry, FrameCodec, NetError, Registry};

struct Fixture {
    registry: Arc<ConnectionRegistry>,
    hooks: Arc<CountingHooks>,
    dispatcher: Arc<RecordingDispatcher>,
}

impl Fixture {
    fn new() -> Fixture {
        Fixture {
            registry: Arc::new(ConnectionRegistry::new()),
            hooks: Arc::new(CountingHooks::default()),
            dispatcher: Arc::new(RecordingDispatcher::default()),
        }
    }

    fn connection(
        &self,
        socket: TcpStream,
        id: u64,
        worker_pool_size: usize,
    ) -> Arc<Connection> {
        Connection::new(
            socket,
            id,
            FrameCodec::new(MAX_FRAME_SIZE),
            worker_pool_size,
            self.dispatcher.clone(),
            self.registry.clone(),
            self.hooks.clone(),
        )
        .unwrap()
    }
}

#[tokio::test]
async fn test_construction_registers_with_registry() {
    let (_client, server_side) = connected_pair().await;
    let fixture = Fixture::new();
    let conn = fixture.connection(server_side, 1, 0);
    assert_eq!(fixture.registry.len(), 1);
    assert_eq!(fixture.registry.get(1).unwrap().id(), conn.id());
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (_client, server_side) = connected_pair().await;
    let fixture = Fixture::new();
    let conn = fixture.connection(server_side, 1, 0);
    conn.start();
    assert_eq!(fixture.hooks.starts.load(Ordering::SeqCst), 1);

    conn.stop();
    conn.stop();

    assert!(conn.is_closed());
    assert_eq!(fixture.hooks.stops.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.registry.len(), 0);
}

#[tokio::test]
async fn test_send_after_stop_fails_and_writes_nothing() {
    let (mut client, server_side) = connected_pair().await;
    let fixture = Fixture::new();
    let conn = fixture.connection(server_side, 1, 0);
    conn.start();
    conn.stop();

    let err = conn.send(1, b"late").await.unwrap_err();
    assert!(matches!(err, NetError::ConnectionClosed));

    // the loops drop the socket halves without writing anything, so the
    // client observes a clean EOF
    let mut buf = [0u8; 16];
    let n = timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_peer_disconnect_tears_down_connection() {
    let (client, server_side) = connected_pair().await;
    let fixture = Fixture::new();
    let conn = fixture.connection(server_side, 1, 0);
    conn.start();

    drop(client);

    wait_until(|| fixture.registry.len() == 0).await;
    assert!(conn.is_closed());
    assert_eq!(fixture.hooks.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_truncated_payload_tears_down_connection() {
    let (mut client, server_side) = connected_pair().await;
    let fixture = Fixture::new();
    let conn = fixture.connection(server_side, 1, 0);
    conn.start();

    // header declares five payload bytes, only three arrive before the
    // peer disconnects
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&5u32.to_be_bytes());
    bytes.extend_from_slice(&7u32.to_be_bytes());
    bytes.extend_from_slice(b"abc");
    client.write_all(&bytes).await.unwrap();
    drop(client);

    wait_until(|| fixture.registry.len() == 0).await;
    assert!(conn.is_closed());
    assert_eq!(fixture.hooks.stops.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.dispatcher.pooled.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.dispatcher.direct.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_oversized_header_tears_down_connection() {
    let (mut client, server_side) = connected_pair().await;
    let fixture = Fixture::new();
    let conn = fixture.connection(server_side, 1, 0);
    conn.start();

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(MAX_FRAME_SIZE as u32 + 1).to_be_bytes());
    bytes.extend_from_slice(&1u32.to_be_bytes());
    client.write_all(&bytes).await.unwrap();

    wait_until(|| fixture.registry.len() == 0).await;
    assert!(conn.is_closed());
}

#[tokio::test]
async fn test_concurrent_sends_produce_whole_frames() {
    let (mut client, server_side) = connected_pair().await;
    let fixture = Fixture::new();
    let conn = fixture.connection(server_side, 1, 0);
    conn.start();

    let first = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.send(1, b"a").await })
    };
    let second = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.send(2, b"b").await })
    };
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    // two complete frames in some order, never interleaved
    let mut frames = vec![
        common::read_frame(&mut client).await,
        common::read_frame(&mut client).await,
    ];
    frames.sort_by_key(|(msg_id, _)| *msg_id);
    assert_eq!(frames[0], (1, b"a".to_vec()));
    assert_eq!(frames[1], (2, b"b".to_vec()));
}

#[tokio::test]
async fn test_property_accessors() {
    let (_client, server_side) = connected_pair().await;
    let fixture = Fixture::new();
    let conn = fixture.connection(server_side, 1, 0);

    conn.set_property("user", Arc::new("alice".to_string()));
    let value = conn.get_property("user").unwrap();
    assert_eq!(value.downcast_ref::<String>().unwrap(), "alice");

    let err = conn.get_property("missing").unwrap_err();
    assert!(matches!(err, NetError::PropertyNotFound(_)));

    conn.remove_property("user");
    assert!(conn.get_property("user").is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_property_store_survives_concurrent_access() {
    let (_client, server_side) = connected_pair().await;
    let fixture = Fixture::new();
    let conn = fixture.connection(server_side, 1, 0);
    let keys = ["a", "b", "c", "d"];

    let mut tasks = Vec::new();
    for task_id in 0..16usize {
        let conn = conn.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..250usize {
                let key = ["a", "b", "c", "d"][(task_id + round) % 4];
                conn.set_property(key, Arc::new(round));
                let _ = conn.get_property(key);
                if round % 10 == 0 {
                    conn.remove_property(key);
                }
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // every surviving key still holds a value some task wrote
    for key in keys {
        if let Ok(value) = conn.get_property(key) {
            assert!(value.downcast_ref::<usize>().is_some());
        }
    }
}
