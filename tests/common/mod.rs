#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use wirebound::{Connection, Dispatch, LifecycleHooks, MessageHandler, NetResult, Request};

pub const MAX_FRAME_SIZE: usize = 4096;

/// Hooks that only count their invocations.
#[derive(Default)]
pub struct CountingHooks {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl LifecycleHooks for CountingHooks {
    fn on_conn_start(&self, _conn: &Arc<Connection>) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_conn_stop(&self, _conn: &Arc<Connection>) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Dispatcher that records which path each request took and drops it.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub pooled: AtomicUsize,
    pub direct: AtomicUsize,
}

#[async_trait]
impl Dispatch for RecordingDispatcher {
    async fn enqueue_task(&self, _request: Request) -> NetResult<()> {
        self.pooled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn handle_direct(&self, _request: Request) {
        self.direct.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handler that counts how many requests reached it.
#[derive(Default)]
pub struct CountingHandler {
    pub handled: AtomicUsize,
}

#[async_trait]
impl MessageHandler for CountingHandler {
    async fn handle(&self, _request: Request) {
        self.handled.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handler that echoes every frame back on its connection.
pub struct EchoHandler;

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn handle(&self, request: Request) {
        request
            .connection()
            .send(request.msg_id(), request.payload())
            .await
            .unwrap();
    }
}

/// A loopback socket pair: (client side, server side).
pub async fn connected_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).await.unwrap();
    let (server_side, _) = listener.accept().await.unwrap();
    (client, server_side)
}

/// Client-side frame encoding, independent of the crate's codec.
pub fn encode_frame(msg_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&msg_id.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Client-side frame decoding, independent of the crate's codec.
pub async fn read_frame(stream: &mut TcpStream) -> (u32, Vec<u8>) {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).await.unwrap();
    let payload_len = u32::from_be_bytes(header[..4].try_into().unwrap()) as usize;
    let msg_id = u32::from_be_bytes(header[4..].try_into().unwrap());
    let mut payload = vec![0u8; payload_len];
    stream.read_exact(&mut payload).await.unwrap();
    (msg_id, payload)
}

/// Polls `cond` until it holds or two seconds pass.
pub async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within deadline");
}
