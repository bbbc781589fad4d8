use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error};

use crate::dispatch::{Dispatch, Request};
use crate::{NetError, NetResult, Shutdown};

use super::codec::{Frame, FrameCodec, FrameHeader};
use super::Registry;

/// Arbitrary per-connection state, shared across tasks.
pub type PropertyValue = Arc<dyn Any + Send + Sync>;

/// Server-supplied callbacks fired at connection start and stop.
///
/// Both run synchronously on the task driving the lifecycle transition, and
/// must not call `stop()` on the same connection.
pub trait LifecycleHooks: Send + Sync {
    fn on_conn_start(&self, _conn: &Arc<Connection>) {}
    fn on_conn_stop(&self, _conn: &Arc<Connection>) {}
}

/// The do-nothing default.
pub struct NoopHooks;

impl LifecycleHooks for NoopHooks {}

/// One accepted TCP connection.
///
/// Owns the socket exclusively: the read loop holds the read half, the write
/// loop holds the write half, and `send` is the only sanctioned way to get
/// bytes onto the wire. The two loops share nothing beyond the outbound queue
/// and the exit signal.
///
/// Teardown can start from either side. A peer disconnect ends the read loop,
/// which calls `stop()`; a server-initiated `stop()` fires the exit signal,
/// which both loops observe. Either way `stop()` runs its side effects
/// exactly once.
pub struct Connection {
    /// handle to ourselves, for the loop tasks and hook callbacks
    self_ref: Weak<Connection>,
    id: u64,
    peer_addr: SocketAddr,
    codec: FrameCodec,
    /// capacity of the shared worker pool; zero selects the ad-hoc path
    worker_pool_size: usize,
    started: AtomicBool,
    closed: AtomicBool,
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: Mutex<Option<BufWriter<OwnedWriteHalf>>>,
    outbound_tx: mpsc::Sender<Bytes>,
    outbound_rx: Mutex<Option<mpsc::Receiver<Bytes>>>,
    exit_tx: broadcast::Sender<()>,
    properties: RwLock<HashMap<String, PropertyValue>>,
    dispatcher: Arc<dyn Dispatch>,
    registry: Arc<dyn Registry>,
    hooks: Arc<dyn LifecycleHooks>,
}

impl Connection {
    /// Builds a connection around an accepted socket and registers it.
    ///
    /// The outbound queue has capacity one: `send` is a blocking handoff to
    /// the write loop, not a buffer.
    pub fn new(
        socket: TcpStream,
        id: u64,
        codec: FrameCodec,
        worker_pool_size: usize,
        dispatcher: Arc<dyn Dispatch>,
        registry: Arc<dyn Registry>,
        hooks: Arc<dyn LifecycleHooks>,
    ) -> NetResult<Arc<Connection>> {
        let peer_addr = socket.peer_addr()?;
        let (read_half, write_half) = socket.into_split();
        let (outbound_tx, outbound_rx) = mpsc::channel(1);
        let (exit_tx, _) = broadcast::channel(1);

        let conn = Arc::new_cyclic(|me| Connection {
            self_ref: me.clone(),
            id,
            peer_addr,
            codec,
            worker_pool_size,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            reader: Mutex::new(Some(read_half)),
            writer: Mutex::new(Some(BufWriter::new(write_half))),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            exit_tx,
            properties: RwLock::new(HashMap::new()),
            dispatcher,
            registry,
            hooks,
        });
        conn.registry.add_connection(conn.clone());
        Ok(conn)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// A receiver that fires once `stop()` runs; used by the accept loop to
    /// release its connection permit.
    pub fn subscribe_exit(&self) -> broadcast::Receiver<()> {
        self.exit_tx.subscribe()
    }

    /// Launches the read and write loops and fires the start hook.
    ///
    /// The hook runs on the calling task, so its side effects are visible to
    /// the caller before `start` returns; no ordering is guaranteed relative
    /// to the loops themselves. Calling `start` twice, or after `stop`, is a
    /// no-op.
    pub fn start(&self) {
        if self.is_closed() || self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(conn) = self.self_ref.upgrade() else {
            return;
        };
        let reader = self.reader.lock().take();
        let writer = self.writer.lock().take();
        let outbound_rx = self.outbound_rx.lock().take();
        let (Some(reader), Some(writer), Some(outbound_rx)) = (reader, writer, outbound_rx) else {
            return;
        };
        debug!("connection {} started, peer {}", self.id, self.peer_addr);

        let read_shutdown = Shutdown::new(self.exit_tx.subscribe());
        let write_shutdown = Shutdown::new(self.exit_tx.subscribe());
        tokio::spawn(conn.clone().read_loop(reader, read_shutdown));
        tokio::spawn(Self::write_loop(self.id, writer, outbound_rx, write_shutdown));

        self.hooks.on_conn_start(&conn);
    }

    /// Tears the connection down; every call after the first is a no-op.
    ///
    /// Fires the stop hook, signals both loops to exit and unregisters the
    /// connection. The socket halves close as the loops unwind and drop them.
    pub fn stop(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        debug!("connection {} stopping", self.id);
        if let Some(conn) = self.self_ref.upgrade() {
            self.hooks.on_conn_stop(&conn);
        }
        // a loop that already exited has dropped its receiver; that is fine
        let _ = self.exit_tx.send(());
        self.registry.remove_connection(self);
    }

    /// Encodes one frame and blocks until the write loop accepts it.
    pub async fn send(&self, msg_id: u32, payload: &[u8]) -> NetResult<()> {
        if self.is_closed() {
            return Err(NetError::ConnectionClosed);
        }
        let frame = self.codec.encode(msg_id, payload)?;
        self.outbound_tx
            .send(frame.freeze())
            .await
            .map_err(|_| NetError::ConnectionClosed)
    }

    pub fn set_property(&self, key: impl Into<String>, value: PropertyValue) {
        self.properties.write().insert(key.into(), value);
    }

    pub fn get_property(&self, key: &str) -> NetResult<PropertyValue> {
        self.properties
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| NetError::PropertyNotFound(key.to_string()))
    }

    pub fn remove_property(&self, key: &str) {
        self.properties.write().remove(key);
    }

    /// Reads frames until the peer goes away, the stream turns malformed or
    /// the exit signal fires, then tears the connection down.
    ///
    /// Each frame is fully decoded before the next read begins, and each is
    /// dispatched through exactly one path: the bounded pool queue when a
    /// pool is configured, an ad-hoc task otherwise.
    async fn read_loop(self: Arc<Self>, mut reader: OwnedReadHalf, mut exit: Shutdown) {
        debug!("connection {} read loop started", self.id);
        loop {
            let mut header_buf = [0u8; FrameHeader::SIZE];
            tokio::select! {
                res = reader.read_exact(&mut header_buf) => {
                    if let Err(e) = res {
                        if e.kind() == ErrorKind::UnexpectedEof {
                            debug!("connection {} closed by peer", self.id);
                        } else {
                            error!("connection {} read header error: {}", self.id, e);
                        }
                        break;
                    }
                }
                _ = exit.recv() => {
                    debug!("connection {} read loop got exit signal", self.id);
                    break;
                }
            }

            let header = match self.codec.decode_header(&header_buf) {
                Ok(header) => header,
                Err(e) => {
                    error!("connection {}: {}", self.id, e);
                    break;
                }
            };

            let payload = if header.payload_len > 0 {
                let mut payload_buf = vec![0u8; header.payload_len as usize];
                tokio::select! {
                    res = reader.read_exact(&mut payload_buf) => {
                        if let Err(e) = res {
                            // a short payload read is a protocol error, not retryable
                            error!("connection {} read payload error: {}", self.id, e);
                            break;
                        }
                    }
                    _ = exit.recv() => {
                        debug!("connection {} read loop got exit signal", self.id);
                        break;
                    }
                }
                Bytes::from(payload_buf)
            } else {
                Bytes::new()
            };

            let request = Request::new(self.clone(), Frame::new(header.msg_id, payload));
            if self.worker_pool_size > 0 {
                if let Err(e) = self.dispatcher.enqueue_task(request).await {
                    error!("connection {} dispatch error: {}", self.id, e);
                    break;
                }
            } else {
                self.dispatcher.handle_direct(request);
            }
        }
        self.stop();
        debug!("connection {} read loop exited", self.id);
    }

    /// Waits on the outbound queue and the exit signal; whichever fires
    /// first wins. Frames are written whole, one `send` handoff at a time,
    /// with no coalescing. A write failure ends the loop without retry.
    async fn write_loop(
        id: u64,
        mut writer: BufWriter<OwnedWriteHalf>,
        mut outbound_rx: mpsc::Receiver<Bytes>,
        mut exit: Shutdown,
    ) {
        debug!("connection {} write loop started", id);
        loop {
            tokio::select! {
                maybe_frame = outbound_rx.recv() => {
                    match maybe_frame {
                        Some(frame) => {
                            if let Err(e) = Self::write_frame(&mut writer, &frame).await {
                                error!("connection {} write error: {}", id, e);
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = exit.recv() => break,
            }
        }
        debug!("connection {} write loop exited", id);
    }

    async fn write_frame(
        writer: &mut BufWriter<OwnedWriteHalf>,
        frame: &Bytes,
    ) -> std::io::Result<()> {
        writer.write_all(frame).await?;
        writer.flush().await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}
