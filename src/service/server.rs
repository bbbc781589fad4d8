use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::{self, Duration};
use tracing::{debug, error, info};

use crate::dispatch::{Dispatch, MessageDispatcher, MessageHandler};
use crate::network::{Connection, ConnectionRegistry, FrameCodec, LifecycleHooks, NoopHooks};
use crate::{NetError, NetResult, Shutdown};

use super::config::ServerConfig;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A TCP server: one listener, one handler, one registry of live
/// connections.
///
/// ```no_run
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use wirebound::{MessageHandler, Request, Server, ServerConfig};
///
/// struct Echo;
///
/// #[async_trait]
/// impl MessageHandler for Echo {
///     async fn handle(&self, request: Request) {
///         let _ = request
///             .connection()
///             .send(request.msg_id(), request.payload())
///             .await;
///     }
/// }
///
/// # async fn run() -> wirebound::NetResult<()> {
/// Server::new(ServerConfig::default(), Arc::new(Echo)).serve().await
/// # }
/// ```
pub struct Server {
    config: ServerConfig,
    handler: Arc<dyn MessageHandler>,
    hooks: Arc<dyn LifecycleHooks>,
}

impl Server {
    pub fn new(config: ServerConfig, handler: Arc<dyn MessageHandler>) -> Server {
        Server {
            config,
            handler,
            hooks: Arc::new(NoopHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Server {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the configured address and serves until ctrl-c.
    pub async fn serve(&self) -> NetResult<()> {
        let listen_address = self.config.listen_address();
        let listener = TcpListener::bind(&listen_address).await.map_err(|err| {
            NetError::IllegalState(format!(
                "failed to bind server to address {}: {}",
                listen_address, err
            ))
        })?;
        info!("server {} listening on {}", self.config.name, listen_address);
        self.run(listener, signal::ctrl_c()).await
    }

    /// Serves on an existing listener until `shutdown` completes.
    ///
    /// Graceful shutdown sequence:
    /// 1. The accept loop is cancelled.
    /// 2. Every live connection is stopped through the registry; their loops
    ///    observe the exit signal and drop the socket halves.
    /// 3. The shutdown broadcast reaches the pool workers, which finish the
    ///    request in hand and exit.
    /// 4. `shutdown_complete` drains once the last worker drops its sender,
    ///    and `run` returns.
    pub async fn run(&self, listener: TcpListener, shutdown: impl Future) -> NetResult<()> {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel(1);

        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher: Arc<dyn Dispatch> = Arc::new(MessageDispatcher::new(
            self.handler.clone(),
            &self.config.worker_pool,
            notify_shutdown.clone(),
            shutdown_complete_tx.clone(),
        ));

        let acceptor = Acceptor {
            listener,
            limit_connections: Arc::new(Semaphore::new(self.config.network.max_connection)),
            codec: FrameCodec::new(self.config.network.max_frame_size),
            worker_pool_size: self.config.worker_pool.pool_size,
            dispatcher,
            registry: registry.clone(),
            hooks: self.hooks.clone(),
        };

        tokio::select! {
            res = acceptor.run() => {
                if let Err(err) = res {
                    error!(cause = %err, "failed to accept");
                }
            }
            _ = shutdown => {
                info!("server {} received shutdown signal", self.config.name);
            }
        }

        let _ = notify_shutdown.send(());
        registry.stop_all();
        drop(acceptor);
        drop(shutdown_complete_tx);
        let _ = shutdown_complete_rx.recv().await;
        info!("server {} shutdown complete", self.config.name);
        Ok(())
    }
}

/// The accept loop, one per `Server::run` call.
struct Acceptor {
    listener: TcpListener,
    limit_connections: Arc<Semaphore>,
    codec: FrameCodec,
    worker_pool_size: usize,
    dispatcher: Arc<dyn Dispatch>,
    registry: Arc<ConnectionRegistry>,
    hooks: Arc<dyn LifecycleHooks>,
}

impl Acceptor {
    async fn run(&self) -> NetResult<()> {
        loop {
            let permit = self
                .limit_connections
                .clone()
                .acquire_owned()
                .await
                .unwrap();

            let socket = self.accept().await?;
            let connection_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
            debug!("accepted connection {}", connection_id);

            let conn = match Connection::new(
                socket,
                connection_id,
                self.codec,
                self.worker_pool_size,
                self.dispatcher.clone(),
                self.registry.clone(),
                self.hooks.clone(),
            ) {
                Ok(conn) => conn,
                Err(err) => {
                    // the peer can vanish between accept and here
                    error!("failed to set up connection {}: {}", connection_id, err);
                    continue;
                }
            };

            // must subscribe before start, a stop can fire from any direction
            let mut exit = Shutdown::new(conn.subscribe_exit());
            conn.start();
            tokio::spawn(async move {
                if !conn.is_closed() {
                    exit.recv().await;
                }
                debug!("connection {} released its permit", conn.id());
                drop(permit);
            });
        }
    }

    async fn accept(&self) -> NetResult<TcpStream> {
        let mut backoff = 1;

        loop {
            match self.listener.accept().await {
                Ok((socket, _)) => return Ok(socket),
                Err(err) => {
                    if backoff > 64 {
                        return Err(NetError::Io(err));
                    }
                }
            }

            time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        debug!("acceptor dropped");
    }
}
