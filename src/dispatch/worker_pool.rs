// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::any::type_name;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::service::WorkerPoolConfig;
use crate::{NetError, NetResult, Shutdown};

use super::{MessageHandler, Request};

fn get_type_name<T>(_: &T) -> &'static str {
    type_name::<T>()
}

/// Bounded pool of worker tasks draining a shared request queue.
///
/// Each worker pulls requests FIFO off one `async_channel` and runs the
/// handler to completion before taking the next, so ordering is preserved per
/// queue, not across connections. A monitor task watches for workers that
/// died and respawns the panicked ones.
pub struct WorkerPool {
    request_tx: async_channel::Sender<Request>,
    worker_count: usize,
}

impl WorkerPool {
    /// CAUTION: worker code runs user handlers on client-supplied input, so a
    /// worker can panic at any time. The monitor respawns panicked workers,
    /// but requests in flight at the time of the panic are lost.
    pub fn new(
        handler: Arc<dyn MessageHandler>,
        config: &WorkerPoolConfig,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> WorkerPool {
        let (request_tx, request_rx) = async_channel::bounded(config.queue_capacity);
        let num_workers = config.pool_size;
        let monitor_interval = config.monitor_interval;
        let worker_check_timeout = config.worker_check_timeout;

        let monitor_rx = request_rx.clone();
        let monitor_handler = handler.clone();
        let monitor_shutdown = notify_shutdown.clone();
        tokio::spawn(async move {
            let _shutdown_complete_tx = shutdown_complete_tx;
            let mut workers: HashMap<usize, JoinHandle<()>> = HashMap::with_capacity(num_workers);
            for id in 0..num_workers {
                workers.insert(
                    id,
                    spawn_worker(
                        id,
                        monitor_rx.clone(),
                        monitor_handler.clone(),
                        monitor_shutdown.subscribe(),
                        _shutdown_complete_tx.clone(),
                    ),
                );
            }

            let mut interval = time::interval(Duration::from_secs(monitor_interval));
            let mut shutdown = Shutdown::new(monitor_shutdown.subscribe());
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        debug!("worker pool monitor received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {}
                }

                for id in 0..num_workers {
                    let finished = workers
                        .get(&id)
                        .map(|handle| handle.is_finished())
                        .unwrap_or(false);
                    if !finished {
                        continue;
                    }
                    let Some(handle) = workers.remove(&id) else {
                        continue;
                    };
                    match time::timeout(Duration::from_millis(worker_check_timeout), handle).await {
                        Ok(Ok(_)) => {
                            info!("worker {} exited normally", id);
                        }
                        Ok(Err(join_error)) => {
                            if join_error.is_panic() {
                                let payload = join_error.into_panic();
                                if let Some(message) = payload.downcast_ref::<&'static str>() {
                                    error!("worker {} panicked with message: {}", id, message);
                                } else if let Some(message) = payload.downcast_ref::<String>() {
                                    error!("worker {} panicked with message: {}", id, message);
                                } else {
                                    error!(
                                        "worker {} panicked with an unknown type: {}",
                                        id,
                                        get_type_name(&payload)
                                    );
                                }
                            }
                            warn!("worker {} failed, restarting...", id);
                            workers.insert(
                                id,
                                spawn_worker(
                                    id,
                                    monitor_rx.clone(),
                                    monitor_handler.clone(),
                                    monitor_shutdown.subscribe(),
                                    _shutdown_complete_tx.clone(),
                                ),
                            );
                        }
                        Err(_) => {
                            warn!("worker {} did not join in time", id);
                        }
                    }
                }
            }
            debug!("worker pool monitor exiting");
        });

        WorkerPool {
            request_tx,
            worker_count: num_workers,
        }
    }

    /// Hands a request to the pool, blocking while the queue is full.
    pub async fn submit(&self, request: Request) -> NetResult<()> {
        self.request_tx
            .send(request)
            .await
            .map_err(|e| NetError::ChannelSendError(e.to_string()))
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

fn spawn_worker(
    id: usize,
    request_rx: async_channel::Receiver<Request>,
    handler: Arc<dyn MessageHandler>,
    notify_shutdown: broadcast::Receiver<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
) -> JoinHandle<()> {
    let mut shutdown = Shutdown::new(notify_shutdown);
    tokio::spawn(async move {
        let _shutdown_complete_tx = shutdown_complete_tx;
        debug!("worker {} started", id);
        loop {
            tokio::select! {
                request = request_rx.recv() => {
                    match request {
                        Ok(request) => handler.handle(request).await,
                        // all senders gone, the server is tearing down
                        Err(_) => break,
                    }
                }
                _ = shutdown.recv() => {
                    debug!("worker {} shutting down", id);
                    break;
                }
            }
        }
    })
}
