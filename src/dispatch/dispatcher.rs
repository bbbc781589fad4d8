use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::service::WorkerPoolConfig;
use crate::NetResult;

use super::{Request, WorkerPool};

/// User-supplied business logic, invoked once per decoded frame.
///
/// There is deliberately no per-message-id routing table here; one handler
/// sees every frame and branches on `request.msg_id()` as it needs to.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, request: Request);
}

/// Execution path for decoded requests.
///
/// `enqueue_task` goes through a bounded queue and may block the caller when
/// the queue is full; `handle_direct` must cost the caller no more than task
/// creation.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn enqueue_task(&self, request: Request) -> NetResult<()>;

    fn handle_direct(&self, request: Request);
}

/// Production dispatcher: a shared bounded worker pool when one is
/// configured, ad-hoc tasks otherwise.
pub struct MessageDispatcher {
    handler: Arc<dyn MessageHandler>,
    pool: Option<WorkerPool>,
}

impl MessageDispatcher {
    pub fn new(
        handler: Arc<dyn MessageHandler>,
        pool_config: &WorkerPoolConfig,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> MessageDispatcher {
        let pool = if pool_config.pool_size > 0 {
            Some(WorkerPool::new(
                handler.clone(),
                pool_config,
                notify_shutdown,
                shutdown_complete_tx,
            ))
        } else {
            None
        };
        MessageDispatcher { handler, pool }
    }

    pub fn pool_size(&self) -> usize {
        self.pool.as_ref().map_or(0, |pool| pool.worker_count())
    }
}

#[async_trait]
impl Dispatch for MessageDispatcher {
    async fn enqueue_task(&self, request: Request) -> NetResult<()> {
        match &self.pool {
            Some(pool) => pool.submit(request).await,
            // no pool configured, fall back to the unbounded path
            None => {
                self.handle_direct(request);
                Ok(())
            }
        }
    }

    fn handle_direct(&self, request: Request) {
        let handler = self.handler.clone();
        tokio::spawn(async move {
            handler.handle(request).await;
        });
    }
}
