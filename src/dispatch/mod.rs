//! Request Dispatch Implementation
//!
//! This module decides how a decoded request reaches the user's handler:
//! - `MessageDispatcher`: routes requests to a bounded worker pool when one
//!   is configured, or to an ad-hoc task per request otherwise
//! - `WorkerPool`: the shared pool of worker tasks with panic recovery
//! - `Request`: a decoded frame paired with its originating connection
//!
//! The ad-hoc path trades backpressure for simplicity: task growth is
//! unbounded under load. That trade-off is inherited from the original
//! design and is intentional.

pub use dispatcher::{Dispatch, MessageDispatcher, MessageHandler};
pub use request::Request;
pub use worker_pool::WorkerPool;

mod dispatcher;
mod request;
mod worker_pool;
