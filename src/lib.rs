mod dispatch;
mod network;
mod service;

pub use dispatch::{Dispatch, MessageDispatcher, MessageHandler, Request, WorkerPool};
pub use network::{
    Connection, ConnectionRegistry, Frame, FrameCodec, FrameHeader, LifecycleHooks, NoopHooks,
    PropertyValue, Registry,
};
pub use service::{
    setup_local_tracing, setup_tracing, LogGuard, NetError, NetResult, NetworkConfig, Server,
    ServerConfig, Shutdown, WorkerPoolConfig,
};
