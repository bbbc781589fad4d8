pub use config::{NetworkConfig, ServerConfig, WorkerPoolConfig};
pub use logging::{setup_local_tracing, setup_tracing, LogGuard};
pub use net_error::{NetError, NetResult};
pub use server::Server;
pub use shutdown::Shutdown;

mod config;
mod logging;
mod net_error;
mod server;
mod shutdown;
