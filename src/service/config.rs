use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{NetError, NetResult};

/// Listener and framing limits.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    pub ip: String,
    pub port: u16,
    /// upper bound on concurrently served connections
    pub max_connection: usize,
    /// upper bound on a single frame's declared payload length
    pub max_frame_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            ip: "0.0.0.0".to_string(),
            port: 8999,
            max_connection: 1024,
            max_frame_size: 4096,
        }
    }
}

/// Sizing of the shared request worker pool.
///
/// `pool_size == 0` disables the pool entirely: every decoded request is then
/// handled on its own ad-hoc task, with no backpressure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkerPoolConfig {
    pub pool_size: usize,
    pub queue_capacity: usize,
    /// seconds between worker liveness checks
    pub monitor_interval: u64,
    /// milliseconds the monitor waits when joining a finished worker
    pub worker_check_timeout: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        WorkerPoolConfig {
            pool_size: num_cpus::get(),
            queue_capacity: 1024,
            monitor_interval: 5,
            worker_check_timeout: 200,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub network: NetworkConfig,
    pub worker_pool: WorkerPoolConfig,
}

impl ServerConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> NetResult<ServerConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(NetError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;

        Ok(server_config)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.network.ip, self.network.port)
    }
}
