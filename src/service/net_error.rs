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

pub type NetResult<T> = Result<T, NetError>;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// returned to `send` callers once the connection has been stopped;
    /// recoverable, the caller decides whether to drop the message
    #[error("connection closed")]
    ConnectionClosed,

    /// returned by `get_property` for an absent key
    #[error("property not found: {0}")]
    PropertyNotFound(String),

    /// protocol error, fatal to the connection
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// transport error, fatal to the connection
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("channel send error: {0}")]
    ChannelSendError(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),
}
