//! Network Module Implementation
//!
//! This module provides the core networking functionality for the framework,
//! owning accepted TCP connections and the wire protocol they speak.
//!
//! # Components
//!
//! - `FrameCodec`: encodes and decodes the length-prefixed binary frame
//!   format, independent of any socket
//! - `Connection`: owns one accepted socket and runs its read and write
//!   loops as two concurrently scheduled tasks
//! - `Registry`: tracks the live connections of a server instance
//!
//! # Features
//!
//! - Exactly-once, deterministic connection teardown from either direction
//! - Frame size validation against a per-instance limit
//! - Per-connection property storage behind a reader/writer lock

pub use codec::{Frame, FrameCodec, FrameHeader};
pub use connection::{Connection, LifecycleHooks, NoopHooks, PropertyValue};
pub use registry::{ConnectionRegistry, Registry};

mod codec;
mod connection;
mod registry;
