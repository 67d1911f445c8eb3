//! # minirpc-server
//!
//! RPC server for minirpc.
//!
//! This crate provides:
//! - A typed service registry resolving `"Service.Method"` to handlers
//! - Per-connection negotiation and a concurrent request dispatch loop
//! - Serialized response writes and drain-on-close of in-flight requests
//! - YAML/environment configuration for the server binary

pub mod config;
pub mod error;
pub mod server;
pub mod service;

pub use config::{Config, ConfigError, NetworkConfig};
pub use error::ServerError;
pub use server::{Server, ServerConfig, ServerStats};
pub use service::{MethodType, Service};
