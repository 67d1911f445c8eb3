//! # minirpc-client
//!
//! Client library for minirpc.
//!
//! This crate provides:
//! - Connection negotiation over any async byte stream, or TCP via `dial`
//! - Concurrent calls multiplexed over a single connection by sequence number
//! - Teardown of every outstanding call when the connection fails

pub mod client;
pub mod connection;
pub mod error;

pub use client::{Call, Client};
pub use connection::ConnectionConfig;
pub use error::ClientError;
