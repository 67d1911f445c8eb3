//! minirpc - a minimal RPC framework
//!
//! The framework lives in the workspace crates (`minirpc-protocol`,
//! `minirpc-server`, `minirpc-client`). This crate hosts the demo service
//! served by the `minirpc` binary.

pub mod demo;

#[cfg(test)]
mod e2e;
