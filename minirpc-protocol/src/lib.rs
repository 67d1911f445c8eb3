//! # minirpc-protocol
//!
//! Wire protocol implementation for minirpc.
//!
//! This crate provides:
//! - The connection-opening negotiation document (magic number + codec type)
//! - The per-message `Header` and the registry of supported body encodings
//! - Binary framing with length prefix and CRC32C validation
//! - Async message reader/writer halves used by both server and client

pub mod codec;
pub mod encoding;
pub mod error;
pub mod frame;
pub mod header;
pub mod negotiation;

pub use codec::{Decoder, Encoder, MessageReader, MessageWriter};
pub use encoding::CodecType;
pub use error::ProtocolError;
pub use frame::{Frame, FrameFlags, FRAME_HEADER_SIZE, MAGIC};
pub use header::Header;
pub use negotiation::{read_options, write_options, Options, MAGIC_NUMBER};

/// Frame format version supported by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Default port for the minirpc server.
pub const DEFAULT_PORT: u16 = 7411;

/// Maximum frame body size (16 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Maximum size of the negotiation document, newline included.
pub const MAX_OPTIONS_SIZE: usize = 4096;
