//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur during negotiation, framing or
/// message encoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid frame magic: expected 'MRPC', got {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("invalid magic number {got:#x}, expected {expected:#x}")]
    InvalidMagicNumber { got: u64, expected: u64 },

    #[error("unsupported codec type '{0}'")]
    UnsupportedCodec(String),

    #[error("negotiation document too large (max {max} bytes)")]
    OptionsTooLarge { max: usize },

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("CRC mismatch: expected {expected:#x}, got {actual:#x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("invalid frame flags: {0:#x}")]
    InvalidFlags(u16),

    #[error("no message body pending")]
    NoPendingBody,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("unexpected end of stream inside a frame")]
    UnexpectedEof,

    #[error("writer closed after a previous write failure")]
    WriterClosed,
}

impl ProtocolError {
    /// Returns whether this error is a clean end of stream rather than a
    /// failure worth reporting.
    pub fn is_eof(&self) -> bool {
        matches!(self, ProtocolError::ConnectionClosed)
    }

    /// Returns whether the error leaves the byte stream in an unusable state.
    pub fn is_stream_fatal(&self) -> bool {
        !matches!(
            self,
            ProtocolError::Json(_) | ProtocolError::Postcard(_) | ProtocolError::NoPendingBody
        )
    }
}
