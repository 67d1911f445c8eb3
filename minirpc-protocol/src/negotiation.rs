//! Connection-opening negotiation.
//!
//! Before any RPC traffic the client sends a single JSON document terminated by
//! a newline, independent of the encoding it selects:
//!
//! ```text
//! {"MagicNumber":3927900,"CodecType":"application/postcard"}\n
//! ```
//!
//! A mismatched magic number or an unknown codec identifier aborts the
//! connection before any request is processed.

use crate::encoding::CodecType;
use crate::error::ProtocolError;
use crate::MAX_OPTIONS_SIZE;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Sentinel marking a minirpc connection.
pub const MAGIC_NUMBER: u64 = 0x3bef5c;

/// Negotiated connection options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub magic_number: u64,
    pub codec_type: CodecType,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            codec_type: CodecType::default(),
        }
    }
}

/// The on-the-wire form. The codec stays a string here so that an unknown
/// identifier is reported as such instead of as a JSON error.
#[derive(Debug, Serialize, Deserialize)]
struct OptionsDocument {
    #[serde(rename = "MagicNumber")]
    magic_number: u64,
    #[serde(rename = "CodecType")]
    codec_type: String,
}

impl Options {
    pub fn new(codec_type: CodecType) -> Self {
        Self {
            codec_type,
            ..Self::default()
        }
    }

    /// Encodes the options as a newline-terminated JSON document.
    pub fn to_line(&self) -> Result<Vec<u8>, ProtocolError> {
        let doc = OptionsDocument {
            magic_number: self.magic_number,
            codec_type: self.codec_type.as_str().to_string(),
        };
        let mut bytes = serde_json::to_vec(&doc)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Parses and validates one negotiation document (without the newline).
    pub fn from_line(line: &[u8]) -> Result<Self, ProtocolError> {
        let doc: OptionsDocument = serde_json::from_slice(line)?;
        if doc.magic_number != MAGIC_NUMBER {
            return Err(ProtocolError::InvalidMagicNumber {
                got: doc.magic_number,
                expected: MAGIC_NUMBER,
            });
        }
        let codec_type = doc.codec_type.parse()?;
        Ok(Self {
            magic_number: doc.magic_number,
            codec_type,
        })
    }
}

/// Sends the negotiation document and flushes it.
pub async fn write_options<W>(writer: &mut W, options: &Options) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let line = options.to_line()?;
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads and validates the negotiation document.
///
/// Returns the options together with any bytes read past the newline; those
/// already belong to the framed message stream.
pub async fn read_options<R>(reader: &mut R) -> Result<(Options, BytesMut), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(256);
    let mut chunk = [0u8; 512];
    let mut scanned = 0;

    loop {
        if let Some(pos) = buffer[scanned..].iter().position(|&b| b == b'\n') {
            let line = buffer.split_to(scanned + pos + 1);
            let options = Options::from_line(&line[..line.len() - 1])?;
            return Ok((options, buffer));
        }
        scanned = buffer.len();
        if scanned >= MAX_OPTIONS_SIZE {
            return Err(ProtocolError::OptionsTooLarge {
                max: MAX_OPTIONS_SIZE,
            });
        }

        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(if buffer.is_empty() {
                ProtocolError::ConnectionClosed
            } else {
                ProtocolError::UnexpectedEof
            });
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
}
