//! Binary frame format carrying one RPC message.
//!
//! Frame layout (18 bytes fixed prefix + encoded header + encoded body):
//!
//! ```text
//! +--------+---------+--------+------------+-------------+--------+
//! | magic  | version | flags  | header_len |  body_len   | crc32c |
//! | 4 bytes| 2 bytes |2 bytes |  2 bytes   |   4 bytes   | 4 bytes|
//! +--------+---------+--------+------------+-------------+--------+
//! | header       | body                                           |
//! | header_len   | body_len bytes                                 |
//! +--------------+------------------------------------------------+
//! ```
//!
//! The CRC covers the header bytes followed by the body bytes.

use crate::error::ProtocolError;
use crate::MAX_PAYLOAD_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Magic bytes identifying minirpc frames: "MRPC"
pub const MAGIC: [u8; 4] = *b"MRPC";

/// Size of the fixed frame prefix in bytes (4+2+2+2+4+4 = 18).
pub const FRAME_HEADER_SIZE: usize = 18;

/// Frame flags bitfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u16);

impl FrameFlags {
    /// CRC32C checksum is present and valid.
    pub const CRC_PRESENT: u16 = 1 << 0;

    /// Valid flags mask for protocol version 1.
    const VALID_V1_MASK: u16 = 0x0001;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_crc(mut self) -> Self {
        self.0 |= Self::CRC_PRESENT;
        self
    }

    pub fn has_crc(&self) -> bool {
        self.0 & Self::CRC_PRESENT != 0
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn from_bits(bits: u16) -> Result<Self, ProtocolError> {
        if bits & !Self::VALID_V1_MASK != 0 {
            return Err(ProtocolError::InvalidFlags(bits));
        }
        Ok(Self(bits))
    }
}

/// A parsed minirpc frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Protocol version.
    pub version: u16,
    /// Frame flags.
    pub flags: FrameFlags,
    /// Encoded message header.
    pub header: Bytes,
    /// Encoded message body.
    pub body: Bytes,
}

impl Frame {
    /// Creates a new frame from an already-encoded header and body.
    pub fn new(header: Bytes, body: Bytes) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            flags: FrameFlags::new().with_crc(),
            header,
            body,
        }
    }

    fn checksum(header: &[u8], body: &[u8]) -> u32 {
        crc32c::crc32c_append(crc32c::crc32c(header), body)
    }

    /// Returns the encoded size of this frame.
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.header.len() + self.body.len()
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        if self.body.len() > MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: u32::try_from(self.body.len()).unwrap_or(u32::MAX),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let header_len =
            u16::try_from(self.header.len()).map_err(|_| ProtocolError::FrameTooLarge {
                size: u32::try_from(self.header.len()).unwrap_or(u32::MAX),
                max: u16::MAX as u32,
            })?;

        let mut buf = BytesMut::with_capacity(self.encoded_len());

        // Magic (4 bytes)
        buf.put_slice(&MAGIC);

        // Version (2 bytes)
        buf.put_u16(self.version);

        // Flags (2 bytes)
        buf.put_u16(self.flags.bits());

        // Header length (2 bytes)
        buf.put_u16(header_len);

        // Body length (4 bytes)
        buf.put_u32(self.body.len() as u32);

        // CRC32C of header + body (4 bytes)
        let crc = if self.flags.has_crc() {
            Self::checksum(&self.header, &self.body)
        } else {
            0
        };
        buf.put_u32(crc);

        buf.put_slice(&self.header);
        buf.put_slice(&self.body);

        Ok(buf)
    }

    /// Decodes a frame from bytes.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the prefix without consuming
        let magic = [buf[0], buf[1], buf[2], buf[3]];
        if magic != MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        let version = u16::from_be_bytes([buf[4], buf[5]]);
        if version != crate::PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        let flags_bits = u16::from_be_bytes([buf[6], buf[7]]);
        let flags = FrameFlags::from_bits(flags_bits)?;

        let header_len = u16::from_be_bytes([buf[8], buf[9]]) as usize;
        let body_len = u32::from_be_bytes([buf[10], buf[11], buf[12], buf[13]]);

        if body_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: body_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let body_len = body_len as usize;

        let crc_expected = u32::from_be_bytes([buf[14], buf[15], buf[16], buf[17]]);

        let total_len = FRAME_HEADER_SIZE + header_len + body_len;
        if buf.len() < total_len {
            buf.reserve(total_len - buf.len());
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let header = buf.split_to(header_len).freeze();
        let body = buf.split_to(body_len).freeze();

        if flags.has_crc() {
            let crc_actual = Self::checksum(&header, &body);
            if crc_actual != crc_expected {
                return Err(ProtocolError::CrcMismatch {
                    expected: crc_expected,
                    actual: crc_actual,
                });
            }
        }

        Ok(Some(Self {
            version,
            flags,
            header,
            body,
        }))
    }
}
