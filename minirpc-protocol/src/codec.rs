//! Message encoding and the async reader/writer halves of a connection.

use crate::encoding::CodecType;
use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::header::Header;
use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default read chunk size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Encodes messages into frames.
pub struct Encoder;

impl Encoder {
    /// Encodes a header and a typed body into one frame.
    pub fn encode_message<T: Serialize + ?Sized>(
        codec: CodecType,
        header: &Header,
        body: &T,
    ) -> Result<BytesMut, ProtocolError> {
        let body = codec.encode(body)?;
        Self::encode_raw(codec, header, Bytes::from(body))
    }

    /// Encodes a header together with a body that is already encoded.
    pub fn encode_raw(
        codec: CodecType,
        header: &Header,
        body: Bytes,
    ) -> Result<BytesMut, ProtocolError> {
        let header = codec.encode(header)?;
        Frame::new(Bytes::from(header), body).encode()
    }
}

/// Accumulates bytes from the stream and splits off complete frames.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(DEFAULT_READ_BUFFER_SIZE),
        }
    }

    /// Creates a decoder seeded with bytes that were read ahead of it.
    pub fn with_buffer(buffer: BytesMut) -> Self {
        Self { buffer }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.buffer)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Read half of a negotiated connection.
///
/// `read_header` pulls one whole frame off the stream; its body stays pending
/// until `read_body` decodes it or `discard_body` drops it. Reading the next
/// header discards any body left pending.
pub struct MessageReader<R> {
    reader: R,
    codec: CodecType,
    decoder: Decoder,
    chunk: Vec<u8>,
    pending_body: Option<Bytes>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R, codec: CodecType) -> Self {
        Self::with_buffered(reader, codec, BytesMut::new())
    }

    /// Creates a reader that first consumes `buffered`, the bytes read past
    /// the negotiation document.
    pub fn with_buffered(reader: R, codec: CodecType, buffered: BytesMut) -> Self {
        Self {
            reader,
            codec,
            decoder: Decoder::with_buffer(buffered),
            chunk: vec![0u8; DEFAULT_READ_BUFFER_SIZE],
            pending_body: None,
        }
    }

    pub fn codec(&self) -> CodecType {
        self.codec
    }

    /// Reads the next frame and decodes its header.
    ///
    /// Cancel safe: bytes already pulled off the stream stay buffered.
    pub async fn read_header(&mut self) -> Result<Header, ProtocolError> {
        self.pending_body = None;
        let frame = self.read_frame().await?;
        let header = self.codec.decode(&frame.header)?;
        self.pending_body = Some(frame.body);
        Ok(header)
    }

    /// Decodes the body that followed the most recently read header.
    pub fn read_body<T: DeserializeOwned>(&mut self) -> Result<T, ProtocolError> {
        let body = self.take_body()?;
        self.codec.decode(&body)
    }

    /// Takes the still-encoded body that followed the most recently read
    /// header, for callers that pick the destination type later.
    pub fn take_body(&mut self) -> Result<Bytes, ProtocolError> {
        self.pending_body.take().ok_or(ProtocolError::NoPendingBody)
    }

    /// Drops the body that followed the most recently read header.
    pub fn discard_body(&mut self) {
        self.pending_body = None;
    }

    async fn read_frame(&mut self) -> Result<Frame, ProtocolError> {
        loop {
            if let Some(frame) = self.decoder.decode_frame()? {
                return Ok(frame);
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                return Err(if self.decoder.buffered() == 0 {
                    ProtocolError::ConnectionClosed
                } else {
                    ProtocolError::UnexpectedEof
                });
            }
            self.decoder.extend(&self.chunk[..n]);
        }
    }
}

/// Write half of a negotiated connection.
///
/// Each message is written as one frame and flushed. A failed write shuts the
/// stream down so no partial frame can be followed by another.
pub struct MessageWriter<W> {
    writer: W,
    codec: CodecType,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W, codec: CodecType) -> Self {
        Self {
            writer,
            codec,
            closed: false,
        }
    }

    pub fn codec(&self) -> CodecType {
        self.codec
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Encodes and writes a header followed by its body.
    ///
    /// An encoding failure is returned before anything reaches the stream and
    /// leaves the writer usable.
    pub async fn write_message<T: Serialize + ?Sized>(
        &mut self,
        header: &Header,
        body: &T,
    ) -> Result<(), ProtocolError> {
        let frame = Encoder::encode_message(self.codec, header, body)?;
        self.write_frame(&frame).await
    }

    /// Writes a header followed by an already-encoded body.
    pub async fn write_encoded(&mut self, header: &Header, body: Bytes) -> Result<(), ProtocolError> {
        let frame = Encoder::encode_raw(self.codec, header, body)?;
        self.write_frame(&frame).await
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), ProtocolError> {
        if self.closed {
            return Err(ProtocolError::WriterClosed);
        }

        let result = match self.writer.write_all(frame).await {
            Ok(()) => self.writer.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::warn!("rpc codec: write failed, closing stream: {}", e);
            let _ = self.close().await;
            return Err(ProtocolError::Io(e));
        }
        Ok(())
    }

    /// Shuts the underlying stream down. Idempotent.
    pub async fn close(&mut self) -> Result<(), ProtocolError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.shutdown().await?;
        Ok(())
    }
}
