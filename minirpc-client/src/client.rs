//! Call multiplexing over a single connection.
//!
//! Any number of tasks may issue calls on one [`Client`] at once. Each call
//! gets the next sequence number and waits in the pending table until the
//! receive loop sees a response carrying that number.
//!
//! Locking: the send lock guards the write half and is always taken before
//! the state lock when both are needed. The state lock is never held across
//! an await.

use crate::connection::ConnectionConfig;
use crate::error::ClientError;
use bytes::Bytes;
use minirpc_protocol::{
    write_options, CodecType, Header, MessageReader, MessageWriter, Options, ProtocolError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{oneshot, Mutex, Notify};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Completion side of an outstanding call. Carries the still-encoded reply.
type ReplySender = oneshot::Sender<Result<Bytes, ClientError>>;

struct State {
    seq: u64,
    pending: HashMap<u64, ReplySender>,
    /// Set by the user calling `close`.
    closing: bool,
    /// Set once the connection has failed or the receive loop has ended.
    shutdown: bool,
}

struct Inner {
    codec: CodecType,
    sending: Mutex<MessageWriter<BoxedWriter>>,
    state: parking_lot::Mutex<State>,
    close_requested: Notify,
}

/// An RPC client bound to one connection.
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Negotiates `options` over `stream` and starts the receive loop.
    pub async fn new<S>(stream: S, options: Options) -> Result<Self, ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        if let Err(e) = write_options(&mut write_half, &options).await {
            tracing::warn!("rpc client: options error: {}", e);
            return Err(e.into());
        }

        let codec = options.codec_type;
        let reader: BoxedReader = Box::new(read_half);
        let writer: BoxedWriter = Box::new(write_half);

        let inner = Arc::new(Inner {
            codec,
            sending: Mutex::new(MessageWriter::new(writer, codec)),
            state: parking_lot::Mutex::new(State {
                seq: 1,
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
            close_requested: Notify::new(),
        });

        tokio::spawn(receive(inner.clone(), MessageReader::new(reader, codec)));

        Ok(Self { inner })
    }

    /// Connects to a server over TCP.
    pub async fn dial(addr: impl ToSocketAddrs, config: ConnectionConfig) -> Result<Self, ClientError> {
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                tracing::debug!("Connection timeout");
                ClientError::Timeout
            })?
            .map_err(|e| {
                tracing::debug!("Connection failed: {}", e);
                ClientError::Io(e)
            })?;

        stream.set_nodelay(true).ok();
        Self::new(stream, config.options).await
    }

    /// Issues a call and returns without waiting for the reply.
    ///
    /// The returned [`Call`] always completes, with the reply or an error.
    pub async fn go<A, R>(&self, service_method: &str, args: &A) -> Call<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let (tx, rx) = oneshot::channel();
        let seq = self.send(service_method, args, tx).await;
        Call {
            seq,
            service_method: service_method.to_string(),
            codec: self.inner.codec,
            done: rx,
            _reply: PhantomData,
        }
    }

    /// Issues a call and waits for its reply.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R, ClientError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.go(service_method, args).await.done().await
    }

    /// Registers and writes one call. Returns the sequence number it was
    /// assigned, or 0 when it failed before registration.
    async fn send<A: Serialize + ?Sized>(
        &self,
        service_method: &str,
        args: &A,
        reply: ReplySender,
    ) -> u64 {
        let body = match self.inner.codec.encode(args) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                let _ = reply.send(Err(ClientError::EncodeArgs(e)));
                return 0;
            }
        };

        let mut writer = self.inner.sending.lock().await;

        let seq = {
            let mut state = self.inner.state.lock();
            if state.closing || state.shutdown {
                let _ = reply.send(Err(ClientError::Shutdown));
                return 0;
            }
            let seq = state.seq;
            state.seq += 1;
            state.pending.insert(seq, reply);
            seq
        };

        let header = Header::new(service_method, seq);
        if let Err(e) = writer.write_encoded(&header, body).await {
            tracing::debug!("rpc client: sending {} (seq={}): {}", service_method, seq, e);
            self.inner.abort_on_write_failure(seq, e);
        }
        seq
    }

    /// Closes the connection. Calls still pending complete with
    /// [`ClientError::Shutdown`].
    ///
    /// Fails with [`ClientError::AlreadyShutdown`] if the client was already
    /// closed or its connection has failed.
    pub async fn close(&self) -> Result<(), ClientError> {
        {
            let mut state = self.inner.state.lock();
            if state.closing || state.shutdown {
                return Err(ClientError::AlreadyShutdown);
            }
            state.closing = true;
        }
        self.inner.close_requested.notify_one();
        self.inner.sending.lock().await.close().await?;
        Ok(())
    }

    /// Returns whether the client can still issue calls.
    pub fn is_available(&self) -> bool {
        let state = self.inner.state.lock();
        !state.closing && !state.shutdown
    }

    /// Returns the number of calls awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn codec(&self) -> CodecType {
        self.inner.codec
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        if !state.closing {
            state.closing = true;
            drop(state);
            self.inner.close_requested.notify_one();
        }
    }
}

/// Reads responses until the connection fails or is closed, then fails every
/// call still pending.
async fn receive(inner: Arc<Inner>, mut reader: MessageReader<BoxedReader>) {
    let reason = loop {
        let header = tokio::select! {
            result = reader.read_header() => match result {
                Ok(header) => header,
                Err(e) => break ClientError::from(e),
            },
            _ = inner.close_requested.notified() => break ClientError::Shutdown,
        };

        let reply = inner.state.lock().pending.remove(&header.seq);
        match reply {
            None => {
                tracing::debug!("rpc client: no pending call for seq={}", header.seq);
                reader.discard_body();
            }
            Some(reply) if header.is_error() => {
                reader.discard_body();
                let _ = reply.send(Err(ClientError::ServerError(header.error)));
            }
            Some(reply) => {
                let body = reader.take_body().map_err(ClientError::DecodeReply);
                let _ = reply.send(body);
            }
        }
    };

    inner.terminate_calls(reason).await;
}

impl Inner {
    /// Tears the connection down after the write of call `seq` failed.
    ///
    /// Must be called with the send lock held. The failing call gets the
    /// write error; every other pending call fails as on connection loss.
    fn abort_on_write_failure(&self, seq: u64, error: ProtocolError) {
        let (failed, pending) = {
            let mut state = self.state.lock();
            state.shutdown = true;
            // The receive loop may already have torn the call down.
            let failed = state.pending.remove(&seq);
            (failed, std::mem::take(&mut state.pending))
        };

        let reason = ClientError::from(error);
        for (_, reply) in pending {
            let _ = reply.send(Err(teardown_error(&reason)));
        }
        if let Some(reply) = failed {
            let _ = reply.send(Err(reason));
        }
        self.close_requested.notify_one();
    }

    async fn terminate_calls(&self, reason: ClientError) {
        let mut writer = self.sending.lock().await;
        let pending = {
            let mut state = self.state.lock();
            state.shutdown = true;
            std::mem::take(&mut state.pending)
        };

        match &reason {
            ClientError::Shutdown => tracing::debug!("rpc client: closed"),
            reason => tracing::debug!("rpc client: connection lost: {}", reason),
        }
        for (_, reply) in pending {
            let _ = reply.send(Err(teardown_error(&reason)));
        }

        if let Err(e) = writer.close().await {
            tracing::debug!("rpc client: close: {}", e);
        }
    }
}

fn teardown_error(reason: &ClientError) -> ClientError {
    match reason {
        ClientError::Shutdown => ClientError::Shutdown,
        reason => ClientError::ConnectionClosed(reason.to_string()),
    }
}

/// An outstanding call.
pub struct Call<R> {
    seq: u64,
    service_method: String,
    codec: CodecType,
    done: oneshot::Receiver<Result<Bytes, ClientError>>,
    _reply: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned> Call<R> {
    /// Sequence number assigned to the call, or 0 if it failed before
    /// being sent.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn service_method(&self) -> &str {
        &self.service_method
    }

    /// Waits for the call to complete and decodes its reply.
    pub async fn done(self) -> Result<R, ClientError> {
        let body = self
            .done
            .await
            .map_err(|_| ClientError::ConnectionClosed("call abandoned".to_string()))??;
        self.codec.decode(&body).map_err(ClientError::DecodeReply)
    }
}

impl<R> std::fmt::Debug for Call<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("seq", &self.seq)
            .field("service_method", &self.service_method)
            .finish()
    }
}
