//! Connection handling and request dispatch.

use crate::error::ServerError;
use crate::service::{is_exported, MethodType, PreparedCall, Service};
use bytes::Bytes;
use futures::FutureExt;
use minirpc_protocol::{read_options, CodecType, Header, MessageReader, MessageWriter};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinSet;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Time allowed for a new connection to send its negotiation document.
    pub handshake_timeout: Duration,
    /// Maximum concurrent connections accepted by [`Server::accept`].
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// An inbound request: its header plus either the resolved method with its
/// prepared call, or the error to answer with.
struct Request {
    header: Header,
    call: Result<(Arc<MethodType>, PreparedCall), ServerError>,
}

/// Write half of a connection, shared by its handler tasks.
type SharedWriter<W> = Arc<Mutex<MessageWriter<W>>>;

/// RPC server.
pub struct Server {
    config: ServerConfig,
    services: RwLock<HashMap<String, Arc<Service>>>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server with no services.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            services: RwLock::new(HashMap::new()),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Publishes a service.
    pub fn register(&self, service: Service) -> Result<(), ServerError> {
        let name = service.name().to_string();
        if !is_exported(&name) {
            return Err(ServerError::InvalidServiceName(name));
        }

        let mut services = self.services.write();
        if services.contains_key(&name) {
            return Err(ServerError::DuplicateService(name));
        }
        for method in service.methods() {
            tracing::debug!(
                "rpc server: register {}.{} ({} -> {})",
                name,
                method.name(),
                method.arg_type(),
                method.reply_type()
            );
        }
        tracing::info!("rpc server: registered service {}", name);
        services.insert(name, Arc::new(service));
        Ok(())
    }

    /// Looks up a `"Service.Method"` name.
    pub fn resolve(&self, service_method: &str) -> Result<Arc<MethodType>, ServerError> {
        let (service_name, method_name) = service_method
            .rsplit_once('.')
            .ok_or_else(|| ServerError::IllFormedServiceMethod(service_method.to_string()))?;

        let services = self.services.read();
        let service = services
            .get(service_name)
            .ok_or_else(|| ServerError::ServiceNotFound(service_name.to_string()))?;
        service
            .method(method_name)
            .ok_or_else(|| ServerError::MethodNotFound {
                service: service_name.to_string(),
                method: method_name.to_string(),
            })
    }

    /// Accepts connections until [`Server::shutdown`] is called, serving each
    /// on its own task.
    pub async fn accept(self: &Arc<Self>, listener: TcpListener) -> Result<(), ServerError> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("rpc server: listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!("[{}] set_nodelay failed: {}", addr, e);
                            }

                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.serve_conn(stream, addr).await {
                                    tracing::debug!("Connection {} error: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Serves a single connection until the peer disconnects, the stream
    /// breaks, or the server shuts down.
    ///
    /// Fails only when negotiation fails; errors after that are answered
    /// per request or end the connection quietly.
    pub async fn serve_conn<S>(&self, stream: S, peer: impl Display) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
        let result = self.serve_negotiated(stream, &peer).await;
        self.stats.connections_active.fetch_sub(1, Ordering::Relaxed);
        tracing::info!("Client disconnected: {}", peer);
        result
    }

    async fn serve_negotiated<S>(&self, stream: S, peer: &impl Display) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (mut read_half, write_half) = tokio::io::split(stream);

        let negotiated =
            tokio::time::timeout(self.config.handshake_timeout, read_options(&mut read_half)).await;
        let (options, leftover) = match negotiated {
            Ok(Ok(negotiated)) => negotiated,
            Ok(Err(e)) => {
                tracing::warn!("[{}] rpc server: options error: {}", peer, e);
                self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                return Err(ServerError::Protocol(e));
            }
            Err(_) => {
                tracing::warn!("[{}] rpc server: negotiation timed out", peer);
                self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                return Err(ServerError::HandshakeTimeout);
            }
        };

        let codec = options.codec_type;
        tracing::info!("Client connected: {} ({})", peer, codec);

        let mut reader = MessageReader::with_buffered(read_half, codec, leftover);
        let writer: SharedWriter<_> = Arc::new(Mutex::new(MessageWriter::new(write_half, codec)));
        let write_failed = Arc::new(Notify::new());
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut tasks = JoinSet::new();

        loop {
            let header = tokio::select! {
                result = reader.read_header() => match result {
                    Ok(header) => header,
                    Err(e) if e.is_eof() => {
                        tracing::debug!("[{}] Connection closed by client", peer);
                        break;
                    }
                    Err(e) => {
                        tracing::debug!("[{}] rpc server: read header: {}", peer, e);
                        break;
                    }
                },
                _ = write_failed.notified() => {
                    tracing::debug!("[{}] Response write failed, closing", peer);
                    break;
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", peer);
                    break;
                }
            };

            self.stats.requests_total.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("[{}] Request: {} (seq={})", peer, header.service_method, header.seq);

            let request = self.read_request(header, &mut reader);
            tasks.spawn(handle_request(
                request,
                codec,
                writer.clone(),
                write_failed.clone(),
                self.stats.clone(),
            ));

            while let Some(finished) = tasks.try_join_next() {
                if let Err(e) = finished {
                    tracing::error!("[{}] request task failed: {}", peer, e);
                }
            }
        }

        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                tracing::error!("[{}] request task failed: {}", peer, e);
            }
        }

        if let Err(e) = writer.lock().await.close().await {
            tracing::debug!("[{}] close: {}", peer, e);
        }
        Ok(())
    }

    /// Resolves the method named by `header` and decodes its argument.
    ///
    /// The body is consumed in every case so the next header starts clean.
    fn read_request<R: AsyncRead + Unpin>(
        &self,
        header: Header,
        reader: &mut MessageReader<R>,
    ) -> Request {
        let call = match self.resolve(&header.service_method) {
            Ok(method) => match reader.take_body() {
                Ok(body) => method
                    .prepare(reader.codec(), &body)
                    .map(|prepared| (method, prepared)),
                Err(e) => Err(ServerError::ReadArgument(e)),
            },
            Err(e) => {
                reader.discard_body();
                Err(e)
            }
        };
        Request { header, call }
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether [`Server::accept`] is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Invokes one request and writes its response.
async fn handle_request<W: AsyncWrite + Unpin>(
    request: Request,
    codec: CodecType,
    writer: SharedWriter<W>,
    write_failed: Arc<Notify>,
    stats: Arc<ServerStats>,
) {
    let Request { mut header, call } = request;

    let result = match call {
        Ok((method, prepared)) => {
            let invocation = method.call(prepared);
            match AssertUnwindSafe(invocation).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(format!(
                    "rpc server: method {} panicked",
                    header.service_method
                )),
            }
        }
        Err(e) => Err(e.to_string()),
    };

    let body = match result {
        Ok(body) => body,
        Err(msg) => {
            tracing::debug!(
                "rpc server: {} (seq={}) failed: {}",
                header.service_method,
                header.seq,
                msg
            );
            stats.errors_total.fetch_add(1, Ordering::Relaxed);
            header.error = msg;
            codec.encode(&()).map(Bytes::from).unwrap_or_default()
        }
    };

    let mut writer = writer.lock().await;
    if let Err(e) = writer.write_encoded(&header, body).await {
        tracing::warn!(
            "rpc server: writing response for {} (seq={}): {}",
            header.service_method,
            header.seq,
            e
        );
        write_failed.notify_one();
    }
}
