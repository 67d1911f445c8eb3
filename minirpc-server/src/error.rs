//! Server error types.

use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] minirpc_protocol::ProtocolError),

    #[error("rpc server: {0} is not a valid service name")]
    InvalidServiceName(String),

    #[error("rpc server: service {0} is already defined")]
    DuplicateService(String),

    #[error("rpc server: service/method request ill-formed: {0}")]
    IllFormedServiceMethod(String),

    #[error("rpc server: service {0} not found")]
    ServiceNotFound(String),

    #[error("rpc server: method {method} of service {service} not found")]
    MethodNotFound { service: String, method: String },

    #[error("rpc server: read argument failed: {0}")]
    ReadArgument(minirpc_protocol::ProtocolError),

    #[error("rpc server: encode reply failed: {0}")]
    EncodeReply(minirpc_protocol::ProtocolError),

    #[error("negotiation timed out")]
    HandshakeTimeout,
}

impl ServerError {
    /// Returns whether the error is reported to the caller in a response
    /// header while the connection stays open.
    pub fn is_per_request(&self) -> bool {
        matches!(
            self,
            ServerError::IllFormedServiceMethod(_)
                | ServerError::ServiceNotFound(_)
                | ServerError::MethodNotFound { .. }
                | ServerError::ReadArgument(_)
                | ServerError::EncodeReply(_)
        )
    }
}
