//! Client error types.

use minirpc_protocol::ProtocolError;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The error text the server placed in the response header.
    #[error("{0}")]
    ServerError(String),

    #[error("connection is shut down")]
    Shutdown,

    #[error("connection is already shut down")]
    AlreadyShutdown,

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("connect timeout")]
    Timeout,

    #[error("reading reply body: {0}")]
    DecodeReply(ProtocolError),

    #[error("encoding call arguments: {0}")]
    EncodeArgs(ProtocolError),
}

impl ClientError {
    /// Returns whether this error is retryable on a new connection.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::Timeout => true,
            ClientError::ConnectionClosed(_) => true,
            ClientError::Protocol(e) => e.is_eof(),
            _ => false,
        }
    }

    /// Returns whether the call failed on the server rather than in transport.
    pub fn is_server_error(&self) -> bool {
        matches!(self, ClientError::ServerError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_displays_verbatim() {
        let err = ClientError::ServerError("rpc server: service Bar not found".to_string());
        assert_eq!(err.to_string(), "rpc server: service Bar not found");
        assert!(err.is_server_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::ConnectionClosed("eof".to_string()).is_retryable());
        assert!(ClientError::Protocol(ProtocolError::ConnectionClosed).is_retryable());
        assert!(!ClientError::Protocol(ProtocolError::NoPendingBody).is_retryable());
        assert!(!ClientError::Shutdown.is_retryable());
        assert!(!ClientError::AlreadyShutdown.is_retryable());
    }
}
