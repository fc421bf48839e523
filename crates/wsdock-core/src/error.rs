//! Shared error type across wsDock crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input / malformed message.
    BadRequest,
    /// Not allowed by configuration (e.g. origin).
    NotAllowed,
    /// No handler registered for the action.
    UnknownAction,
    /// Operation did not finish in time.
    Timeout,
    /// Payload too large.
    PayloadTooLarge,
    /// Server cannot take more work right now.
    Unavailable,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in logs and tests.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::NotAllowed => "NOT_ALLOWED",
            ClientCode::UnknownAction => "UNKNOWN_ACTION",
            ClientCode::Timeout => "TIMEOUT",
            ClientCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ClientCode::Unavailable => "UNAVAILABLE",
            ClientCode::Internal => "INTERNAL",
        }
    }

    /// Numeric code used in JSON replies and HTTP rejections.
    pub fn status(self) -> u16 {
        match self {
            ClientCode::BadRequest => 400,
            ClientCode::NotAllowed => 403,
            ClientCode::UnknownAction => 404,
            ClientCode::Timeout => 408,
            ClientCode::PayloadTooLarge => 413,
            ClientCode::Unavailable => 503,
            ClientCode::Internal => 500,
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, WsDockError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum WsDockError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("message size exceeds limit")]
    PayloadTooLarge,
    #[error("unexpected eof: {0}")]
    UnexpectedEof(&'static str),
    #[error("client closed connection")]
    ClientClosed,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("{0} timeout")]
    Timeout(&'static str),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("not allowed: {0}")]
    NotAllowed(String),
    #[error("too many connections")]
    TooManyConnections,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("tls: {0}")]
    Tls(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl WsDockError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            WsDockError::BadRequest(_)
            | WsDockError::Protocol(_)
            | WsDockError::Handshake(_)
            | WsDockError::UnsupportedVersion => ClientCode::BadRequest,
            WsDockError::UnknownAction(_) | WsDockError::NotFound(_) => ClientCode::UnknownAction,
            WsDockError::NotAllowed(_) => ClientCode::NotAllowed,
            WsDockError::Timeout(_) => ClientCode::Timeout,
            WsDockError::PayloadTooLarge => ClientCode::PayloadTooLarge,
            WsDockError::TooManyConnections => ClientCode::Unavailable,
            WsDockError::UnexpectedEof(_)
            | WsDockError::ClientClosed
            | WsDockError::ConnectionClosed
            | WsDockError::Io(_)
            | WsDockError::Tls(_)
            | WsDockError::Internal(_) => ClientCode::Internal,
        }
    }
}
