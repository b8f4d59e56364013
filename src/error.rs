//! Shared error taxonomy for the FTP and IMAP session cores.

use thiserror::Error;

/// Telemetry error category. Every [`CoreError`] carries one so the dispatch
/// layer and the telemetry hooks can classify failures without re-deriving
/// it from a reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transport,
    Protocol,
    Auth,
    Authorization,
    NotFound,
    Conflict,
    LimitExceeded,
    Internal,
    Shutdown,
}

/// Errors shared by both protocol engines: transport failures, TLS handshake
/// failures, and the line-framing errors produced by [`crate::line_codec::LineCodec`].
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("line exceeded maximum length of {0} bytes")]
    LineTooLong(usize),

    #[error("command line contained illegal (non-ASCII) characters")]
    IllegalCharacters,

    #[error("connection closed by peer")]
    ConnectionClosed,
}

impl CoreError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CoreError::Io(_) | CoreError::ConnectionClosed => ErrorCategory::Transport,
            CoreError::Tls(_) => ErrorCategory::Transport,
            CoreError::LineTooLong(_) | CoreError::IllegalCharacters => ErrorCategory::Protocol,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
