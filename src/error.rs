//! Error types for the SMB client

use crate::protocol::status::NtStatus;
use nix::errno::Errno;
use std::io;
use thiserror::Error;

/// Result type for SMB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for SMB client operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The server answered with a non-success NT status
    #[error("{context}: {status}")]
    Status { status: NtStatus, context: String },

    /// Protocol parsing error
    #[error("Protocol parsing error: {0}")]
    ParseError(String),

    /// Buffer too small
    #[error("Buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    /// Unsupported protocol version
    #[error("Unsupported protocol version: {0}")]
    UnsupportedProtocol(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// DCE/RPC level failure (fault PDU, bind rejection, bad stub)
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Transport is not established
    #[error("Not connected")]
    NotConnected,

    /// Connection closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Timeout occurred
    #[error("Operation timed out")]
    Timeout,

    /// Not implemented
    #[error("Feature not implemented: {0}")]
    NotImplemented(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Handle was already closed locally
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Malformed SMB URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl Error {
    pub(crate) fn status(status: NtStatus, context: impl Into<String>) -> Self {
        Error::Status {
            status,
            context: context.into(),
        }
    }

    /// NT status carried by this error, if it came from the server
    pub fn nt_status(&self) -> Option<NtStatus> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// POSIX-style errno equivalent
    pub fn errno(&self) -> Errno {
        match self {
            Error::Status { status, .. } => status.errno(),
            Error::Io(e) => e.raw_os_error().map_or(Errno::EIO, Errno::from_raw),
            Error::NotConnected | Error::ConnectionClosed => Errno::ENOTCONN,
            Error::Timeout => Errno::ETIMEDOUT,
            Error::InvalidHandle(_) => Errno::EBADF,
            Error::InvalidParameter(_) | Error::InvalidUrl(_) => Errno::EINVAL,
            Error::NotImplemented(_) => Errno::EOPNOTSUPP,
            Error::AuthenticationFailed(_) => Errno::EACCES,
            _ => Errno::EIO,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.errno() == Errno::ENOENT
    }
}
