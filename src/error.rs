//! Error types
//!
//! Only bind failures are meant to reach callers of the server lifecycle API.
//! Connection errors end the connection that produced them and are logged.

use std::net::SocketAddr;
use std::time::Duration;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for server operations
#[derive(Debug)]
pub enum Error {
    /// The listening socket could not be opened
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    /// I/O failure on a connection
    Io(std::io::Error),
    /// A part could not be written before the write deadline expired
    WriteTimeout(Duration),
}

impl Error {
    /// Whether this error ended a connection because the peer went away
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            Error::WriteTimeout(_) => true,
            Error::Bind { .. } => false,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Bind { addr, source } => write!(f, "Failed to bind {}: {}", addr, source),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::WriteTimeout(after) => {
                write!(f, "Write timed out after {} ms", after.as_millis())
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Bind { source, .. } => Some(source),
            Error::Io(e) => Some(e),
            Error::WriteTimeout(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}
