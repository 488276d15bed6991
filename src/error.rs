//! Error types for the cache server
//!
//! Provides unified error handling using thiserror.

use std::io;

use thiserror::Error;

// == Server Error Enum ==
/// Unified error type for the cache server.
#[derive(Error, Debug)]
pub enum Error {
    /// Socket or runtime I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed request framing; the connection is closed after replying
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid startup configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Returns true for errors that must be reported to the peer before
    /// the connection is dropped.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

// == Command Error Enum ==
/// Errors a single command can produce. These are reported on the wire and
/// leave the connection open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid number of arguments")]
    WrongArity,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache server.
pub type Result<T> = std::result::Result<T, Error>;
