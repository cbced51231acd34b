//! Crate-level error taxonomy.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::noise::{self, TransportError};

/// Top-level error returned by sessions and the connection orchestrator.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad flags, protocol name or key material. Raised before any socket opens.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The handshake failed; fatal to that session.
    #[error("handshake failed: {0}")]
    Handshake(#[from] noise::Error),
    /// The transport failed; fatal to that session.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    /// Bind, listen, dial or spawn failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors that come from the peer rather than local setup.
    pub fn is_session_error(&self) -> bool {
        matches!(self, Error::Handshake(_) | Error::Transport(_))
    }
}
