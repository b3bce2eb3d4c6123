//! Transport layer errors.

use std::time::Duration;

use thiserror::Error;

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Transport errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Peer closed the exchange before the handshake finished.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// No message from the peer within the handshake timeout.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Frame length exceeds the transport bound.
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Protocol error from core.
    #[error("Protocol error: {0}")]
    Protocol(#[from] pase_core::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
