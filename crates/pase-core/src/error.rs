//! Error types for handshake operations.

use crate::message::MessageType;
use crate::status::ProtocolCode;
use thiserror::Error;

/// Result type alias for handshake operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Handshake errors.
///
/// Every error is terminal for the session that raised it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed TLV, wrong field type or length, or missing field.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Message type other than the one the session waits for.
    #[error("Unexpected message: expected {expected}, received {received}")]
    UnexpectedMessage {
        /// The only message type the session accepts now.
        expected: MessageType,
        /// The message type that arrived.
        received: MessageType,
    },

    /// Operation not valid in the current phase.
    #[error("Invalid state transition: {0}")]
    InvalidState(&'static str),

    /// Protocol violation.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// PBKDF parameters or passcode outside the protocol bounds.
    #[error("Parameter out of range: {0}")]
    ParameterOutOfRange(String),

    /// Echoed initiator random does not match.
    #[error("Initiator random mismatch")]
    RandomMismatch,

    /// Peer confirmation value (cA or cB) did not verify.
    #[error("Key confirmation failed")]
    ConfirmationFailed,

    /// Peer terminated the handshake with a StatusReport.
    #[error("Peer status: general {general:#06x}, protocol code {protocol_code:#06x}")]
    PeerStatus {
        /// StatusReport general code.
        general: u16,
        /// StatusReport protocol code.
        protocol_code: u16,
    },

    /// Handshake torn down locally (timeout, connection loss, shutdown).
    #[error("Handshake aborted: {0}")]
    Aborted(String),

    /// Cryptographic error.
    #[error("Crypto error: {0}")]
    Crypto(#[from] pase_crypto::Error),
}

impl Error {
    /// Protocol code reported to the peer for this failure.
    ///
    /// `None` when the peer already knows (it sent the StatusReport).
    pub fn status_code(&self) -> Option<ProtocolCode> {
        match self {
            Self::PeerStatus { .. } => None,
            Self::Aborted(_) => Some(ProtocolCode::CloseSession),
            Self::Decode(_)
            | Self::UnexpectedMessage { .. }
            | Self::InvalidState(_)
            | Self::ProtocolViolation(_)
            | Self::ParameterOutOfRange(_)
            | Self::RandomMismatch
            | Self::ConfirmationFailed
            | Self::Crypto(_) => Some(ProtocolCode::InvalidParameter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            Error::ConfirmationFailed.status_code(),
            Some(ProtocolCode::InvalidParameter)
        );
        assert_eq!(
            Error::Crypto(pase_crypto::Error::ConfirmationFailed).status_code(),
            Some(ProtocolCode::InvalidParameter)
        );
        assert_eq!(
            Error::Aborted("timeout".into()).status_code(),
            Some(ProtocolCode::CloseSession)
        );
        assert_eq!(
            Error::PeerStatus {
                general: 1,
                protocol_code: 2
            }
            .status_code(),
            None
        );
    }

    #[test]
    fn test_display() {
        let err = Error::UnexpectedMessage {
            expected: MessageType::Pake1,
            received: MessageType::Pake3,
        };
        assert_eq!(
            err.to_string(),
            "Unexpected message: expected Pake1, received Pake3"
        );
    }
}
