//! Error types for cryptographic operations.

use thiserror::Error;

/// Result type alias for cryptographic operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Cryptographic operation errors.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Invalid input length.
    #[error("Invalid input length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length received in bytes.
        actual: usize,
    },

    /// Setup passcode does not fit in 27 bits.
    #[error("Invalid setup passcode: {0:#x} exceeds 27 bits")]
    InvalidPasscode(u32),

    /// PBKDF iteration count outside the allowed range.
    #[error("Invalid PBKDF iteration count: {0}")]
    InvalidIterationCount(u32),

    /// PBKDF salt length outside the allowed range.
    #[error("Invalid PBKDF salt length: {0}")]
    InvalidSaltLength(usize),

    /// Point is not a valid uncompressed P-256 point.
    #[error("Invalid curve point: {0}")]
    InvalidPoint(String),

    /// Scalar is not canonical (>= group order) or is zero.
    #[error("Invalid scalar: {0}")]
    InvalidScalar(String),

    /// Key derivation failed.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Peer confirmation value did not match.
    #[error("Key confirmation failed")]
    ConfirmationFailed,

    /// Operation not valid in the current SPAKE2+ state.
    #[error("Invalid SPAKE2+ state: {0}")]
    InvalidState(&'static str),
}
