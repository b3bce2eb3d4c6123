//! Cryptographic primitives for PASE session establishment.
//!
//! This crate provides everything the PASE handshake needs below the
//! message layer:
//! - SPAKE2+ over P-256 in prover and verifier roles ([`Spake2p`])
//! - The password verifier (`w0`, `L`) and its fixed-length encoding
//! - PBKDF parameter bounds and passcode stretching
//! - HKDF/HMAC helpers and the session-key schedule
//!
//! Security requirements:
//! - No unsafe code
//! - All secrets use Zeroizing wrappers or are wiped on drop
//! - Constant-time comparisons via subtle crate
//! - No logging of key material

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod kdf;
pub mod spake2p;
pub mod verifier;

pub use error::{Error, Result};
pub use kdf::{derive_session_keys, DerivedSessionKeys, SESSION_KEY_LENGTH};
pub use spake2p::{
    Spake2p, Spake2pRole, HASH_LENGTH, KE_LENGTH, P256_FE_LENGTH, P256_POINT_LENGTH,
};
pub use verifier::{
    compute_ws, PbkdfParameters, Spake2pVerifier, SETUP_PASSCODE_MAX,
    SPAKE2P_MAX_PBKDF_ITERATIONS, SPAKE2P_MAX_PBKDF_SALT_LENGTH, SPAKE2P_MIN_PBKDF_ITERATIONS,
    SPAKE2P_MIN_PBKDF_SALT_LENGTH, SPAKE2P_VERIFIER_SERIALIZED_LENGTH, SPAKE2P_WS_LENGTH,
};

/// Prefix of the commissioning context hashed into the SPAKE2+ transcript.
pub const SPAKE2P_CONTEXT_PREFIX: &[u8] = b"CHIP PAKE V1 Commissioning";
