//! Password verifier and PBKDF parameters.
//!
//! The verifier is the long-term secret the accessory holds instead of the
//! raw setup passcode: `w0` (a P-256 scalar) and `L = w1 * G`. Both are
//! derived from the passcode with PBKDF2-HMAC-SHA256:
//!
//! ```text
//! w0s || w1s = PBKDF2(passcode as u32 LE, salt, iterations, 80)
//! w0 = w0s mod n
//! w1 = w1s mod n
//! L  = w1 * G
//! ```
//!
//! The serialized form is the fixed-length concatenation `w0 || L`.

use core::fmt;

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::ProjectivePoint;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::kdf::pbkdf2_sha256;
use crate::spake2p::{scalar_from_ws, P256_FE_LENGTH, P256_POINT_LENGTH};
use crate::{Error, Result};

/// Minimum PBKDF salt length in bytes.
pub const SPAKE2P_MIN_PBKDF_SALT_LENGTH: usize = 16;
/// Maximum PBKDF salt length in bytes.
pub const SPAKE2P_MAX_PBKDF_SALT_LENGTH: usize = 32;
/// Minimum PBKDF iteration count.
pub const SPAKE2P_MIN_PBKDF_ITERATIONS: u32 = 1000;
/// Maximum PBKDF iteration count.
pub const SPAKE2P_MAX_PBKDF_ITERATIONS: u32 = 100_000;
/// Largest setup passcode (27 bits).
pub const SETUP_PASSCODE_MAX: u32 = 0x7FF_FFFF;
/// Length of each of `w0s` and `w1s` (group size plus 8 bytes of bias reduction).
pub const SPAKE2P_WS_LENGTH: usize = P256_FE_LENGTH + 8;
/// Serialized verifier length: `w0 || L`.
pub const SPAKE2P_VERIFIER_SERIALIZED_LENGTH: usize = P256_FE_LENGTH + P256_POINT_LENGTH;

/// PBKDF parameters negotiated in PBKDFParamResponse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbkdfParameters {
    /// PBKDF2 iteration count.
    pub iterations: u32,
    /// PBKDF2 salt.
    pub salt: Vec<u8>,
}

impl PbkdfParameters {
    /// Create parameters without validating them.
    pub fn new(iterations: u32, salt: impl Into<Vec<u8>>) -> Self {
        Self {
            iterations,
            salt: salt.into(),
        }
    }

    /// Check iteration count and salt length against the protocol bounds.
    pub fn validate(&self) -> Result<()> {
        validate_pbkdf(self.iterations, &self.salt)
    }
}

fn validate_pbkdf(iterations: u32, salt: &[u8]) -> Result<()> {
    if !(SPAKE2P_MIN_PBKDF_ITERATIONS..=SPAKE2P_MAX_PBKDF_ITERATIONS).contains(&iterations) {
        return Err(Error::InvalidIterationCount(iterations));
    }
    if !(SPAKE2P_MIN_PBKDF_SALT_LENGTH..=SPAKE2P_MAX_PBKDF_SALT_LENGTH).contains(&salt.len()) {
        return Err(Error::InvalidSaltLength(salt.len()));
    }
    Ok(())
}

/// Derive `w0s || w1s` from the setup passcode.
///
/// This is the material the prover needs directly; the verifier only keeps
/// the reduced `w0` and the point `L`.
///
/// # Errors
///
/// Returns an error if the passcode exceeds 27 bits or the PBKDF parameters
/// are out of bounds. No derivation is attempted in that case.
pub fn compute_ws(
    passcode: u32,
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<[u8; 2 * SPAKE2P_WS_LENGTH]>> {
    if passcode > SETUP_PASSCODE_MAX {
        return Err(Error::InvalidPasscode(passcode));
    }
    validate_pbkdf(iterations, salt)?;

    let password = Zeroizing::new(passcode.to_le_bytes());
    let mut ws = Zeroizing::new([0u8; 2 * SPAKE2P_WS_LENGTH]);
    pbkdf2_sha256(password.as_ref(), salt, iterations, ws.as_mut());
    Ok(ws)
}

/// SPAKE2+ password verifier (`w0`, `L`).
///
/// `L` allows an offline search over the passcode, so both halves are
/// wiped on drop.
#[derive(Clone)]
pub struct Spake2pVerifier {
    w0: Zeroizing<[u8; P256_FE_LENGTH]>,
    l: Zeroizing<[u8; P256_POINT_LENGTH]>,
}

impl Spake2pVerifier {
    /// Generate a verifier from the setup passcode and PBKDF parameters.
    ///
    /// Deterministic: the same inputs always produce the same verifier.
    ///
    /// # Example
    ///
    /// ```
    /// use pase_crypto::Spake2pVerifier;
    ///
    /// let salt = b"SPAKE2P Key Salt";
    /// let a = Spake2pVerifier::generate(20202021, salt, 1000).unwrap();
    /// let b = Spake2pVerifier::generate(20202021, salt, 1000).unwrap();
    /// assert_eq!(a.serialize(), b.serialize());
    /// ```
    pub fn generate(passcode: u32, salt: &[u8], iterations: u32) -> Result<Self> {
        let ws = compute_ws(passcode, salt, iterations)?;

        let w0 = scalar_from_ws(&ws[..SPAKE2P_WS_LENGTH]);
        let w1 = Zeroizing::new(scalar_from_ws(&ws[SPAKE2P_WS_LENGTH..]));

        let l_point = (ProjectivePoint::GENERATOR * *w1).to_affine();
        let mut l = Zeroizing::new([0u8; P256_POINT_LENGTH]);
        l.copy_from_slice(l_point.to_encoded_point(false).as_bytes());

        let mut w0_bytes = Zeroizing::new([0u8; P256_FE_LENGTH]);
        w0_bytes.copy_from_slice(&w0.to_bytes());

        Ok(Self { w0: w0_bytes, l })
    }

    /// Build a verifier from raw `w0` and `L` bytes.
    pub fn from_parts(w0: [u8; P256_FE_LENGTH], l: [u8; P256_POINT_LENGTH]) -> Self {
        Self {
            w0: Zeroizing::new(w0),
            l: Zeroizing::new(l),
        }
    }

    /// The `w0` scalar, big-endian.
    pub fn w0(&self) -> &[u8; P256_FE_LENGTH] {
        &self.w0
    }

    /// The `L` point, uncompressed SEC1.
    pub fn l(&self) -> &[u8; P256_POINT_LENGTH] {
        &self.l
    }

    /// Serialize as `w0 || L`.
    pub fn serialize(&self) -> Zeroizing<[u8; SPAKE2P_VERIFIER_SERIALIZED_LENGTH]> {
        let mut out = Zeroizing::new([0u8; SPAKE2P_VERIFIER_SERIALIZED_LENGTH]);
        out[..P256_FE_LENGTH].copy_from_slice(self.w0.as_ref());
        out[P256_FE_LENGTH..].copy_from_slice(&self.l[..]);
        out
    }

    /// Deserialize from `w0 || L`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidLength`] unless `bytes` is exactly
    /// [`SPAKE2P_VERIFIER_SERIALIZED_LENGTH`] long. Curve validation happens
    /// when the verifier is loaded into [`crate::Spake2p::begin_verifier`].
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SPAKE2P_VERIFIER_SERIALIZED_LENGTH {
            return Err(Error::InvalidLength {
                expected: SPAKE2P_VERIFIER_SERIALIZED_LENGTH,
                actual: bytes.len(),
            });
        }

        let mut w0 = Zeroizing::new([0u8; P256_FE_LENGTH]);
        w0.copy_from_slice(&bytes[..P256_FE_LENGTH]);
        let mut l = Zeroizing::new([0u8; P256_POINT_LENGTH]);
        l.copy_from_slice(&bytes[P256_FE_LENGTH..]);

        Ok(Self { w0, l })
    }
}

impl Zeroize for Spake2pVerifier {
    fn zeroize(&mut self) {
        self.w0.zeroize();
        self.l.zeroize();
    }
}

impl ZeroizeOnDrop for Spake2pVerifier {}

impl fmt::Debug for Spake2pVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spake2pVerifier").finish_non_exhaustive()
    }
}
