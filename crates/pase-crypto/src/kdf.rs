//! Key derivation functions (PBKDF2, HKDF and HMAC over SHA-256).
//!
//! Implements the derivations used by PASE:
//! - PBKDF2-HMAC-SHA256 stretching of the setup passcode into `w0s || w1s`
//! - HKDF-SHA256 for the SPAKE2+ confirmation keys and the session keys
//! - HMAC-SHA256 for the SPAKE2+ confirmation values

use crate::{Error, Result};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Length of each derived session key in bytes.
pub const SESSION_KEY_LENGTH: usize = 16;

/// HKDF info string for the PASE session keys.
pub const SESSION_KEYS_INFO: &[u8] = b"SessionKeys";

/// Generic HKDF-SHA256 key derivation per RFC 5869.
///
/// # Arguments
/// * `ikm` - Input key material
/// * `salt` - Salt value (empty slice for no salt)
/// * `info` - Context and application-specific information
/// * `output_len` - Length of output key material
///
/// # Returns
/// Derived key material wrapped in `Zeroizing`.
///
/// # Example
/// ```
/// use pase_crypto::kdf::hkdf_sha256;
///
/// let ikm = &[0x0b; 22];
/// let salt = &hex::decode("000102030405060708090a0b0c").unwrap();
/// let info = &hex::decode("f0f1f2f3f4f5f6f7f8f9").unwrap();
///
/// let okm = hkdf_sha256(ikm, salt, info, 42).unwrap();
/// assert_eq!(okm.len(), 42);
/// ```
pub fn hkdf_sha256(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);

    let mut okm = Zeroizing::new(vec![0u8; output_len]);
    hk.expand(info, &mut okm)
        .map_err(|_| Error::KeyDerivation("HKDF expansion failed".into()))?;

    Ok(okm)
}

/// HMAC-SHA256 over `data` with `key`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32]> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| Error::KeyDerivation("HMAC key rejected".into()))?;
    mac.update(data);

    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// PBKDF2-HMAC-SHA256 filling `output`.
///
/// Callers validate the iteration count and salt length before calling.
pub fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32, output: &mut [u8]) {
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, output);
}

/// Keys derived from the SPAKE2+ shared secret `Ke`.
pub struct DerivedSessionKeys {
    /// Initiator-to-responder encryption key.
    pub i2r_key: Zeroizing<[u8; SESSION_KEY_LENGTH]>,
    /// Responder-to-initiator encryption key.
    pub r2i_key: Zeroizing<[u8; SESSION_KEY_LENGTH]>,
    /// Attestation challenge used later during commissioning.
    pub attestation_challenge: Zeroizing<[u8; SESSION_KEY_LENGTH]>,
}

/// Derive the PASE session keys from `Ke`.
///
/// Uses HKDF-SHA256 with:
/// - IKM: Ke
/// - Salt: none
/// - Info: "SessionKeys"
/// - Length: 48 bytes, split as I2RKey || R2IKey || AttestationChallenge
pub fn derive_session_keys(ke: &[u8]) -> Result<DerivedSessionKeys> {
    let okm = hkdf_sha256(ke, &[], SESSION_KEYS_INFO, 3 * SESSION_KEY_LENGTH)?;

    let mut i2r_key = Zeroizing::new([0u8; SESSION_KEY_LENGTH]);
    let mut r2i_key = Zeroizing::new([0u8; SESSION_KEY_LENGTH]);
    let mut attestation_challenge = Zeroizing::new([0u8; SESSION_KEY_LENGTH]);
    i2r_key.copy_from_slice(&okm[0..16]);
    r2i_key.copy_from_slice(&okm[16..32]);
    attestation_challenge.copy_from_slice(&okm[32..48]);

    Ok(DerivedSessionKeys {
        i2r_key,
        r2i_key,
        attestation_challenge,
    })
}
