//! SPAKE2+ over P-256 (RFC 9383 with the Matter M/N points).
//!
//! # Protocol Flow
//!
//! ```text
//! Prover (passcode)                       Verifier (w0, L)
//! -----------------                       ----------------
//! begin_prover(ctx, w0s||w1s)             begin_verifier(ctx, verifier)
//! X = compute_round_one(None)   ---X--->  Y = compute_round_one(Some(X))
//!                               <--Y,cB-  cB = compute_round_two(X)
//! cA = compute_round_two(Y)
//! key_confirm(cB)
//!                               ---cA-->  key_confirm(cA)
//! shared_key()                            shared_key()
//! ```
//!
//! Prover identity and verifier identity are empty, as in PASE.

use p256::elliptic_curve::ops::Reduce;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::elliptic_curve::{Field, PrimeField};
use p256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar, U256};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::kdf::{hkdf_sha256, hmac_sha256};
use crate::verifier::{Spake2pVerifier, SPAKE2P_WS_LENGTH};
use crate::{Error, Result};

/// P-256 scalar (field element) length in bytes.
pub const P256_FE_LENGTH: usize = 32;
/// Uncompressed SEC1 P-256 point length in bytes.
pub const P256_POINT_LENGTH: usize = 65;
/// SHA-256 output length; also the length of `cA` and `cB`.
pub const HASH_LENGTH: usize = 32;
/// Length of the shared secret `Ke`.
pub const KE_LENGTH: usize = 16;

const CONFIRMATION_KEYS_INFO: &[u8] = b"ConfirmationKeys";

/// Matter SPAKE2+ point M.
pub const SPAKE2P_M: [u8; P256_POINT_LENGTH] = [
    0x04, 0x88, 0x6e, 0x2f, 0x97, 0xac, 0xe4, 0x6e, 0x55, 0xba, 0x9d, 0xd7, 0x24, 0x25, 0x79, 0xf2,
    0x99, 0x3b, 0x64, 0xe1, 0x6e, 0xf3, 0xdc, 0xab, 0x95, 0xaf, 0xd4, 0x97, 0x33, 0x3d, 0x8f, 0xa1,
    0x2f, 0x5f, 0xf3, 0x55, 0x16, 0x3e, 0x43, 0xce, 0x22, 0x4e, 0x0b, 0x0e, 0x65, 0xff, 0x02, 0xac,
    0x8e, 0x5c, 0x7b, 0xe0, 0x94, 0x19, 0xc7, 0x85, 0xe0, 0xca, 0x54, 0x7d, 0x55, 0xa1, 0x2e, 0x2d,
    0x20,
];

/// Matter SPAKE2+ point N.
pub const SPAKE2P_N: [u8; P256_POINT_LENGTH] = [
    0x04, 0xd8, 0xbb, 0xd6, 0xc6, 0x39, 0xc6, 0x29, 0x37, 0xb0, 0x4d, 0x99, 0x7f, 0x38, 0xc3, 0x77,
    0x07, 0x19, 0xc6, 0x29, 0xd7, 0x01, 0x4d, 0x49, 0xa2, 0x4b, 0x4f, 0x98, 0xba, 0xa1, 0x29, 0x2b,
    0x49, 0x07, 0xd6, 0x0a, 0xa6, 0xbf, 0xad, 0xe4, 0x50, 0x08, 0xa6, 0x36, 0x33, 0x7f, 0x51, 0x68,
    0xc6, 0x4d, 0x9b, 0xd3, 0x60, 0x34, 0x80, 0x8c, 0xd5, 0x64, 0x49, 0x0b, 0x1e, 0x65, 0x6e, 0xdb,
    0xe7,
];

/// Reduce a 40-byte big-endian `w0s`/`w1s` value modulo the group order.
///
/// The value is split as `hi * 2^256 + lo` with `hi` the leading 8 bytes.
pub(crate) fn scalar_from_ws(ws: &[u8]) -> Scalar {
    debug_assert_eq!(ws.len(), SPAKE2P_WS_LENGTH);
    let (hi, lo) = ws.split_at(ws.len() - P256_FE_LENGTH);

    let mut hi_bytes = Zeroizing::new([0u8; 8]);
    hi_bytes[8 - hi.len()..].copy_from_slice(hi);

    let two_64 = Scalar::from(u64::MAX) + Scalar::ONE;
    let two_256 = two_64.square().square();

    let hi = Scalar::from(u64::from_be_bytes(*hi_bytes));
    let lo = <Scalar as Reduce<U256>>::reduce_bytes(FieldBytes::from_slice(lo));
    hi * two_256 + lo
}

fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint> {
    if bytes.len() != P256_POINT_LENGTH {
        return Err(Error::InvalidLength {
            expected: P256_POINT_LENGTH,
            actual: bytes.len(),
        });
    }
    if bytes[0] != 0x04 {
        return Err(Error::InvalidPoint("expected uncompressed encoding".into()));
    }

    let encoded = EncodedPoint::from_bytes(bytes)
        .map_err(|_| Error::InvalidPoint("malformed SEC1 encoding".into()))?;
    Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .map(ProjectivePoint::from)
        .ok_or_else(|| Error::InvalidPoint("not on curve".into()))
}

fn encode_point(point: &ProjectivePoint) -> Result<[u8; P256_POINT_LENGTH]> {
    let encoded = point.to_affine().to_encoded_point(false);
    let bytes = encoded.as_bytes();
    if bytes.len() != P256_POINT_LENGTH {
        // Only the identity encodes shorter
        return Err(Error::InvalidPoint("identity element".into()));
    }

    let mut out = [0u8; P256_POINT_LENGTH];
    out.copy_from_slice(bytes);
    Ok(out)
}

fn add_to_tt(tt: &mut Sha256, item: &[u8]) {
    tt.update((item.len() as u64).to_le_bytes());
    tt.update(item);
}

/// SPAKE2+ role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spake2pRole {
    /// Holds the passcode-derived `w0`, `w1` (PASE initiator).
    Prover,
    /// Holds the verifier `w0`, `L` (PASE responder).
    Verifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Started,
    RoundOne,
    RoundTwo,
    Confirmed,
}

enum Secret {
    Prover { w1: Scalar },
    Verifier { l: ProjectivePoint },
}

/// One SPAKE2+ exchange in either role.
///
/// All scalars and derived keys are wiped on drop.
pub struct Spake2p {
    role: Spake2pRole,
    state: State,
    context: [u8; HASH_LENGTH],
    w0: Scalar,
    secret: Secret,
    xy: Scalar,
    x: [u8; P256_POINT_LENGTH],
    y: [u8; P256_POINT_LENGTH],
    peer_confirmation: Zeroizing<[u8; HASH_LENGTH]>,
    ke: Zeroizing<[u8; KE_LENGTH]>,
}

impl Spake2p {
    fn new(role: Spake2pRole, context: &[u8; HASH_LENGTH], w0: Scalar, secret: Secret) -> Self {
        Self {
            role,
            state: State::Started,
            context: *context,
            w0,
            secret,
            xy: Scalar::ZERO,
            x: [0u8; P256_POINT_LENGTH],
            y: [0u8; P256_POINT_LENGTH],
            peer_confirmation: Zeroizing::new([0u8; HASH_LENGTH]),
            ke: Zeroizing::new([0u8; KE_LENGTH]),
        }
    }

    /// Start the prover role from `w0s || w1s` (see [`crate::compute_ws`]).
    pub fn begin_prover(context: &[u8; HASH_LENGTH], ws: &[u8]) -> Result<Self> {
        if ws.len() != 2 * SPAKE2P_WS_LENGTH {
            return Err(Error::InvalidLength {
                expected: 2 * SPAKE2P_WS_LENGTH,
                actual: ws.len(),
            });
        }

        let w0 = scalar_from_ws(&ws[..SPAKE2P_WS_LENGTH]);
        let w1 = scalar_from_ws(&ws[SPAKE2P_WS_LENGTH..]);
        Ok(Self::new(Spake2pRole::Prover, context, w0, Secret::Prover { w1 }))
    }

    /// Start the verifier role from a stored verifier.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidScalar`] if `w0` is not a canonical scalar,
    /// [`Error::InvalidPoint`] if `L` is not a curve point.
    pub fn begin_verifier(context: &[u8; HASH_LENGTH], verifier: &Spake2pVerifier) -> Result<Self> {
        let w0 = Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(verifier.w0())))
            .ok_or_else(|| Error::InvalidScalar("w0 is not reduced".into()))?;
        let l = decode_point(verifier.l())?;

        Ok(Self::new(
            Spake2pRole::Verifier,
            context,
            w0,
            Secret::Verifier { l },
        ))
    }

    /// Role this instance was started in.
    pub fn role(&self) -> Spake2pRole {
        self.role
    }

    /// Produce this side's share.
    ///
    /// The prover passes `None` and receives `X`. The verifier passes the
    /// peer's `X` and receives `Y`.
    pub fn compute_round_one(&mut self, peer: Option<&[u8]>) -> Result<[u8; P256_POINT_LENGTH]> {
        self.compute_round_one_with(peer, Scalar::random(&mut OsRng))
    }

    fn compute_round_one_with(
        &mut self,
        peer: Option<&[u8]>,
        xy: Scalar,
    ) -> Result<[u8; P256_POINT_LENGTH]> {
        if self.state != State::Started {
            return Err(Error::InvalidState("round one already computed"));
        }

        let own = match (self.role, peer) {
            (Spake2pRole::Prover, None) => {
                let m = decode_point(&SPAKE2P_M)?;
                let x = encode_point(&(ProjectivePoint::GENERATOR * xy + m * self.w0))?;
                self.x = x;
                x
            }
            (Spake2pRole::Verifier, Some(peer_x)) => {
                decode_point(peer_x)?;
                let n = decode_point(&SPAKE2P_N)?;
                let y = encode_point(&(ProjectivePoint::GENERATOR * xy + n * self.w0))?;
                self.x.copy_from_slice(peer_x);
                self.y = y;
                y
            }
            (Spake2pRole::Prover, Some(_)) => {
                return Err(Error::InvalidState("prover round one takes no peer share"))
            }
            (Spake2pRole::Verifier, None) => {
                return Err(Error::InvalidState("verifier round one needs the prover share"))
            }
        };

        self.xy = xy;
        self.state = State::RoundOne;
        Ok(own)
    }

    /// Derive the shared secrets and return this side's confirmation.
    ///
    /// The prover passes `Y` and receives `cA`. The verifier passes `X`
    /// (the same value given to round one) and receives `cB`.
    pub fn compute_round_two(&mut self, peer: &[u8]) -> Result<[u8; HASH_LENGTH]> {
        if self.state != State::RoundOne {
            return Err(Error::InvalidState("round two requires round one"));
        }

        let (z, v) = match &self.secret {
            Secret::Prover { w1 } => {
                let y = decode_point(peer)?;
                let n = decode_point(&SPAKE2P_N)?;
                let base = y - n * self.w0;
                self.y.copy_from_slice(peer);
                (base * self.xy, base * *w1)
            }
            Secret::Verifier { l } => {
                if !bool::from(peer.ct_eq(&self.x[..])) {
                    return Err(Error::InvalidPoint("share differs from round one".into()));
                }
                let x = decode_point(peer)?;
                let m = decode_point(&SPAKE2P_M)?;
                ((x - m * self.w0) * self.xy, *l * self.xy)
            }
        };
        let z = Zeroizing::new(encode_point(&z)?);
        let v = Zeroizing::new(encode_point(&v)?);

        let mut tt = Sha256::new();
        add_to_tt(&mut tt, &self.context);
        add_to_tt(&mut tt, &[]);
        add_to_tt(&mut tt, &[]);
        add_to_tt(&mut tt, &SPAKE2P_M);
        add_to_tt(&mut tt, &SPAKE2P_N);
        add_to_tt(&mut tt, &self.x);
        add_to_tt(&mut tt, &self.y);
        add_to_tt(&mut tt, z.as_ref());
        add_to_tt(&mut tt, v.as_ref());
        add_to_tt(&mut tt, &self.w0.to_bytes());

        let mut ka_ke = Zeroizing::new([0u8; HASH_LENGTH]);
        ka_ke.copy_from_slice(&tt.finalize());
        let (ka, ke) = ka_ke.split_at(HASH_LENGTH / 2);
        self.ke.copy_from_slice(ke);

        let kc = hkdf_sha256(ka, &[], CONFIRMATION_KEYS_INFO, HASH_LENGTH)?;
        let (kca, kcb) = kc.split_at(HASH_LENGTH / 2);

        let own = match self.role {
            Spake2pRole::Prover => {
                *self.peer_confirmation = hmac_sha256(kcb, &self.x)?;
                hmac_sha256(kca, &self.y)?
            }
            Spake2pRole::Verifier => {
                *self.peer_confirmation = hmac_sha256(kca, &self.y)?;
                hmac_sha256(kcb, &self.x)?
            }
        };

        self.state = State::RoundTwo;
        Ok(own)
    }

    /// Check the peer's confirmation value in constant time.
    pub fn key_confirm(&mut self, peer_confirmation: &[u8]) -> Result<()> {
        if self.state != State::RoundTwo {
            return Err(Error::InvalidState("key confirmation requires round two"));
        }

        if !bool::from(self.peer_confirmation.as_slice().ct_eq(peer_confirmation)) {
            return Err(Error::ConfirmationFailed);
        }

        self.state = State::Confirmed;
        Ok(())
    }

    /// The shared secret `Ke`, available once the peer is confirmed.
    pub fn shared_key(&self) -> Result<&[u8; KE_LENGTH]> {
        if self.state != State::Confirmed {
            return Err(Error::InvalidState("peer not confirmed"));
        }
        Ok(&self.ke)
    }
}

impl Spake2p {
    fn wipe(&mut self) {
        self.w0.zeroize();
        self.xy.zeroize();
        match &mut self.secret {
            Secret::Prover { w1 } => w1.zeroize(),
            // resets to the identity
            Secret::Verifier { l } => l.zeroize(),
        }
    }
}

impl Drop for Spake2p {
    fn drop(&mut self) {
        self.wipe();
    }
}
