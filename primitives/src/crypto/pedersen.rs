//! Pedersen commitments using the Jubjub curve
//!
//! Jubjub is an elliptic curve designed for use inside zk-SNARKs.
//! It's defined over the scalar field of BLS12-381.
//!
//! All fixed generators are nothing-up-my-sleeve points obtained by hashing a
//! tag to the curve, and are computed once per process.

use std::sync::OnceLock;

use blake2b_simd::Params as Blake2bParams;
use blake2s_simd::Params as Blake2sParams;
use group::cofactor::CofactorGroup;
use group::{Group, GroupEncoding};
use jubjub::{AffinePoint, ExtendedPoint, Fr, SubgroupPoint};

use crate::amount::Amount;

/// Domain separator for generator derivation
const GENERATOR_PERSONALIZATION: &[u8; 8] = b"Zcash_PH";

/// Domain separator for the note commitment message digest
const NOTE_COMMITMENT_PERSONALIZATION: &[u8; 16] = b"Zcash_NoteCommit";

static PROOF_GENERATION_KEY_GENERATOR: OnceLock<SubgroupPoint> = OnceLock::new();
static VALUE_COMMITMENT_VALUE_GENERATOR: OnceLock<SubgroupPoint> = OnceLock::new();
static VALUE_COMMITMENT_RANDOMNESS_GENERATOR: OnceLock<SubgroupPoint> = OnceLock::new();
static NOTE_COMMITMENT_GENERATOR: OnceLock<SubgroupPoint> = OnceLock::new();
static NOTE_COMMITMENT_RANDOMNESS_GENERATOR: OnceLock<SubgroupPoint> = OnceLock::new();

/// Hash bytes to a prime-order Jubjub point using try-and-increment
pub(crate) fn hash_to_point(tag: &[u8]) -> SubgroupPoint {
    for counter in 0u8..=255 {
        let hash = Blake2sParams::new()
            .hash_length(32)
            .personal(GENERATOR_PERSONALIZATION)
            .to_state()
            .update(tag)
            .update(&[counter])
            .finalize();

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(hash.as_bytes());

        let maybe_point: Option<AffinePoint> = AffinePoint::from_bytes(bytes).into();
        if let Some(point) = maybe_point {
            // Clear cofactor to get subgroup point
            let point = ExtendedPoint::from(point).clear_cofactor();
            if !bool::from(point.is_identity()) {
                return point;
            }
        }
    }

    // Unreachable in practice: every attempt succeeds with probability ~1/2
    SubgroupPoint::generator()
}

fn cached(cell: &'static OnceLock<SubgroupPoint>, tag: &[u8]) -> SubgroupPoint {
    *cell.get_or_init(|| hash_to_point(tag))
}

/// Base point for spend authorization keys (ak = ask * G)
pub fn spending_key_generator() -> SubgroupPoint {
    SubgroupPoint::generator()
}

/// Base point for nullifier deriving keys (nk = nsk * H)
pub fn proof_generation_key_generator() -> SubgroupPoint {
    cached(&PROOF_GENERATION_KEY_GENERATOR, b"Zcash_H_nk")
}

/// The value commitment value generator V
pub fn value_commitment_value_generator() -> SubgroupPoint {
    cached(&VALUE_COMMITMENT_VALUE_GENERATOR, b"Zcash_cv_v")
}

/// The value commitment randomness generator R, also the binding signature base
pub fn value_commitment_randomness_generator() -> SubgroupPoint {
    cached(&VALUE_COMMITMENT_RANDOMNESS_GENERATOR, b"Zcash_cv_r")
}

fn note_commitment_generator() -> SubgroupPoint {
    cached(&NOTE_COMMITMENT_GENERATOR, b"Zcash_NC_msg")
}

fn note_commitment_randomness_generator() -> SubgroupPoint {
    cached(&NOTE_COMMITMENT_RANDOMNESS_GENERATOR, b"Zcash_NC_rcm")
}

/// Signed amount as a Jubjub scalar
pub fn amount_to_scalar(amount: Amount) -> Fr {
    let magnitude = Fr::from(amount.unsigned_abs());
    if amount < 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// u-coordinate of a point, the canonical commitment encoding
pub(crate) fn extract_u(point: &SubgroupPoint) -> [u8; 32] {
    AffinePoint::from(ExtendedPoint::from(*point))
        .get_u()
        .to_bytes()
}

/// Note commitment
///
/// cm = Hash(g_d, pk_d, v) * G_nc + rcm * H_nc, encoded by its u-coordinate.
/// The same fields always produce the same commitment.
pub fn note_commitment(g_d: &SubgroupPoint, pk_d: &SubgroupPoint, value: u64, rcm: &Fr) -> [u8; 32] {
    let digest = Blake2bParams::new()
        .hash_length(64)
        .personal(NOTE_COMMITMENT_PERSONALIZATION)
        .to_state()
        .update(&g_d.to_bytes())
        .update(&pk_d.to_bytes())
        .update(&value.to_le_bytes())
        .finalize();

    let mut wide = [0u8; 64];
    wide.copy_from_slice(digest.as_bytes());

    let point = note_commitment_generator() * Fr::from_bytes_wide(&wide)
        + note_commitment_randomness_generator() * rcm;
    extract_u(&point)
}

/// Value commitment - Pedersen commitment to a note value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueCommitment(SubgroupPoint);

impl ValueCommitment {
    /// cv = value * V + rcv * R
    pub fn derive(value: u64, rcv: &Fr) -> Self {
        Self(value_commitment_value_generator() * Fr::from(value) + value_commitment_randomness_generator() * rcv)
    }

    pub fn identity() -> Self {
        Self(SubgroupPoint::identity())
    }

    pub fn from_point(point: SubgroupPoint) -> Self {
        Self(point)
    }

    pub fn as_point(&self) -> SubgroupPoint {
        self.0
    }

    /// Add two value commitments
    pub fn add(&self, other: &ValueCommitment) -> ValueCommitment {
        ValueCommitment(self.0 + other.0)
    }

    /// Subtract a value commitment
    pub fn sub(&self, other: &ValueCommitment) -> ValueCommitment {
        ValueCommitment(self.0 - other.0)
    }

    pub fn negate(&self) -> ValueCommitment {
        ValueCommitment(-self.0)
    }

    /// Serialize to 32 bytes (compressed point)
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Deserialize, rejecting points outside the prime-order subgroup
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        Option::from(SubgroupPoint::from_bytes(bytes)).map(Self)
    }

    /// valueBalance * V, the commitment to a public value with zero randomness
    pub fn balance(value_balance: Amount) -> Self {
        Self(value_commitment_value_generator() * amount_to_scalar(value_balance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ff::Field;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generators_are_distinct() {
        let gens = [
            spending_key_generator(),
            proof_generation_key_generator(),
            value_commitment_value_generator(),
            value_commitment_randomness_generator(),
            note_commitment_generator(),
            note_commitment_randomness_generator(),
        ];
        for (i, a) in gens.iter().enumerate() {
            assert!(!bool::from(a.is_identity()));
            for b in gens.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_value_commitment_homomorphism() {
        let mut rng = StdRng::seed_from_u64(7);
        let r1 = Fr::random(&mut rng);
        let r2 = Fr::random(&mut rng);

        let sum = ValueCommitment::derive(3, &r1).add(&ValueCommitment::derive(4, &r2));
        assert_eq!(sum, ValueCommitment::derive(7, &(r1 + r2)));

        let diff = ValueCommitment::derive(10, &r1).sub(&ValueCommitment::derive(4, &r2));
        let expected = ValueCommitment::balance(6)
            .add(&ValueCommitment::from_point(value_commitment_randomness_generator() * (r1 - r2)));
        assert_eq!(diff, expected);
    }

    #[test]
    fn test_negative_balance() {
        assert_eq!(ValueCommitment::balance(-5), ValueCommitment::balance(5).negate());
        assert_eq!(ValueCommitment::balance(0), ValueCommitment::identity());
    }

    #[test]
    fn test_value_commitment_encoding() {
        let mut rng = StdRng::seed_from_u64(8);
        let cv = ValueCommitment::derive(1_000, &Fr::random(&mut rng));
        assert_eq!(ValueCommitment::from_bytes(&cv.to_bytes()), Some(cv));
    }

    #[test]
    fn test_note_commitment_binds_fields() {
        let mut rng = StdRng::seed_from_u64(9);
        let g_d = hash_to_point(b"test g_d");
        let pk_d = g_d * Fr::random(&mut rng);
        let rcm = Fr::random(&mut rng);

        let cm = note_commitment(&g_d, &pk_d, 100, &rcm);
        assert_eq!(cm, note_commitment(&g_d, &pk_d, 100, &rcm));
        assert_ne!(cm, note_commitment(&g_d, &pk_d, 101, &rcm));
        assert_ne!(cm, note_commitment(&g_d, &pk_d, 100, &(rcm + Fr::ONE)));
    }
}
