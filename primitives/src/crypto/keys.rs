//! Key derivation for shielded transactions
//!
//! Implements the Sapling key hierarchy:
//! - SpendingKey (sk): Master secret, can spend funds
//! - ExpandedSpendingKey (ask, nsk, ovk): Secrets the builder signs and proves with
//! - FullViewingKey (ak, nk, ovk): Can view all transactions, derive addresses
//! - IncomingViewingKey (ivk): Can detect incoming payments
//! - OutgoingViewingKey (ovk): Can decrypt outgoing transaction details
//! - Diversifier (d): Creates multiple addresses from same key

use blake2b_simd::Params as Blake2bParams;
use blake2s_simd::Params as Blake2sParams;
use group::cofactor::CofactorGroup;
use group::{Group, GroupEncoding};
use jubjub::{AffinePoint, ExtendedPoint, Fr, SubgroupPoint};
use rand_core::RngCore;

use super::pedersen::{proof_generation_key_generator, spending_key_generator};

/// Domain separators (Sapling-compatible)
const PRF_EXPAND_PERSONALIZATION: &[u8; 16] = b"Zcash_ExpandSeed";
const CRH_IVK_PERSONALIZATION: &[u8; 8] = b"Zcashivk";
const DIVERSIFIER_PERSONALIZATION: &[u8; 8] = b"Zcash_gd";

/// Number of diversifier indices tried when looking for a default address
const MAX_DIVERSIFIER_SEARCH: u64 = 1_000;

fn prf_expand(sk: &[u8; 32], domain: u8) -> [u8; 64] {
    let hash = Blake2bParams::new()
        .hash_length(64)
        .personal(PRF_EXPAND_PERSONALIZATION)
        .to_state()
        .update(sk)
        .update(&[domain])
        .finalize();

    let mut result = [0u8; 64];
    result.copy_from_slice(hash.as_bytes());
    result
}

/// Spending key - the master secret that controls funds
#[derive(Clone)]
pub struct SpendingKey {
    sk: [u8; 32],
}

impl SpendingKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { sk: bytes }
    }

    /// Generate a random spending key
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        let mut sk = [0u8; 32];
        rng.fill_bytes(&mut sk);
        Self { sk }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.sk
    }

    /// Expand into (ask, nsk, ovk)
    pub fn expanded_spending_key(&self) -> ExpandedSpendingKey {
        let ask = Fr::from_bytes_wide(&prf_expand(&self.sk, 0x00));
        let nsk = Fr::from_bytes_wide(&prf_expand(&self.sk, 0x01));

        let mut ovk = [0u8; 32];
        ovk.copy_from_slice(&prf_expand(&self.sk, 0x02)[..32]);

        ExpandedSpendingKey {
            ask,
            nsk,
            ovk: OutgoingViewingKey(ovk),
        }
    }

    pub fn full_viewing_key(&self) -> FullViewingKey {
        self.expanded_spending_key().full_viewing_key()
    }

    /// First valid diversified address, searching diversifier indices from 0
    pub fn default_address(&self) -> Option<PaymentAddress> {
        self.full_viewing_key().in_viewing_key().default_address()
    }
}

/// The secrets used to authorize spends and derive nullifiers
#[derive(Clone)]
pub struct ExpandedSpendingKey {
    /// Spend authorizing key
    pub ask: Fr,
    /// Nullifier secret key
    pub nsk: Fr,
    pub ovk: OutgoingViewingKey,
}

impl ExpandedSpendingKey {
    pub fn proof_generation_key(&self) -> ProofGenerationKey {
        ProofGenerationKey {
            ak: spending_key_generator() * self.ask,
            nsk: self.nsk,
        }
    }

    pub fn full_viewing_key(&self) -> FullViewingKey {
        self.proof_generation_key().to_viewing_key(self.ovk)
    }
}

/// What a prover needs to build a spend proof without the ability to sign
#[derive(Clone)]
pub struct ProofGenerationKey {
    pub ak: SubgroupPoint,
    pub nsk: Fr,
}

impl ProofGenerationKey {
    pub fn nk(&self) -> SubgroupPoint {
        proof_generation_key_generator() * self.nsk
    }

    pub fn to_viewing_key(&self, ovk: OutgoingViewingKey) -> FullViewingKey {
        FullViewingKey {
            ak: self.ak,
            nk: self.nk(),
            ovk,
        }
    }
}

/// Full viewing key - can view all transactions and derive addresses
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FullViewingKey {
    /// Spend authorizing key (public point)
    pub ak: SubgroupPoint,
    /// Nullifier deriving key (public point)
    pub nk: SubgroupPoint,
    pub ovk: OutgoingViewingKey,
}

impl FullViewingKey {
    /// ivk = CRH_ivk(ak, nk), truncated to 251 bits
    pub fn in_viewing_key(&self) -> IncomingViewingKey {
        let hash = Blake2sParams::new()
            .hash_length(32)
            .personal(CRH_IVK_PERSONALIZATION)
            .to_state()
            .update(&self.ak.to_bytes())
            .update(&self.nk.to_bytes())
            .finalize();

        let mut ivk = [0u8; 32];
        ivk.copy_from_slice(hash.as_bytes());
        ivk[31] &= 0b0000_0111;

        // 251-bit values are below the scalar modulus, so the wide reduction is exact
        IncomingViewingKey(Fr::from_bytes_wide(&widen(&ivk)))
    }

    pub fn nk_bytes(&self) -> [u8; 32] {
        self.nk.to_bytes()
    }
}

fn widen(bytes: &[u8; 32]) -> [u8; 64] {
    let mut wide = [0u8; 64];
    wide[..32].copy_from_slice(bytes);
    wide
}

/// Incoming viewing key - can detect incoming payments
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IncomingViewingKey(pub Fr);

impl IncomingViewingKey {
    /// Derive payment address from diversifier
    pub fn to_payment_address(&self, diversifier: Diversifier) -> Option<PaymentAddress> {
        let g_d = diversifier.g_d()?;
        // pk_d = ivk * g_d
        let pk_d = g_d * self.0;

        if bool::from(pk_d.is_identity()) {
            return None;
        }

        Some(PaymentAddress {
            diversifier,
            pk_d,
            g_d,
        })
    }

    pub fn default_address(&self) -> Option<PaymentAddress> {
        (0..MAX_DIVERSIFIER_SEARCH).find_map(|index| self.to_payment_address(Diversifier::from_index(index)))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        Option::from(Fr::from_bytes(bytes)).map(Self)
    }
}

/// Outgoing viewing key - can decrypt outgoing notes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutgoingViewingKey(pub [u8; 32]);

/// Diversifier for creating multiple addresses from same key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Diversifier(pub [u8; 11]);

impl Diversifier {
    /// Diversifier whose low bytes encode `index`
    pub fn from_index(index: u64) -> Self {
        let mut d = [0u8; 11];
        d[..8].copy_from_slice(&index.to_le_bytes());
        Self(d)
    }

    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        let mut d = [0u8; 11];
        rng.fill_bytes(&mut d);
        Self(d)
    }

    /// Hash diversifier to its base point g_d.
    ///
    /// Roughly half of all diversifiers have no valid base point and yield `None`.
    pub fn g_d(&self) -> Option<SubgroupPoint> {
        let hash = Blake2sParams::new()
            .hash_length(32)
            .personal(DIVERSIFIER_PERSONALIZATION)
            .to_state()
            .update(&self.0)
            .finalize();

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(hash.as_bytes());

        let point: Option<AffinePoint> = AffinePoint::from_bytes(bytes).into();
        let g_d = ExtendedPoint::from(point?).clear_cofactor();
        if bool::from(g_d.is_identity()) {
            None
        } else {
            Some(g_d)
        }
    }
}

/// Payment address (diversifier + pk_d)
///
/// Construction checks that the diversifier has a base point, so every
/// address can receive notes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaymentAddress {
    diversifier: Diversifier,
    pk_d: SubgroupPoint,
    g_d: SubgroupPoint,
}

impl PaymentAddress {
    pub fn from_parts(diversifier: Diversifier, pk_d: SubgroupPoint) -> Option<Self> {
        let g_d = diversifier.g_d()?;
        if bool::from(pk_d.is_identity()) {
            return None;
        }
        Some(Self {
            diversifier,
            pk_d,
            g_d,
        })
    }

    pub fn diversifier(&self) -> Diversifier {
        self.diversifier
    }

    /// The diversified transmission key
    pub fn pk_d(&self) -> &SubgroupPoint {
        &self.pk_d
    }

    pub fn g_d(&self) -> &SubgroupPoint {
        &self.g_d
    }

    /// Serialize to 43 bytes (11 + 32)
    pub fn to_bytes(&self) -> [u8; 43] {
        let mut bytes = [0u8; 43];
        bytes[..11].copy_from_slice(&self.diversifier.0);
        bytes[11..].copy_from_slice(&self.pk_d.to_bytes());
        bytes
    }

    /// Deserialize from 43 bytes
    pub fn from_bytes(bytes: &[u8; 43]) -> Option<Self> {
        let mut diversifier = [0u8; 11];
        diversifier.copy_from_slice(&bytes[..11]);

        let mut pk_d_bytes = [0u8; 32];
        pk_d_bytes.copy_from_slice(&bytes[11..]);
        let pk_d: Option<SubgroupPoint> = SubgroupPoint::from_bytes(&pk_d_bytes).into();

        Self::from_parts(Diversifier(diversifier), pk_d?)
    }
}
