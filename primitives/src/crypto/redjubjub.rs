//! RedJubjub signatures
//!
//! Schnorr signatures over Jubjub with a caller-chosen base point. Spend
//! authorization signatures use the spending key generator; binding
//! signatures use the value commitment randomness generator.

use blake2b_simd::Params as Blake2bParams;
use group::GroupEncoding;
use jubjub::{Fr, SubgroupPoint};
use rand_core::RngCore;

use crate::SIGNATURE_SIZE;

const H_STAR_PERSONALIZATION: &[u8; 16] = b"Zcash_RedJubjubH";

/// H*(a || b || c) reduced to a scalar
fn h_star(a: &[u8], b: &[u8], c: &[u8]) -> Fr {
    let hash = Blake2bParams::new()
        .hash_length(64)
        .personal(H_STAR_PERSONALIZATION)
        .to_state()
        .update(a)
        .update(b)
        .update(c)
        .finalize();

    let mut wide = [0u8; 64];
    wide.copy_from_slice(hash.as_bytes());
    Fr::from_bytes_wide(&wide)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    rbar: [u8; 32],
    sbar: [u8; 32],
}

impl Signature {
    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes[..32].copy_from_slice(&self.rbar);
        bytes[32..].copy_from_slice(&self.sbar);
        bytes
    }

    pub fn from_bytes(bytes: &[u8; SIGNATURE_SIZE]) -> Self {
        let mut rbar = [0u8; 32];
        let mut sbar = [0u8; 32];
        rbar.copy_from_slice(&bytes[..32]);
        sbar.copy_from_slice(&bytes[32..]);
        Self { rbar, sbar }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PrivateKey(pub Fr);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(pub SubgroupPoint);

impl PrivateKey {
    /// rsk = sk + alpha
    pub fn randomize(&self, alpha: &Fr) -> PrivateKey {
        PrivateKey(self.0 + alpha)
    }

    pub fn sign<R: RngCore>(&self, msg: &[u8], rng: &mut R, base: SubgroupPoint) -> Signature {
        let vk = PublicKey::from_private(self, base).to_bytes();

        let mut t = [0u8; 80];
        rng.fill_bytes(&mut t);
        let r = h_star(&t, &vk, msg);

        let rbar = (base * r).to_bytes();
        let s = r + h_star(&rbar, &vk, msg) * self.0;

        Signature {
            rbar,
            sbar: s.to_bytes(),
        }
    }
}

impl PublicKey {
    pub fn from_private(privkey: &PrivateKey, base: SubgroupPoint) -> Self {
        PublicKey(base * privkey.0)
    }

    /// rk = vk + alpha * base
    pub fn randomize(&self, alpha: &Fr, base: SubgroupPoint) -> Self {
        PublicKey(self.0 + base * alpha)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        Option::from(SubgroupPoint::from_bytes(bytes)).map(PublicKey)
    }

    /// Check S * base == R + H*(R || vk || msg) * vk
    pub fn verify(&self, msg: &[u8], sig: &Signature, base: SubgroupPoint) -> bool {
        let r: Option<SubgroupPoint> = SubgroupPoint::from_bytes(&sig.rbar).into();
        let s: Option<Fr> = Fr::from_bytes(&sig.sbar).into();
        let (r, s) = match (r, s) {
            (Some(r), Some(s)) => (r, s),
            _ => return false,
        };

        let c = h_star(&sig.rbar, &self.to_bytes(), msg);
        base * s == r + self.0 * c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::pedersen::{spending_key_generator, value_commitment_randomness_generator};
    use ff::Field;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sign_verify() {
        let mut rng = StdRng::seed_from_u64(1);
        let base = spending_key_generator();
        let sk = PrivateKey(Fr::random(&mut rng));
        let vk = PublicKey::from_private(&sk, base);

        let sig = sk.sign(b"message", &mut rng, base);
        assert!(vk.verify(b"message", &sig, base));
        assert!(!vk.verify(b"other message", &sig, base));
        assert!(!vk.verify(b"message", &sig, value_commitment_randomness_generator()));
    }

    #[test]
    fn test_randomized_keys_agree() {
        let mut rng = StdRng::seed_from_u64(2);
        let base = spending_key_generator();
        let ask = PrivateKey(Fr::random(&mut rng));
        let ak = PublicKey::from_private(&ask, base);
        let alpha = Fr::random(&mut rng);

        let rsk = ask.randomize(&alpha);
        let rk = ak.randomize(&alpha, base);
        assert_eq!(PublicKey::from_private(&rsk, base), rk);

        let sig = rsk.sign(b"sighash", &mut rng, base);
        assert!(rk.verify(b"sighash", &sig, base));
        assert!(!ak.verify(b"sighash", &sig, base));
    }

    #[test]
    fn test_signature_encoding() {
        let mut rng = StdRng::seed_from_u64(3);
        let base = spending_key_generator();
        let sk = PrivateKey(Fr::random(&mut rng));
        let sig = sk.sign(b"m", &mut rng, base);
        assert_eq!(Signature::from_bytes(&sig.to_bytes()), sig);

        let mut corrupted = sig.to_bytes();
        corrupted[40] ^= 1;
        let vk = PublicKey::from_private(&sk, base);
        assert!(!vk.verify(b"m", &Signature::from_bytes(&corrupted), base));
    }
}
