//! Sapling proof generation boundary
//!
//! The builder hands note data to a [`TxProver`] and gets back value
//! commitments, randomized keys and 192-byte Groth16-shaped proofs. The
//! prover also owns the running binding-signature key, accumulated in its
//! proving context while proofs are generated.
//!
//! [`MockTxProver`] runs no circuit. It computes the real commitments, keys
//! and signatures, checks the statements a circuit would enforce (the witness
//! reaches the anchor, the key owns the note) and emits a deterministic
//! transcript encoded as a Groth16 proof (A ∈ G1, B ∈ G2, C ∈ G1).

use blake2b_simd::Params as Blake2bParams;
use bls12_381::{G1Affine, G1Projective, G2Affine, G2Projective, Scalar};
use ff::Field;
use group::GroupEncoding;
use jubjub::Fr;
use rand_core::OsRng;
use thiserror::Error;

use sapling_primitives::crypto::pedersen::{
    spending_key_generator, value_commitment_randomness_generator,
};
use sapling_primitives::crypto::{
    Diversifier, Note, OutgoingViewingKey, PaymentAddress, PrivateKey, ProofGenerationKey,
    PublicKey, Signature, ValueCommitment,
};
use sapling_primitives::{Amount, MerklePath, GROTH_PROOF_SIZE};

const PROOF_TRANSCRIPT_PERSONALIZATION: &[u8; 16] = b"Sapling_MockPrf_";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProverError {
    #[error("Invalid diversifier")]
    InvalidDiversifier,

    #[error("Witness does not authenticate the note against the anchor")]
    WitnessMismatch,

    #[error("Binding verification key does not match the accumulated commitments")]
    BindingSignatureMismatch,

    #[error("Proving backend failure: {0}")]
    Backend(String),
}

/// Result of generating a spend proof
#[derive(Clone, Debug)]
pub struct SpendProof {
    pub cv: ValueCommitment,
    /// Randomized verification key: ak + alpha * G
    pub rk: PublicKey,
    pub zkproof: [u8; GROTH_PROOF_SIZE],
}

/// Result of generating an output proof
#[derive(Clone, Debug)]
pub struct OutputProof {
    pub cv: ValueCommitment,
    pub zkproof: [u8; GROTH_PROOF_SIZE],
}

/// Proving backend used by the builder.
///
/// A context is created per transaction; every proof generated for that
/// transaction goes through it so the binding signature can be produced at
/// the end.
pub trait TxProver {
    type Context;

    fn new_sapling_proving_context(&self) -> Self::Context;

    #[allow(clippy::too_many_arguments)]
    fn spend_proof(
        &self,
        ctx: &mut Self::Context,
        proof_generation_key: ProofGenerationKey,
        diversifier: Diversifier,
        rcm: &Fr,
        alpha: &Fr,
        value: u64,
        anchor: &[u8; 32],
        witness: &MerklePath,
    ) -> Result<SpendProof, ProverError>;

    fn output_proof(
        &self,
        ctx: &mut Self::Context,
        esk: &Fr,
        to: &PaymentAddress,
        rcm: &Fr,
        value: u64,
    ) -> Result<OutputProof, ProverError>;

    /// Spend authorization signature under rsk = ask + alpha
    fn spend_sig(&self, ask: &Fr, alpha: &Fr, sighash: &[u8; 32]) -> Result<Signature, ProverError> {
        let rsk = PrivateKey(*ask).randomize(alpha);
        Ok(rsk.sign(sighash, &mut OsRng, spending_key_generator()))
    }

    fn binding_sig(
        &self,
        ctx: &mut Self::Context,
        value_balance: Amount,
        sighash: &[u8; 32],
    ) -> Result<Signature, ProverError>;
}

/// Running sums over the proofs of one transaction
#[derive(Clone, Debug)]
pub struct SaplingProvingContext {
    /// Sum of spend rcv minus sum of output rcv
    bsk: Fr,
    /// Sum of spend cv minus sum of output cv
    cv_sum: ValueCommitment,
}

impl Default for SaplingProvingContext {
    fn default() -> Self {
        Self {
            bsk: Fr::ZERO,
            cv_sum: ValueCommitment::identity(),
        }
    }
}

impl SaplingProvingContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Circuit-free prover for tests and tooling
#[derive(Clone, Debug, Default)]
pub struct MockTxProver {
    reject: bool,
}

impl MockTxProver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A prover whose every proof fails
    pub fn rejecting() -> Self {
        Self { reject: true }
    }

    fn check_enabled(&self) -> Result<(), ProverError> {
        if self.reject {
            return Err(ProverError::Backend("proving disabled".to_string()));
        }
        Ok(())
    }
}

/// Groth16-shaped encoding of a hash over the public inputs
fn transcript_proof(public_inputs: &[&[u8]]) -> [u8; GROTH_PROOF_SIZE] {
    let scalar = |domain: u8| {
        let mut state = Blake2bParams::new()
            .hash_length(64)
            .personal(PROOF_TRANSCRIPT_PERSONALIZATION)
            .to_state();
        state.update(&[domain]);
        for input in public_inputs {
            state.update(input);
        }
        let mut wide = [0u8; 64];
        wide.copy_from_slice(state.finalize().as_bytes());
        Scalar::from_bytes_wide(&wide)
    };

    let a = G1Affine::from(G1Projective::generator() * scalar(0)).to_compressed();
    let b = G2Affine::from(G2Projective::generator() * scalar(1)).to_compressed();
    let c = G1Affine::from(G1Projective::generator() * scalar(2)).to_compressed();

    let mut proof = [0u8; GROTH_PROOF_SIZE];
    proof[..48].copy_from_slice(&a);
    proof[48..144].copy_from_slice(&b);
    proof[144..].copy_from_slice(&c);
    proof
}

impl TxProver for MockTxProver {
    type Context = SaplingProvingContext;

    fn new_sapling_proving_context(&self) -> SaplingProvingContext {
        SaplingProvingContext::new()
    }

    fn spend_proof(
        &self,
        ctx: &mut SaplingProvingContext,
        proof_generation_key: ProofGenerationKey,
        diversifier: Diversifier,
        rcm: &Fr,
        alpha: &Fr,
        value: u64,
        anchor: &[u8; 32],
        witness: &MerklePath,
    ) -> Result<SpendProof, ProverError> {
        self.check_enabled()?;

        // The note must belong to the key: pk_d = ivk * g_d
        let nk = proof_generation_key.nk();
        let ivk = proof_generation_key
            .to_viewing_key(OutgoingViewingKey([0u8; 32]))
            .in_viewing_key();
        let recipient = ivk
            .to_payment_address(diversifier)
            .ok_or(ProverError::InvalidDiversifier)?;
        let note = Note::new(recipient, value, *rcm);

        let cmu = note.cmu();
        if witness.root(&cmu) != *anchor {
            return Err(ProverError::WitnessMismatch);
        }
        let nullifier = note.nullifier(&nk, witness.position());

        let rcv = Fr::random(&mut OsRng);
        let cv = ValueCommitment::derive(value, &rcv);
        let rk = PublicKey(proof_generation_key.ak).randomize(alpha, spending_key_generator());

        ctx.bsk += rcv;
        ctx.cv_sum = ctx.cv_sum.add(&cv);

        let zkproof = transcript_proof(&[&cv.to_bytes(), anchor, &nullifier.0, &rk.to_bytes()]);
        Ok(SpendProof { cv, rk, zkproof })
    }

    fn output_proof(
        &self,
        ctx: &mut SaplingProvingContext,
        esk: &Fr,
        to: &PaymentAddress,
        rcm: &Fr,
        value: u64,
    ) -> Result<OutputProof, ProverError> {
        self.check_enabled()?;

        let note = Note::new(*to, value, *rcm);
        let epk = *to.g_d() * esk;

        let rcv = Fr::random(&mut OsRng);
        let cv = ValueCommitment::derive(value, &rcv);

        ctx.bsk -= rcv;
        ctx.cv_sum = ctx.cv_sum.sub(&cv);

        let zkproof = transcript_proof(&[&cv.to_bytes(), &note.cmu(), &epk.to_bytes()]);
        Ok(OutputProof { cv, zkproof })
    }

    fn binding_sig(
        &self,
        ctx: &mut SaplingProvingContext,
        value_balance: Amount,
        sighash: &[u8; 32],
    ) -> Result<Signature, ProverError> {
        let base = value_commitment_randomness_generator();

        // bvk = cv_sum - valueBalance * V must equal bsk * R
        let bvk = ctx.cv_sum.sub(&ValueCommitment::balance(value_balance));
        let bsk = PrivateKey(ctx.bsk);
        if PublicKey::from_private(&bsk, base).0 != bvk.as_point() {
            return Err(ProverError::BindingSignatureMismatch);
        }

        Ok(bsk.sign(sighash, &mut OsRng, base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sapling_primitives::crypto::SpendingKey;
    use sapling_primitives::MerkleTree;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn owned_note(rng: &mut StdRng, sk: &SpendingKey, value: u64) -> (Note, MerkleTree) {
        let note = Note::random(sk.default_address().unwrap(), value, rng);
        let tree = MerkleTree::from_leaves(&[[3u8; 32], note.cmu()]);
        (note, tree)
    }

    #[test]
    fn test_spend_and_output_balance() {
        let mut rng = StdRng::seed_from_u64(21);
        let sk = SpendingKey::random(&mut rng);
        let expsk = sk.expanded_spending_key();
        let (note, tree) = owned_note(&mut rng, &sk, 1_000);
        let witness = tree.witness(1).unwrap();

        let prover = MockTxProver::new();
        let mut ctx = prover.new_sapling_proving_context();
        let alpha = Fr::random(&mut rng);
        let spend = prover
            .spend_proof(
                &mut ctx,
                expsk.proof_generation_key(),
                note.recipient().diversifier(),
                note.rcm(),
                &alpha,
                note.value(),
                &tree.root(),
                &witness,
            )
            .unwrap();

        let to = SpendingKey::random(&mut rng).default_address().unwrap();
        let output = prover
            .output_proof(&mut ctx, &Fr::random(&mut rng), &to, &Fr::random(&mut rng), 600)
            .unwrap();
        assert_ne!(spend.zkproof, output.zkproof);

        let sighash = [8u8; 32];
        let sig = prover.binding_sig(&mut ctx.clone(), 400, &sighash).unwrap();
        let bvk = spend.cv.sub(&output.cv).sub(&ValueCommitment::balance(400));
        assert!(PublicKey(bvk.as_point()).verify(&sighash, &sig, value_commitment_randomness_generator()));

        assert_eq!(
            prover.binding_sig(&mut ctx, 401, &sighash).unwrap_err(),
            ProverError::BindingSignatureMismatch
        );

        let spend_sig = prover.spend_sig(&expsk.ask, &alpha, &sighash).unwrap();
        assert!(spend.rk.verify(&sighash, &spend_sig, spending_key_generator()));
    }

    #[test]
    fn test_spend_rejects_foreign_note() {
        let mut rng = StdRng::seed_from_u64(22);
        let owner = SpendingKey::random(&mut rng);
        let thief = SpendingKey::random(&mut rng).expanded_spending_key();
        let (note, tree) = owned_note(&mut rng, &owner, 50);

        let prover = MockTxProver::new();
        let mut ctx = prover.new_sapling_proving_context();
        let result = prover.spend_proof(
            &mut ctx,
            thief.proof_generation_key(),
            note.recipient().diversifier(),
            note.rcm(),
            &Fr::random(&mut rng),
            note.value(),
            &tree.root(),
            &tree.witness(1).unwrap(),
        );
        assert!(matches!(
            result,
            Err(ProverError::WitnessMismatch) | Err(ProverError::InvalidDiversifier)
        ));
    }

    #[test]
    fn test_rejecting_prover() {
        let mut rng = StdRng::seed_from_u64(23);
        let to = SpendingKey::random(&mut rng).default_address().unwrap();
        let prover = MockTxProver::rejecting();
        let mut ctx = prover.new_sapling_proving_context();
        assert!(matches!(
            prover.output_proof(&mut ctx, &Fr::ONE, &to, &Fr::ONE, 1),
            Err(ProverError::Backend(_))
        ));
    }

    #[test]
    fn test_proof_encoding_is_on_curve() {
        let proof = transcript_proof(&[&b"abc"[..]]);
        let mut a = [0u8; 48];
        a.copy_from_slice(&proof[..48]);
        let mut b = [0u8; 96];
        b.copy_from_slice(&proof[48..144]);
        assert!(bool::from(G1Affine::from_compressed(&a).is_some()));
        assert!(bool::from(G2Affine::from_compressed(&b).is_some()));
        assert_eq!(proof, transcript_proof(&[&b"abc"[..]]));
    }
}
