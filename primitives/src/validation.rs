//! Transaction checks run before a shielded transaction is accepted
//!
//! Proof verification is the proving backend's concern and is not done here.

use k256::ecdsa::{signature::Verifier, Signature as EcdsaSignature, VerifyingKey};

use crate::amount::money_range;
use crate::crypto::pedersen::{spending_key_generator, value_commitment_randomness_generator};
use crate::crypto::redjubjub::{PublicKey, Signature};
use crate::crypto::ValueCommitment;
use crate::error::{ValidationError, ValidationResult};
use crate::script::{KeyId, ScriptTemplate};
use crate::sighash::{signature_hash, SignableInput, SIGHASH_ALL};
use crate::transaction::{Transaction, TxOut};

/// Structural checks on the shielded bundle
pub fn check_sapling_structure(tx: &Transaction) -> ValidationResult<()> {
    let sap = match &tx.sap_data {
        Some(sap) => sap,
        None => return Ok(()),
    };

    if !tx.is_sapling_version() {
        return Err(ValidationError::SaplingDataOnLegacyTransaction);
    }

    if !money_range(sap.value_balance.saturating_abs()) {
        return Err(ValidationError::ValueBalanceOutOfRange);
    }

    if sap.value_balance != 0 && !sap.has_descriptions() {
        return Err(ValidationError::ValueBalanceNonZero);
    }

    let mut nullifiers = sap.nullifiers();
    nullifiers.sort_unstable();
    if nullifiers.windows(2).any(|pair| pair[0] == pair[1]) {
        return Err(ValidationError::DuplicateNullifier);
    }

    Ok(())
}

/// Spend authorization signatures and the binding signature
pub fn check_sapling_signatures(tx: &Transaction) -> ValidationResult<()> {
    let sap = match &tx.sap_data {
        Some(sap) if sap.has_descriptions() => sap,
        _ => return Ok(()),
    };

    let sighash = signature_hash(tx, None, SIGHASH_ALL);

    let mut cv_sum = ValueCommitment::identity();
    for (i, spend) in sap.spends.iter().enumerate() {
        let rk = PublicKey::from_bytes(&spend.rk).ok_or(ValidationError::InvalidSpendAuthSig(i))?;
        let sig = Signature::from_bytes(&spend.spend_auth_sig);
        if !rk.verify(&sighash, &sig, spending_key_generator()) {
            return Err(ValidationError::InvalidSpendAuthSig(i));
        }

        let cv = ValueCommitment::from_bytes(&spend.cv).ok_or(ValidationError::InvalidBindingSignature)?;
        cv_sum = cv_sum.add(&cv);
    }

    for output in &sap.outputs {
        let cv = ValueCommitment::from_bytes(&output.cv).ok_or(ValidationError::InvalidBindingSignature)?;
        cv_sum = cv_sum.sub(&cv);
    }

    // bvk = sum(cv_spend) - sum(cv_output) - valueBalance * V
    let bvk = PublicKey(cv_sum.sub(&ValueCommitment::balance(sap.value_balance)).as_point());
    let binding_sig = Signature::from_bytes(&sap.binding_sig);
    if !bvk.verify(&sighash, &binding_sig, value_commitment_randomness_generator()) {
        return Err(ValidationError::InvalidBindingSignature);
    }

    Ok(())
}

/// P2PKH signatures of every transparent input.
///
/// `prev_outputs[i]` is the output spent by input `i`.
pub fn check_transparent_signatures(tx: &Transaction, prev_outputs: &[TxOut]) -> ValidationResult<()> {
    for (index, input) in tx.vin.iter().enumerate() {
        let prev = prev_outputs
            .get(index)
            .ok_or(ValidationError::MissingPrevOutput(index))?;
        let bad = || ValidationError::InvalidTransparentSignature(index);

        let key_id = match prev.script_pubkey.solve() {
            Some(ScriptTemplate::PubKeyHash(key_id)) => key_id,
            _ => return Err(bad()),
        };

        let pushes = input.script_sig.pushes().ok_or_else(bad)?;
        let (sig_with_type, pubkey) = match pushes.as_slice() {
            [sig, pubkey] => (*sig, *pubkey),
            _ => return Err(bad()),
        };
        let (&hash_type, sig) = sig_with_type.split_last().ok_or_else(bad)?;

        if KeyId::from_pubkey(pubkey) != key_id {
            return Err(bad());
        }

        let verifying_key = VerifyingKey::from_sec1_bytes(pubkey).map_err(|_| bad())?;
        let signature = EcdsaSignature::from_slice(sig).map_err(|_| bad())?;
        let sighash = signature_hash(
            tx,
            Some(SignableInput {
                index,
                script_code: &prev.script_pubkey,
                value: prev.value,
            }),
            hash_type,
        );
        verifying_key
            .verify(&sighash, &signature)
            .map_err(|_| bad())?;
    }
    Ok(())
}

/// Size of the encoded transaction against the consensus limit
pub fn check_transaction_size(tx: &Transaction, max: usize) -> ValidationResult<()> {
    let size = tx
        .serialized_size()
        .map_err(|e| ValidationError::Serialization(e.to_string()))?;
    if size > max {
        return Err(ValidationError::TransactionTooLarge { size, max });
    }
    Ok(())
}
