//! Sapling signature hash
//!
//! One digest per signature: the shielded signatures (spend authorization and
//! binding) sign the digest with no input selected, each transparent input
//! signs the digest with itself selected. Script signatures, spend
//! authorization signatures and the binding signature never enter the digest,
//! so signing order does not matter.

use blake2b_simd::{Params as Blake2bParams, State};

use crate::amount::Amount;
use crate::consensus::SAPLING_BRANCH_ID;
use crate::script::Script;
use crate::transaction::Transaction;

pub const SIGHASH_ALL: u8 = 0x01;

const SIGHASH_PERSONALIZATION_PREFIX: &[u8; 12] = b"ZcashSigHash";
const PREVOUTS_PERSONALIZATION: &[u8; 16] = b"ZcashPrevoutHash";
const SEQUENCE_PERSONALIZATION: &[u8; 16] = b"ZcashSequencHash";
const OUTPUTS_PERSONALIZATION: &[u8; 16] = b"ZcashOutputsHash";
const SHIELDED_SPENDS_PERSONALIZATION: &[u8; 16] = b"ZcashSSpendsHash";
const SHIELDED_OUTPUTS_PERSONALIZATION: &[u8; 16] = b"ZcashSOutputHash";

/// The transparent input being signed
#[derive(Clone, Copy, Debug)]
pub struct SignableInput<'a> {
    pub index: usize,
    pub script_code: &'a Script,
    pub value: Amount,
}

fn state(personal: &[u8; 16]) -> State {
    Blake2bParams::new().hash_length(32).personal(personal).to_state()
}

fn finish(state: &State) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(state.finalize().as_bytes());
    out
}

fn update_script(h: &mut State, script: &Script) {
    h.update(&(script.len() as u32).to_le_bytes());
    h.update(script.as_bytes());
}

fn prevouts_hash(tx: &Transaction) -> [u8; 32] {
    let mut h = state(PREVOUTS_PERSONALIZATION);
    for input in &tx.vin {
        h.update(&input.prevout.txid.0);
        h.update(&input.prevout.n.to_le_bytes());
    }
    finish(&h)
}

fn sequence_hash(tx: &Transaction) -> [u8; 32] {
    let mut h = state(SEQUENCE_PERSONALIZATION);
    for input in &tx.vin {
        h.update(&input.sequence.to_le_bytes());
    }
    finish(&h)
}

fn outputs_hash(tx: &Transaction) -> [u8; 32] {
    let mut h = state(OUTPUTS_PERSONALIZATION);
    for output in &tx.vout {
        h.update(&output.value.to_le_bytes());
        update_script(&mut h, &output.script_pubkey);
    }
    finish(&h)
}

fn shielded_spends_hash(tx: &Transaction) -> [u8; 32] {
    let mut h = state(SHIELDED_SPENDS_PERSONALIZATION);
    if let Some(sap) = &tx.sap_data {
        for spend in &sap.spends {
            h.update(&spend.cv);
            h.update(&spend.anchor);
            h.update(&spend.nullifier);
            h.update(&spend.rk);
            h.update(&spend.zkproof);
        }
    }
    finish(&h)
}

fn shielded_outputs_hash(tx: &Transaction) -> [u8; 32] {
    let mut h = state(SHIELDED_OUTPUTS_PERSONALIZATION);
    if let Some(sap) = &tx.sap_data {
        for output in &sap.outputs {
            h.update(&output.cv);
            h.update(&output.cmu);
            h.update(&output.ephemeral_key);
            h.update(&output.enc_ciphertext);
            h.update(&output.out_ciphertext);
            h.update(&output.zkproof);
        }
    }
    finish(&h)
}

/// Digest signed by the shielded signatures (`input == None`) or by the
/// transparent input `input`.
pub fn signature_hash(tx: &Transaction, input: Option<SignableInput<'_>>, hash_type: u8) -> [u8; 32] {
    let mut personal = [0u8; 16];
    personal[..12].copy_from_slice(SIGHASH_PERSONALIZATION_PREFIX);
    personal[12..].copy_from_slice(&SAPLING_BRANCH_ID.to_le_bytes());

    let mut h = state(&personal);
    h.update(&tx.version.to_le_bytes());
    h.update(&prevouts_hash(tx));
    h.update(&sequence_hash(tx));
    h.update(&outputs_hash(tx));
    h.update(&shielded_spends_hash(tx));
    h.update(&shielded_outputs_hash(tx));
    h.update(&tx.lock_time.to_le_bytes());
    h.update(&tx.value_balance().to_le_bytes());
    h.update(&[hash_type]);

    if let Some(input) = input {
        if let Some(txin) = tx.vin.get(input.index) {
            h.update(&txin.prevout.txid.0);
            h.update(&txin.prevout.n.to_le_bytes());
            update_script(&mut h, input.script_code);
            h.update(&input.value.to_le_bytes());
            h.update(&txin.sequence.to_le_bytes());
        }
    }

    finish(&h)
}
