//! Transparent input signing
//!
//! Inputs are pay-to-pubkey-hash. A script signature is
//! `<ecdsa sig (64) || hash type> <compressed pubkey (33)>`; the dummy signer
//! emits zeroed pushes of the same lengths so size estimates are exact.

use std::collections::HashMap;

use k256::ecdsa::{signature::Signer, Signature, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;

use sapling_primitives::script::{KeyId, Script, ScriptTemplate};
use sapling_primitives::sighash::{signature_hash, SignableInput, SIGHASH_ALL};
use sapling_primitives::{Amount, Transaction};

const ECDSA_SIGNATURE_SIZE: usize = 64;
const COMPRESSED_PUBKEY_SIZE: usize = 33;

/// Compressed SEC1 encoding of the key's public half
pub fn public_key_bytes(key: &SigningKey) -> Vec<u8> {
    key.verifying_key()
        .as_affine()
        .to_encoded_point(true)
        .as_bytes()
        .to_vec()
}

pub fn key_id(key: &SigningKey) -> KeyId {
    KeyId::from_pubkey(&public_key_bytes(key))
}

/// Transparent keys, indexed by the hash their outputs pay to
#[derive(Clone, Default)]
pub struct TransparentKeyStore {
    keys: HashMap<KeyId, SigningKey>,
}

impl TransparentKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key(&mut self, key: SigningKey) -> KeyId {
        let id = key_id(&key);
        self.keys.insert(id, key);
        id
    }

    /// Generate and store a fresh key
    pub fn generate(&mut self) -> KeyId {
        self.add_key(SigningKey::random(&mut OsRng))
    }

    pub fn get(&self, id: &KeyId) -> Option<&SigningKey> {
        self.keys.get(id)
    }

    pub fn contains(&self, id: &KeyId) -> bool {
        self.keys.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// How transparent inputs get their script signatures
#[derive(Clone, Copy)]
pub enum SignatureCreator<'a> {
    /// Real signatures from the keystore
    Key(&'a TransparentKeyStore),
    /// Zero-filled signatures of the real size, for fee estimation
    Dummy,
}

impl<'a> SignatureCreator<'a> {
    /// Script signature for input `index` spending `script_pubkey` worth
    /// `value`. `None` if the script is not P2PKH or the key is unknown.
    pub fn produce_script_sig(
        &self,
        tx: &Transaction,
        index: usize,
        script_pubkey: &Script,
        value: Amount,
    ) -> Option<Script> {
        let key_id = match script_pubkey.solve()? {
            ScriptTemplate::PubKeyHash(key_id) => key_id,
            ScriptTemplate::NullData => return None,
        };

        let (mut sig, pubkey) = match self {
            SignatureCreator::Key(keystore) => {
                let key = keystore.get(&key_id)?;
                let sighash = signature_hash(
                    tx,
                    Some(SignableInput {
                        index,
                        script_code: script_pubkey,
                        value,
                    }),
                    SIGHASH_ALL,
                );
                let signature: Signature = key.sign(&sighash);
                (signature.to_bytes().to_vec(), public_key_bytes(key))
            }
            SignatureCreator::Dummy => (
                vec![0u8; ECDSA_SIGNATURE_SIZE],
                vec![0u8; COMPRESSED_PUBKEY_SIZE],
            ),
        };
        sig.push(SIGHASH_ALL);

        let mut script_sig = Script::new();
        script_sig.push_slice(&sig)?;
        script_sig.push_slice(&pubkey)?;
        Some(script_sig)
    }
}
