//! Sapling shielded transaction primitives
//!
//! The data model and cryptography underneath shielded transaction
//! construction:
//! - Note & address model: keys, payment addresses, notes, nullifiers
//! - Note encryption: delivering a note to its recipient and to the sender's
//!   outgoing viewing key
//! - Value commitments and RedJubjub spend/binding signatures
//! - Transaction layout, the Sapling signature hash and structural validation
//!
//! Proving is not done here; descriptions carry proof bytes produced by an
//! external backend.

#![forbid(unsafe_code)]

pub mod amount;
pub mod consensus;
pub mod crypto;
pub mod error;
pub mod merkle;
pub mod nullifier_set;
pub mod script;
pub mod sighash;
pub mod transaction;
pub mod validation;

use borsh::{BorshDeserialize, BorshSerialize};

pub use amount::{format_money, money_range, Amount, Money, COIN, MAX_MONEY};
pub use consensus::ConsensusParams;
pub use error::{ValidationError, ValidationResult};
pub use merkle::{MerklePath, MerkleTree, TREE_DEPTH};
pub use nullifier_set::NullifierSet;
pub use transaction::{OutPoint, SaplingTxData, Transaction, TxId, TxIn, TxOut};

/// Size of a Groth16 proof in bytes
pub const GROTH_PROOF_SIZE: usize = 192;

/// Size of a note commitment
pub const NOTE_COMMITMENT_SIZE: usize = 32;

/// Size of a nullifier
pub const NULLIFIER_SIZE: usize = 32;

/// Size of the memo field carried in every note plaintext
pub const MEMO_SIZE: usize = 512;

/// Lead byte + diversifier + value + rcm + memo
pub const NOTE_PLAINTEXT_SIZE: usize = 1 + 11 + 8 + 32 + MEMO_SIZE;

/// pk_d + esk
pub const OUT_PLAINTEXT_SIZE: usize = 32 + 32;

/// Poly1305 authentication tag
pub const AEAD_TAG_SIZE: usize = 16;

/// Size of encrypted note ciphertext
pub const ENC_CIPHERTEXT_SIZE: usize = NOTE_PLAINTEXT_SIZE + AEAD_TAG_SIZE;

/// Size of outgoing ciphertext
pub const OUT_CIPHERTEXT_SIZE: usize = OUT_PLAINTEXT_SIZE + AEAD_TAG_SIZE;

/// Size of a RedJubjub signature
pub const SIGNATURE_SIZE: usize = 64;

/// Size of a SpendDescription
pub const SPEND_DESCRIPTION_SIZE: usize =
    32 + 32 + NULLIFIER_SIZE + 32 + GROTH_PROOF_SIZE + SIGNATURE_SIZE; // 384 bytes

/// Size of an OutputDescription
pub const OUTPUT_DESCRIPTION_SIZE: usize = 32
    + NOTE_COMMITMENT_SIZE
    + 32
    + ENC_CIPHERTEXT_SIZE
    + OUT_CIPHERTEXT_SIZE
    + GROTH_PROOF_SIZE; // 948 bytes

/// Description of a shielded spend (consuming a note)
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SpendDescription {
    /// Value commitment (Pedersen commitment to value)
    pub cv: [u8; 32],
    /// Merkle root the spend proof is relative to
    pub anchor: [u8; 32],
    /// Nullifier (prevents double-spending)
    pub nullifier: [u8; NULLIFIER_SIZE],
    /// Randomized verification key
    pub rk: [u8; 32],
    /// zk-SNARK proof
    pub zkproof: [u8; GROTH_PROOF_SIZE],
    /// Spend authorization signature
    pub spend_auth_sig: [u8; SIGNATURE_SIZE],
}

impl SpendDescription {
    /// Placeholder of identical encoded size, used for fee estimation
    pub fn dummy() -> Self {
        Self {
            cv: [0xff; 32],
            anchor: [0xff; 32],
            nullifier: [0xff; NULLIFIER_SIZE],
            rk: [0xff; 32],
            zkproof: [0xff; GROTH_PROOF_SIZE],
            spend_auth_sig: [0xff; SIGNATURE_SIZE],
        }
    }
}

/// Description of a shielded output (creating a note)
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct OutputDescription {
    /// Value commitment (Pedersen commitment to value)
    pub cv: [u8; 32],
    /// Note commitment (u-coordinate)
    pub cmu: [u8; NOTE_COMMITMENT_SIZE],
    /// Ephemeral public key for note encryption
    pub ephemeral_key: [u8; 32],
    /// Note plaintext encrypted to the recipient
    pub enc_ciphertext: [u8; ENC_CIPHERTEXT_SIZE],
    /// Outgoing plaintext encrypted to the sender's ovk
    pub out_ciphertext: [u8; OUT_CIPHERTEXT_SIZE],
    /// zk-SNARK proof
    pub zkproof: [u8; GROTH_PROOF_SIZE],
}

impl OutputDescription {
    /// Placeholder of identical encoded size, used for fee estimation
    pub fn dummy() -> Self {
        Self {
            cv: [0xff; 32],
            cmu: [0xff; NOTE_COMMITMENT_SIZE],
            ephemeral_key: [0xff; 32],
            enc_ciphertext: [0xff; ENC_CIPHERTEXT_SIZE],
            out_ciphertext: [0xff; OUT_CIPHERTEXT_SIZE],
            zkproof: [0xff; GROTH_PROOF_SIZE],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(GROTH_PROOF_SIZE, 192);
        assert_eq!(NOTE_PLAINTEXT_SIZE, 564);
        assert_eq!(ENC_CIPHERTEXT_SIZE, 580);
        assert_eq!(OUT_CIPHERTEXT_SIZE, 80);
        assert_eq!(SPEND_DESCRIPTION_SIZE, 384);
        assert_eq!(OUTPUT_DESCRIPTION_SIZE, 948);
    }

    #[test]
    fn test_dummy_descriptions_encode_at_full_size() {
        let spend = borsh::to_vec(&SpendDescription::dummy()).unwrap();
        let output = borsh::to_vec(&OutputDescription::dummy()).unwrap();
        assert_eq!(spend.len(), SPEND_DESCRIPTION_SIZE);
        assert_eq!(output.len(), OUTPUT_DESCRIPTION_SIZE);
    }
}
