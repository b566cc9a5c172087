//! Cryptographic primitives for shielded transactions
//!
//! This module provides:
//! - Fixed generators, value commitments and note commitments on Jubjub
//! - The Sapling key hierarchy and diversified payment addresses
//! - Notes, memos and their plaintext encodings
//! - Note encryption to the recipient and to the sender's ovk
//! - RedJubjub spend-authorization and binding signatures

pub mod keys;
pub mod note;
pub mod note_encryption;
pub mod pedersen;
pub mod redjubjub;

pub use keys::{
    Diversifier, ExpandedSpendingKey, FullViewingKey, IncomingViewingKey, OutgoingViewingKey,
    PaymentAddress, ProofGenerationKey, SpendingKey,
};
pub use note::{Memo, MemoTooLong, Note, NotePlaintext, Nullifier, OutgoingPlaintext};
pub use note_encryption::{
    try_sapling_note_decryption, try_sapling_note_decryption_with_esk,
    try_sapling_output_recovery, EncCiphertext, OutCiphertext, OutgoingEncryptor,
    SaplingNoteEncryption,
};
pub use pedersen::ValueCommitment;
pub use redjubjub::{PrivateKey, PublicKey, Signature};
