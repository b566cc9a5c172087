//! Notes and their plaintext encodings
//!
//! A note is the value-holding unit of the shielded pool. Its commitment is a
//! leaf of the global note commitment tree; its nullifier is revealed when the
//! note is spent.

use std::fmt;

use blake2s_simd::Params as Blake2sParams;
use borsh::{BorshDeserialize, BorshSerialize};
use ff::Field;
use group::GroupEncoding;
use jubjub::{Fr, SubgroupPoint};
use rand_core::RngCore;
use thiserror::Error;

use super::keys::{Diversifier, IncomingViewingKey, PaymentAddress};
use super::pedersen::note_commitment;
use crate::{MEMO_SIZE, NOTE_PLAINTEXT_SIZE, NULLIFIER_SIZE, OUT_PLAINTEXT_SIZE};

const NULLIFIER_PERSONALIZATION: &[u8; 8] = b"Zcash_nf";

/// Lead byte of every note plaintext
pub const NOTE_PLAINTEXT_LEAD_BYTE: u8 = 0x01;

/// First memo byte meaning "no memo"
pub const NO_MEMO_MARKER: u8 = 0xF6;

/// Nullifier revealed when a note is spent
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize,
)]
pub struct Nullifier(pub [u8; NULLIFIER_SIZE]);

impl fmt::Display for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A shielded note
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    recipient: PaymentAddress,
    value: u64,
    rcm: Fr,
}

impl Note {
    pub fn new(recipient: PaymentAddress, value: u64, rcm: Fr) -> Self {
        Self {
            recipient,
            value,
            rcm,
        }
    }

    /// New note with fresh commitment randomness
    pub fn random<R: RngCore>(recipient: PaymentAddress, value: u64, rng: &mut R) -> Self {
        Self::new(recipient, value, Fr::random(rng))
    }

    pub fn recipient(&self) -> &PaymentAddress {
        &self.recipient
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn rcm(&self) -> &Fr {
        &self.rcm
    }

    /// Note commitment (u-coordinate), the tree leaf
    pub fn cmu(&self) -> [u8; 32] {
        note_commitment(self.recipient.g_d(), self.recipient.pk_d(), self.value, &self.rcm)
    }

    /// nf = BLAKE2s(nk || cmu || position)
    pub fn nullifier(&self, nk: &SubgroupPoint, position: u64) -> Nullifier {
        let hash = Blake2sParams::new()
            .hash_length(32)
            .personal(NULLIFIER_PERSONALIZATION)
            .to_state()
            .update(&nk.to_bytes())
            .update(&self.cmu())
            .update(&position.to_le_bytes())
            .finalize();

        let mut nf = [0u8; NULLIFIER_SIZE];
        nf.copy_from_slice(hash.as_bytes());
        Nullifier(nf)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Memo size of {size} is too big, maximum allowed is {max}")]
pub struct MemoTooLong {
    pub size: usize,
    pub max: usize,
}

/// Fixed-size memo field
#[derive(Clone, PartialEq, Eq)]
pub struct Memo([u8; MEMO_SIZE]);

impl Memo {
    /// The "no memo" encoding: 0xF6 followed by zeros
    pub fn empty() -> Self {
        let mut memo = [0u8; MEMO_SIZE];
        memo[0] = NO_MEMO_MARKER;
        Self(memo)
    }

    /// Zero-padded memo; `None` if `bytes` does not fit.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > MEMO_SIZE {
            return None;
        }
        if bytes.is_empty() {
            return Some(Self::empty());
        }
        let mut memo = [0u8; MEMO_SIZE];
        memo[..bytes.len()].copy_from_slice(bytes);
        Some(Self(memo))
    }

    /// Memo from user input, stored as the string's UTF-8 bytes
    pub fn from_text(input: &str) -> Result<Self, MemoTooLong> {
        let bytes = input.as_bytes();
        Self::from_bytes(bytes).ok_or(MemoTooLong {
            size: bytes.len(),
            max: MEMO_SIZE,
        })
    }

    pub fn as_bytes(&self) -> &[u8; MEMO_SIZE] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == NO_MEMO_MARKER && self.0[1..].iter().all(|b| *b == 0)
    }
}

impl Default for Memo {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        write!(f, "Memo({})", hex::encode(&self.0[..end]))
    }
}

/// Payload encrypted to the recipient: lead byte, d, value, rcm, memo
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotePlaintext {
    pub diversifier: Diversifier,
    pub value: u64,
    pub rcm: Fr,
    pub memo: Memo,
}

impl NotePlaintext {
    pub fn from_note(note: &Note, memo: Memo) -> Self {
        Self {
            diversifier: note.recipient().diversifier(),
            value: note.value(),
            rcm: *note.rcm(),
            memo,
        }
    }

    pub fn to_bytes(&self) -> [u8; NOTE_PLAINTEXT_SIZE] {
        let mut bytes = [0u8; NOTE_PLAINTEXT_SIZE];
        bytes[0] = NOTE_PLAINTEXT_LEAD_BYTE;
        bytes[1..12].copy_from_slice(&self.diversifier.0);
        bytes[12..20].copy_from_slice(&self.value.to_le_bytes());
        bytes[20..52].copy_from_slice(&self.rcm.to_bytes());
        bytes[52..].copy_from_slice(self.memo.as_bytes());
        bytes
    }

    /// Parse a decrypted plaintext; rejects unknown lead bytes and non-canonical rcm.
    pub fn from_bytes(bytes: &[u8; NOTE_PLAINTEXT_SIZE]) -> Option<Self> {
        if bytes[0] != NOTE_PLAINTEXT_LEAD_BYTE {
            return None;
        }

        let mut d = [0u8; 11];
        d.copy_from_slice(&bytes[1..12]);

        let mut value = [0u8; 8];
        value.copy_from_slice(&bytes[12..20]);

        let mut rcm = [0u8; 32];
        rcm.copy_from_slice(&bytes[20..52]);
        let rcm: Option<Fr> = Fr::from_bytes(&rcm).into();

        let mut memo = [0u8; MEMO_SIZE];
        memo.copy_from_slice(&bytes[52..]);

        Some(Self {
            diversifier: Diversifier(d),
            value: u64::from_le_bytes(value),
            rcm: rcm?,
            memo: Memo(memo),
        })
    }

    /// Rebuild the note for the address `ivk` derives from this diversifier
    pub fn note(&self, ivk: &IncomingViewingKey) -> Option<Note> {
        let recipient = ivk.to_payment_address(self.diversifier)?;
        Some(Note::new(recipient, self.value, self.rcm))
    }
}

/// Payload encrypted to the sender's ovk: pk_d and the ephemeral secret
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingPlaintext {
    pub pk_d: SubgroupPoint,
    pub esk: Fr,
}

impl OutgoingPlaintext {
    pub fn new(pk_d: SubgroupPoint, esk: Fr) -> Self {
        Self { pk_d, esk }
    }

    pub fn to_bytes(&self) -> [u8; OUT_PLAINTEXT_SIZE] {
        let mut bytes = [0u8; OUT_PLAINTEXT_SIZE];
        bytes[..32].copy_from_slice(&self.pk_d.to_bytes());
        bytes[32..].copy_from_slice(&self.esk.to_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; OUT_PLAINTEXT_SIZE]) -> Option<Self> {
        let mut pk_d = [0u8; 32];
        pk_d.copy_from_slice(&bytes[..32]);
        let mut esk = [0u8; 32];
        esk.copy_from_slice(&bytes[32..]);

        let pk_d: Option<SubgroupPoint> = SubgroupPoint::from_bytes(&pk_d).into();
        let esk: Option<Fr> = Fr::from_bytes(&esk).into();
        Some(Self {
            pk_d: pk_d?,
            esk: esk?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::SpendingKey;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn address() -> PaymentAddress {
        SpendingKey::from_bytes([5u8; 32]).default_address().unwrap()
    }

    #[test]
    fn test_commitment_is_stable() {
        let mut rng = StdRng::seed_from_u64(1);
        let note = Note::random(address(), 42, &mut rng);
        let copy = Note::new(*note.recipient(), note.value(), *note.rcm());
        assert_eq!(note.cmu(), copy.cmu());
    }

    #[test]
    fn test_nullifier_depends_on_position_and_key() {
        let mut rng = StdRng::seed_from_u64(2);
        let note = Note::random(address(), 42, &mut rng);
        let nk = SpendingKey::from_bytes([5u8; 32]).full_viewing_key().nk;
        let other_nk = SpendingKey::from_bytes([6u8; 32]).full_viewing_key().nk;

        assert_eq!(note.nullifier(&nk, 3), note.nullifier(&nk, 3));
        assert_ne!(note.nullifier(&nk, 3), note.nullifier(&nk, 4));
        assert_ne!(note.nullifier(&nk, 3), note.nullifier(&other_nk, 3));
    }

    #[test]
    fn test_memo() {
        assert!(Memo::empty().is_empty());
        assert_eq!(Memo::from_bytes(&[]), Some(Memo::empty()));
        assert!(Memo::from_bytes(&[0u8; MEMO_SIZE]).is_some());
        assert!(Memo::from_bytes(&[0u8; MEMO_SIZE + 1]).is_none());

        let memo = Memo::from_bytes(b"hello").unwrap();
        assert!(!memo.is_empty());
        assert_eq!(&memo.as_bytes()[..5], b"hello");
        assert!(memo.as_bytes()[5..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_memo_from_text() {
        let memo = Memo::from_text("abc").unwrap();
        assert_eq!(&memo.as_bytes()[..3], b"abc");

        assert_eq!(Memo::from_text("").unwrap(), Memo::empty());

        let long = "z".repeat(MEMO_SIZE + 1);
        assert_eq!(
            Memo::from_text(&long),
            Err(MemoTooLong { size: MEMO_SIZE + 1, max: MEMO_SIZE })
        );
        assert_eq!(
            Memo::from_text(&long).unwrap_err().to_string(),
            "Memo size of 513 is too big, maximum allowed is 512"
        );
    }

    #[test]
    fn test_hex_looking_memo_keeps_its_text() {
        let memo = Memo::from_text("DEADBEEF").unwrap();
        assert_eq!(&memo.as_bytes()[..8], b"DEADBEEF");
        assert!(memo.as_bytes()[8..].iter().all(|b| *b == 0));

        let full = "ab".repeat(MEMO_SIZE / 2);
        assert_eq!(&Memo::from_text(&full).unwrap().as_bytes()[..], full.as_bytes());

        let long = "A".repeat(600);
        assert_eq!(
            Memo::from_text(&long),
            Err(MemoTooLong { size: 600, max: MEMO_SIZE })
        );
    }

    #[test]
    fn test_note_plaintext_encoding() {
        let mut rng = StdRng::seed_from_u64(3);
        let note = Note::random(address(), 1234, &mut rng);
        let plaintext = NotePlaintext::from_note(&note, Memo::from_bytes(b"memo").unwrap());

        let bytes = plaintext.to_bytes();
        assert_eq!(bytes[0], NOTE_PLAINTEXT_LEAD_BYTE);
        assert_eq!(NotePlaintext::from_bytes(&bytes), Some(plaintext.clone()));

        let ivk = SpendingKey::from_bytes([5u8; 32]).full_viewing_key().in_viewing_key();
        assert_eq!(plaintext.note(&ivk), Some(note));
    }

    #[test]
    fn test_note_plaintext_rejects_bad_lead_byte() {
        let mut rng = StdRng::seed_from_u64(4);
        let note = Note::random(address(), 1, &mut rng);
        let mut bytes = NotePlaintext::from_note(&note, Memo::empty()).to_bytes();
        bytes[0] = 0x02;
        assert!(NotePlaintext::from_bytes(&bytes).is_none());
    }
}
