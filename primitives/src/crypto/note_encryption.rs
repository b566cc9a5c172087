//! Note encryption
//!
//! A fresh ephemeral secret `esk` is agreed with the recipient's `pk_d`; the
//! shared secret keys a ChaCha20Poly1305 encryption of the note plaintext
//! under an all-zero nonce. The sender also encrypts `(pk_d, esk)` under a key
//! derived from its outgoing viewing key so it can recover what it sent.
//!
//! The zero nonce is only safe because each derived key encrypts a single
//! message. The encryptor is therefore a two-stage capability consumed by
//! value: [`SaplingNoteEncryption::encrypt_to_recipient`] hands back an
//! [`OutgoingEncryptor`], whose [`OutgoingEncryptor::encrypt_to_ourselves`]
//! consumes it in turn. Neither stage can run twice:
//!
//! ```compile_fail
//! use sapling_primitives::crypto::{Memo, Note, NotePlaintext, SaplingNoteEncryption, SpendingKey};
//!
//! let address = SpendingKey::from_bytes([1; 32]).default_address().unwrap();
//! let note = Note::random(address, 10, &mut rand_core::OsRng);
//! let plaintext = NotePlaintext::from_note(&note, Memo::empty());
//! let enc = SaplingNoteEncryption::new(address.diversifier(), &mut rand_core::OsRng).unwrap();
//! let _first = enc.encrypt_to_recipient(address.pk_d(), &plaintext);
//! let _second = enc.encrypt_to_recipient(address.pk_d(), &plaintext); // use of moved value
//! ```
//!
//! Every decryption path returns `None` on any failure.

use blake2b_simd::Params as Blake2bParams;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use ff::Field;
use group::GroupEncoding;
use jubjub::{Fr, SubgroupPoint};
use rand_core::RngCore;

use super::keys::{Diversifier, IncomingViewingKey, OutgoingViewingKey, PaymentAddress};
use super::note::{Memo, Note, NotePlaintext, OutgoingPlaintext};
use crate::{ENC_CIPHERTEXT_SIZE, NOTE_PLAINTEXT_SIZE, OUT_CIPHERTEXT_SIZE, OUT_PLAINTEXT_SIZE};

const KDF_PERSONALIZATION: &[u8; 16] = b"Zcash_SaplingKDF";
const PRF_OCK_PERSONALIZATION: &[u8; 16] = b"Zcash_Derive_ock";

/// Note plaintext encrypted to the recipient
pub type EncCiphertext = [u8; ENC_CIPHERTEXT_SIZE];

/// Outgoing plaintext encrypted to the sender's ovk
pub type OutCiphertext = [u8; OUT_CIPHERTEXT_SIZE];

/// Sapling KDF: BLAKE2b-256(dhsecret || epk)
fn kdf_sapling(dhsecret: &SubgroupPoint, epk: &[u8; 32]) -> [u8; 32] {
    let hash = Blake2bParams::new()
        .hash_length(32)
        .personal(KDF_PERSONALIZATION)
        .to_state()
        .update(&dhsecret.to_bytes())
        .update(epk)
        .finalize();

    let mut key = [0u8; 32];
    key.copy_from_slice(hash.as_bytes());
    key
}

/// PRF_ock: BLAKE2b-256(ovk || cv || cmu || epk)
fn prf_ock(ovk: &OutgoingViewingKey, cv: &[u8; 32], cmu: &[u8; 32], epk: &[u8; 32]) -> [u8; 32] {
    let hash = Blake2bParams::new()
        .hash_length(32)
        .personal(PRF_OCK_PERSONALIZATION)
        .to_state()
        .update(&ovk.0)
        .update(cv)
        .update(cmu)
        .update(epk)
        .finalize();

    let mut key = [0u8; 32];
    key.copy_from_slice(hash.as_bytes());
    key
}

fn seal<const N: usize>(key: &[u8; 32], plaintext: &[u8]) -> Option<[u8; N]> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let ciphertext = cipher.encrypt(&Nonce::default(), plaintext).ok()?;
    ciphertext.try_into().ok()
}

fn open<const N: usize>(key: &[u8; 32], ciphertext: &[u8]) -> Option<[u8; N]> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let plaintext = cipher.decrypt(&Nonce::default(), ciphertext).ok()?;
    plaintext.try_into().ok()
}

fn parse_epk(epk: &[u8; 32]) -> Option<SubgroupPoint> {
    SubgroupPoint::from_bytes(epk).into()
}

/// First stage of the encryptor: holds a fresh ephemeral key pair.
pub struct SaplingNoteEncryption {
    esk: Fr,
    epk: SubgroupPoint,
}

impl SaplingNoteEncryption {
    /// Draw a fresh esk for a note sent to diversifier `d`.
    /// `None` if `d` has no base point.
    pub fn new<R: RngCore>(d: Diversifier, rng: &mut R) -> Option<Self> {
        Self::with_esk(d, Fr::random(rng))
    }

    pub fn with_esk(d: Diversifier, esk: Fr) -> Option<Self> {
        let g_d = d.g_d()?;
        Some(Self { esk, epk: g_d * esk })
    }

    pub fn epk(&self) -> &SubgroupPoint {
        &self.epk
    }

    pub fn esk(&self) -> &Fr {
        &self.esk
    }

    /// Encrypt the note plaintext to `pk_d`, consuming the ephemeral key's
    /// recipient-side use.
    pub fn encrypt_to_recipient(
        self,
        pk_d: &SubgroupPoint,
        plaintext: &NotePlaintext,
    ) -> Option<(EncCiphertext, OutgoingEncryptor)> {
        let epk = self.epk.to_bytes();
        let dhsecret = *pk_d * self.esk;
        let key = kdf_sapling(&dhsecret, &epk);

        let ciphertext = seal::<ENC_CIPHERTEXT_SIZE>(&key, &plaintext.to_bytes())?;
        Some((
            ciphertext,
            OutgoingEncryptor {
                esk: self.esk,
                epk: self.epk,
            },
        ))
    }
}

/// Second stage of the encryptor, usable once for the sender's own record.
pub struct OutgoingEncryptor {
    esk: Fr,
    epk: SubgroupPoint,
}

impl OutgoingEncryptor {
    pub fn epk(&self) -> &SubgroupPoint {
        &self.epk
    }

    pub fn esk(&self) -> &Fr {
        &self.esk
    }

    pub fn encrypt_to_ourselves(
        self,
        ovk: &OutgoingViewingKey,
        cv: &[u8; 32],
        cmu: &[u8; 32],
        plaintext: &OutgoingPlaintext,
    ) -> Option<OutCiphertext> {
        let ock = prf_ock(ovk, cv, cmu, &self.epk.to_bytes());
        seal::<OUT_CIPHERTEXT_SIZE>(&ock, &plaintext.to_bytes())
    }
}

/// Decrypt a note ciphertext with the recipient's incoming viewing key
pub fn attempt_enc_decryption(
    ciphertext: &EncCiphertext,
    ivk: &IncomingViewingKey,
    epk: &[u8; 32],
) -> Option<NotePlaintext> {
    let dhsecret = parse_epk(epk)? * ivk.0;
    let key = kdf_sapling(&dhsecret, epk);
    let plaintext = open::<NOTE_PLAINTEXT_SIZE>(&key, ciphertext)?;
    NotePlaintext::from_bytes(&plaintext)
}

/// Decrypt a note ciphertext with the sender's ephemeral secret
pub fn attempt_enc_decryption_with_esk(
    ciphertext: &EncCiphertext,
    epk: &[u8; 32],
    esk: &Fr,
    pk_d: &SubgroupPoint,
) -> Option<NotePlaintext> {
    let dhsecret = *pk_d * esk;
    let key = kdf_sapling(&dhsecret, epk);
    let plaintext = open::<NOTE_PLAINTEXT_SIZE>(&key, ciphertext)?;
    NotePlaintext::from_bytes(&plaintext)
}

/// Decrypt an outgoing ciphertext with the sender's ovk
pub fn attempt_out_decryption(
    ciphertext: &OutCiphertext,
    ovk: &OutgoingViewingKey,
    cv: &[u8; 32],
    cmu: &[u8; 32],
    epk: &[u8; 32],
) -> Option<OutgoingPlaintext> {
    let ock = prf_ock(ovk, cv, cmu, epk);
    let plaintext = open::<OUT_PLAINTEXT_SIZE>(&ock, ciphertext)?;
    OutgoingPlaintext::from_bytes(&plaintext)
}

/// Trial-decrypt an output with an incoming viewing key.
///
/// Succeeds only if the ciphertext authenticates and the recovered note
/// commits to `cmu`.
pub fn try_sapling_note_decryption(
    ivk: &IncomingViewingKey,
    epk: &[u8; 32],
    cmu: &[u8; 32],
    enc_ciphertext: &EncCiphertext,
) -> Option<(Note, PaymentAddress, Memo)> {
    let plaintext = attempt_enc_decryption(enc_ciphertext, ivk, epk)?;
    let note = plaintext.note(ivk)?;

    if note.cmu() != *cmu {
        return None;
    }
    Some((note.clone(), *note.recipient(), plaintext.memo))
}

/// Trial self-decryption with the ephemeral secret used to create the output
pub fn try_sapling_note_decryption_with_esk(
    esk: &Fr,
    pk_d: &SubgroupPoint,
    epk: &[u8; 32],
    cmu: &[u8; 32],
    enc_ciphertext: &EncCiphertext,
) -> Option<(Note, Memo)> {
    let plaintext = attempt_enc_decryption_with_esk(enc_ciphertext, epk, esk, pk_d)?;
    let recipient = PaymentAddress::from_parts(plaintext.diversifier, *pk_d)?;

    if (*recipient.g_d() * esk).to_bytes() != *epk {
        return None;
    }

    let note = Note::new(recipient, plaintext.value, plaintext.rcm);
    if note.cmu() != *cmu {
        return None;
    }
    Some((note, plaintext.memo))
}

/// Recover a sent note with the sender's outgoing viewing key
pub fn try_sapling_output_recovery(
    ovk: &OutgoingViewingKey,
    cv: &[u8; 32],
    cmu: &[u8; 32],
    epk: &[u8; 32],
    enc_ciphertext: &EncCiphertext,
    out_ciphertext: &OutCiphertext,
) -> Option<(Note, PaymentAddress, Memo)> {
    let outgoing = attempt_out_decryption(out_ciphertext, ovk, cv, cmu, epk)?;
    let (note, memo) =
        try_sapling_note_decryption_with_esk(&outgoing.esk, &outgoing.pk_d, epk, cmu, enc_ciphertext)?;
    Some((note.clone(), *note.recipient(), memo))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::SpendingKey;
    use crate::crypto::pedersen::ValueCommitment;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Sent {
        note: Note,
        epk: [u8; 32],
        cv: [u8; 32],
        cmu: [u8; 32],
        enc: EncCiphertext,
        out: OutCiphertext,
    }

    fn send(rng: &mut StdRng, sk: &SpendingKey, ovk: &OutgoingViewingKey, value: u64, memo: &[u8]) -> Sent {
        let address = sk.default_address().unwrap();
        let note = Note::random(address, value, rng);
        let cmu = note.cmu();
        let cv = ValueCommitment::derive(value, &Fr::random(&mut *rng)).to_bytes();

        let encryptor = SaplingNoteEncryption::new(address.diversifier(), rng).unwrap();
        let epk = encryptor.epk().to_bytes();
        let plaintext = NotePlaintext::from_note(&note, Memo::from_bytes(memo).unwrap());
        let (enc, outgoing) = encryptor.encrypt_to_recipient(address.pk_d(), &plaintext).unwrap();

        let out_plaintext = OutgoingPlaintext::new(*address.pk_d(), *outgoing.esk());
        let out = outgoing.encrypt_to_ourselves(ovk, &cv, &cmu, &out_plaintext).unwrap();

        Sent {
            note,
            epk,
            cv,
            cmu,
            enc,
            out,
        }
    }

    #[test]
    fn test_recipient_roundtrip() {
        let mut rng = StdRng::seed_from_u64(11);
        let sk = SpendingKey::random(&mut rng);
        let ovk = SpendingKey::random(&mut rng).expanded_spending_key().ovk;
        let sent = send(&mut rng, &sk, &ovk, 50_000, b"thanks");

        let ivk = sk.full_viewing_key().in_viewing_key();
        let (note, address, memo) = try_sapling_note_decryption(&ivk, &sent.epk, &sent.cmu, &sent.enc).unwrap();
        assert_eq!(note, sent.note);
        assert_eq!(address, sk.default_address().unwrap());
        assert_eq!(&memo.as_bytes()[..6], b"thanks");
    }

    #[test]
    fn test_output_recovery_with_ovk() {
        let mut rng = StdRng::seed_from_u64(12);
        let recipient = SpendingKey::random(&mut rng);
        let ovk = SpendingKey::random(&mut rng).expanded_spending_key().ovk;
        let sent = send(&mut rng, &recipient, &ovk, 7, b"");

        let (note, address, memo) =
            try_sapling_output_recovery(&ovk, &sent.cv, &sent.cmu, &sent.epk, &sent.enc, &sent.out).unwrap();
        assert_eq!(note, sent.note);
        assert_eq!(address, recipient.default_address().unwrap());
        assert!(memo.is_empty());
    }

    #[test]
    fn test_wrong_ivk_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(13);
        let sk = SpendingKey::random(&mut rng);
        let ovk = sk.expanded_spending_key().ovk;
        let sent = send(&mut rng, &sk, &ovk, 1, b"");

        let other = SpendingKey::random(&mut rng).full_viewing_key().in_viewing_key();
        assert!(try_sapling_note_decryption(&other, &sent.epk, &sent.cmu, &sent.enc).is_none());
    }

    #[test]
    fn test_wrong_epk_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(14);
        let sk = SpendingKey::random(&mut rng);
        let ovk = sk.expanded_spending_key().ovk;
        let sent = send(&mut rng, &sk, &ovk, 1, b"");
        let other = send(&mut rng, &sk, &ovk, 1, b"");

        let ivk = sk.full_viewing_key().in_viewing_key();
        assert!(try_sapling_note_decryption(&ivk, &other.epk, &sent.cmu, &sent.enc).is_none());
        // Not a curve point at all
        assert!(try_sapling_note_decryption(&ivk, &[0xff; 32], &sent.cmu, &sent.enc).is_none());
    }

    #[test]
    fn test_wrong_ovk_or_cv_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(15);
        let sk = SpendingKey::random(&mut rng);
        let ovk = sk.expanded_spending_key().ovk;
        let sent = send(&mut rng, &sk, &ovk, 1, b"");

        let wrong_ovk = OutgoingViewingKey([9u8; 32]);
        assert!(try_sapling_output_recovery(&wrong_ovk, &sent.cv, &sent.cmu, &sent.epk, &sent.enc, &sent.out).is_none());

        let mut wrong_cv = sent.cv;
        wrong_cv[0] ^= 1;
        assert!(attempt_out_decryption(&sent.out, &ovk, &wrong_cv, &sent.cmu, &sent.epk).is_none());
    }

    #[test]
    fn test_commitment_mismatch_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(16);
        let sk = SpendingKey::random(&mut rng);
        let ovk = sk.expanded_spending_key().ovk;
        let sent = send(&mut rng, &sk, &ovk, 1, b"");

        let ivk = sk.full_viewing_key().in_viewing_key();
        let other_cmu = [1u8; 32];
        assert!(attempt_enc_decryption(&sent.enc, &ivk, &sent.epk).is_some());
        assert!(try_sapling_note_decryption(&ivk, &sent.epk, &other_cmu, &sent.enc).is_none());
    }

    #[test]
    fn test_tampered_ciphertext_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(17);
        let sk = SpendingKey::random(&mut rng);
        let ovk = sk.expanded_spending_key().ovk;
        let mut sent = send(&mut rng, &sk, &ovk, 1, b"");
        sent.enc[100] ^= 0x80;

        let ivk = sk.full_viewing_key().in_viewing_key();
        assert!(try_sapling_note_decryption(&ivk, &sent.epk, &sent.cmu, &sent.enc).is_none());
    }

    #[test]
    fn test_self_decryption_with_esk() {
        let mut rng = StdRng::seed_from_u64(18);
        let sk = SpendingKey::random(&mut rng);
        let address = sk.default_address().unwrap();
        let note = Note::random(address, 99, &mut rng);
        let cmu = note.cmu();

        let encryptor = SaplingNoteEncryption::new(address.diversifier(), &mut rng).unwrap();
        let esk = *encryptor.esk();
        let epk = encryptor.epk().to_bytes();
        let (enc, _) = encryptor
            .encrypt_to_recipient(address.pk_d(), &NotePlaintext::from_note(&note, Memo::empty()))
            .unwrap();

        let (recovered, _) = try_sapling_note_decryption_with_esk(&esk, address.pk_d(), &epk, &cmu, &enc).unwrap();
        assert_eq!(recovered, note);

        let wrong_esk = esk + Fr::ONE;
        assert!(try_sapling_note_decryption_with_esk(&wrong_esk, address.pk_d(), &epk, &cmu, &enc).is_none());
    }

    #[test]
    fn test_invalid_diversifier_has_no_encryptor() {
        let bad = (0..64u64).map(Diversifier::from_index).find(|d| d.g_d().is_none()).unwrap();
        let mut rng = StdRng::seed_from_u64(19);
        assert!(SaplingNoteEncryption::new(bad, &mut rng).is_none());
    }
}
