//! Sapling transaction builder
//!
//! Accumulates transparent inputs/outputs and shielded spends/outputs, places
//! change, and produces either a proven and signed transaction or a
//! structurally identical one carrying placeholder proofs and signatures
//! (used to measure the exact serialized size before proving).
//!
//! ```text
//! Empty -> Accumulating -> DummySigned | ProvenSigned
//! clear()                      -> Empty
//! clear_proofs_and_signatures() -> Accumulating
//! ```

use ff::Field;
use group::GroupEncoding;
use jubjub::Fr;
use log::{debug, info};
use rand_core::OsRng;

use sapling_primitives::crypto::{
    ExpandedSpendingKey, Memo, Note, NotePlaintext, OutgoingPlaintext, OutgoingViewingKey,
    PaymentAddress, SaplingNoteEncryption,
};
use sapling_primitives::script::{KeyId, Script};
use sapling_primitives::sighash::{signature_hash, SIGHASH_ALL};
use sapling_primitives::{
    money_range, Amount, ConsensusParams, MerklePath, Money, OutPoint, OutputDescription,
    SaplingTxData, SpendDescription, Transaction, TxIn, TxOut, SIGNATURE_SIZE,
};

use crate::error::{BuilderError, BuilderResult};
use crate::fees::FeePolicy;
use crate::prover::TxProver;
use crate::signing::{SignatureCreator, TransparentKeyStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuilderState {
    Empty,
    Accumulating,
    DummySigned,
    ProvenSigned,
}

struct SpendInfo {
    expsk: ExpandedSpendingKey,
    note: Note,
    alpha: Fr,
    anchor: [u8; 32],
    witness: MerklePath,
}

struct OutputInfo {
    ovk: OutgoingViewingKey,
    note: Note,
    memo: Memo,
}

struct TransparentInputInfo {
    script_pubkey: Script,
    value: Amount,
}

/// Where change goes; the last configuration call wins
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeDestination {
    Unset,
    Shielded {
        address: PaymentAddress,
        ovk: OutgoingViewingKey,
    },
    Transparent(KeyId),
}

pub struct TransactionBuilder<'a> {
    params: ConsensusParams,
    height: u32,
    policy: FeePolicy,
    keystore: Option<&'a TransparentKeyStore>,
    mtx: Transaction,
    fee: Option<Amount>,
    spends: Vec<SpendInfo>,
    outputs: Vec<OutputInfo>,
    t_ins: Vec<TransparentInputInfo>,
    change: ChangeDestination,
    state: BuilderState,
}

impl<'a> TransactionBuilder<'a> {
    /// Builder for a transaction mined at `height`. Transparent inputs can
    /// only be added when a keystore is supplied.
    pub fn new(
        params: ConsensusParams,
        height: u32,
        policy: FeePolicy,
        keystore: Option<&'a TransparentKeyStore>,
    ) -> Self {
        let mtx = Transaction::new(params.tx_version(height));
        Self {
            params,
            height,
            policy,
            keystore,
            mtx,
            fee: None,
            spends: Vec::new(),
            outputs: Vec::new(),
            t_ins: Vec::new(),
            change: ChangeDestination::Unset,
            state: BuilderState::Empty,
        }
    }

    fn sap_data_mut(&mut self) -> BuilderResult<&mut SaplingTxData> {
        let height = self.height;
        self.mtx
            .sap_data
            .as_mut()
            .ok_or(BuilderError::SaplingNotActive(height))
    }

    fn require_sapling(&self) -> BuilderResult<()> {
        if !self.params.is_sapling_active(self.height) || self.mtx.sap_data.is_none() {
            return Err(BuilderError::SaplingNotActive(self.height));
        }
        Ok(())
    }

    fn adjust_value_balance(&mut self, delta: Amount) -> BuilderResult<()> {
        let sap = self.sap_data_mut()?;
        sap.value_balance = sap
            .value_balance
            .checked_add(delta)
            .ok_or(BuilderError::ValueOutOfRange)?;
        Ok(())
    }

    /// Spend `note`, authenticated by `witness` against `anchor`. Every
    /// spend of a transaction must use the same anchor.
    pub fn add_sapling_spend(
        &mut self,
        expsk: ExpandedSpendingKey,
        note: Note,
        anchor: [u8; 32],
        witness: MerklePath,
    ) -> BuilderResult<()> {
        self.require_sapling()?;

        if let Some(first) = self.spends.first() {
            if first.anchor != anchor {
                return Err(BuilderError::AnchorMismatch);
            }
        }

        let value = Amount::try_from(note.value()).map_err(|_| BuilderError::ValueOutOfRange)?;
        if !money_range(value) {
            return Err(BuilderError::ValueOutOfRange);
        }
        self.adjust_value_balance(value)?;

        self.spends.push(SpendInfo {
            expsk,
            note,
            alpha: Fr::random(&mut OsRng),
            anchor,
            witness,
        });
        self.state = BuilderState::Accumulating;
        Ok(())
    }

    pub fn add_sapling_output(
        &mut self,
        ovk: OutgoingViewingKey,
        to: PaymentAddress,
        value: Amount,
        memo: Memo,
    ) -> BuilderResult<()> {
        self.require_sapling()?;

        if !money_range(value) {
            return Err(BuilderError::ValueOutOfRange);
        }
        self.adjust_value_balance(-value)?;

        let note = Note::random(to, value as u64, &mut OsRng);
        self.outputs.push(OutputInfo { ovk, note, memo });
        self.state = BuilderState::Accumulating;
        Ok(())
    }

    pub fn add_transparent_input(
        &mut self,
        outpoint: OutPoint,
        script_pubkey: Script,
        value: Amount,
    ) -> BuilderResult<()> {
        if self.keystore.is_none() {
            return Err(BuilderError::MissingKeystore);
        }
        if !money_range(value) {
            return Err(BuilderError::ValueOutOfRange);
        }

        self.mtx.vin.push(TxIn::new(outpoint));
        self.t_ins.push(TransparentInputInfo {
            script_pubkey,
            value,
        });
        self.state = BuilderState::Accumulating;
        Ok(())
    }

    pub fn add_transparent_output(&mut self, script_pubkey: Script, value: Amount) -> BuilderResult<()> {
        if script_pubkey.solve().is_none() {
            return Err(BuilderError::InvalidTransparentOutput);
        }
        if !money_range(value) {
            return Err(BuilderError::ValueOutOfRange);
        }

        self.mtx.vout.push(TxOut::new(value, script_pubkey));
        self.state = BuilderState::Accumulating;
        Ok(())
    }

    pub fn set_fee(&mut self, fee: Amount) {
        self.fee = Some(fee);
    }

    pub fn send_change_to_shielded(&mut self, address: PaymentAddress, ovk: OutgoingViewingKey) {
        self.change = ChangeDestination::Shielded { address, ovk };
    }

    pub fn send_change_to_transparent(&mut self, key_id: KeyId) {
        self.change = ChangeDestination::Transparent(key_id);
    }

    pub fn value_balance(&self) -> Amount {
        self.mtx.value_balance()
    }

    /// The fee, including any dust folded into it by [`Self::build`]
    pub fn fee(&self) -> Option<Amount> {
        self.fee
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    pub fn has_sapling_data(&self) -> bool {
        !self.spends.is_empty() || !self.outputs.is_empty()
    }

    pub fn transaction(&self) -> &Transaction {
        &self.mtx
    }

    /// The transaction once it carries real proofs and signatures
    pub fn finished_transaction(&self) -> Option<&Transaction> {
        (self.state == BuilderState::ProvenSigned).then_some(&self.mtx)
    }

    fn transparent_in(&self) -> BuilderResult<Amount> {
        self.t_ins
            .iter()
            .try_fold(0 as Amount, |acc, t_in| acc.checked_add(t_in.value))
            .ok_or(BuilderError::ValueOutOfRange)
    }

    /// value_balance + transparent in - transparent out - fee
    fn unallocated(&self, fee: Amount) -> BuilderResult<Amount> {
        let t_out = self.mtx.value_out().ok_or(BuilderError::ValueOutOfRange)?;
        self.value_balance()
            .checked_add(self.transparent_in()?)
            .and_then(|v| v.checked_sub(t_out))
            .and_then(|v| v.checked_sub(fee))
            .ok_or(BuilderError::ValueOutOfRange)
    }

    fn place_change(&mut self, change: Amount) -> BuilderResult<()> {
        match self.change.clone() {
            ChangeDestination::Shielded { address, ovk } => {
                debug!(target: "sapling", "sending change {} to configured shielded address", Money(change));
                self.add_sapling_output(ovk, address, change, Memo::empty())
            }
            ChangeDestination::Transparent(key_id) => {
                debug!(target: "sapling", "sending change {} to transparent address {}", Money(change), key_id);
                self.add_transparent_output(Script::p2pkh(&key_id), change)
            }
            ChangeDestination::Unset => {
                let (address, ovk) = match self.spends.first() {
                    Some(spend) => (*spend.note.recipient(), spend.expsk.ovk),
                    None => return Err(BuilderError::NoChangeAddress),
                };
                debug!(target: "sapling", "sending change {} back to the first spent note's address", Money(change));
                self.add_sapling_output(ovk, address, change, Memo::empty())
            }
        }
    }

    /// Place change and attach proofs and signatures, real or dummy.
    pub fn build<P: TxProver>(&mut self, prover: &P, dummy: bool) -> BuilderResult<()> {
        let mut fee = self.fee.ok_or(BuilderError::FeeNotSet)?;
        if fee < 0 {
            return Err(BuilderError::NegativeFee);
        }

        let change = self.unallocated(fee)?;
        if change < 0 {
            return Err(BuilderError::NegativeChange);
        }

        if change > 0 {
            let threshold = self.policy.dust_threshold_for(self.has_sapling_data());
            if change < threshold {
                debug!(
                    target: "sapling",
                    "folding dust change {} into fee (threshold {})",
                    Money(change),
                    Money(threshold)
                );
                fee += change;
                self.fee = Some(fee);
            } else {
                self.place_change(change)?;
            }
        }

        let residual = self.unallocated(fee)?;
        if residual != 0 {
            return Err(BuilderError::ValueNotConserved(Money(residual)));
        }

        if dummy {
            self.add_dummy_signatures()
        } else {
            self.prove_and_sign(prover)
        }
    }

    fn sign_transparent(&mut self, creator: SignatureCreator<'_>) -> BuilderResult<()> {
        for index in 0..self.mtx.vin.len() {
            let t_in = &self.t_ins[index];
            let script_sig = creator
                .produce_script_sig(&self.mtx, index, &t_in.script_pubkey, t_in.value)
                .ok_or(BuilderError::SigningFailed)?;
            self.mtx.vin[index].script_sig = script_sig;
        }
        Ok(())
    }

    fn add_dummy_signatures(&mut self) -> BuilderResult<()> {
        let spends = self.spends.len();
        let outputs = self.outputs.len();
        if let Some(sap) = self.mtx.sap_data.as_mut() {
            sap.spends = vec![SpendDescription::dummy(); spends];
            sap.outputs = vec![OutputDescription::dummy(); outputs];
            sap.binding_sig = [0xff; SIGNATURE_SIZE];
        }
        self.sign_transparent(SignatureCreator::Dummy)?;
        self.state = BuilderState::DummySigned;
        Ok(())
    }

    /// Generate output and spend proofs, then sign the shielded and
    /// transparent parts over the finished transaction.
    pub fn prove_and_sign<P: TxProver>(&mut self, prover: &P) -> BuilderResult<()> {
        if self.has_sapling_data() {
            let mut ctx = prover.new_sapling_proving_context();

            let mut output_descs = Vec::with_capacity(self.outputs.len());
            for output in &self.outputs {
                let recipient = output.note.recipient();
                let cmu = output.note.cmu();

                let encryptor = SaplingNoteEncryption::new(recipient.diversifier(), &mut OsRng)
                    .ok_or(BuilderError::InvalidOutput)?;
                let ephemeral_key = encryptor.epk().to_bytes();
                let plaintext = NotePlaintext::from_note(&output.note, output.memo.clone());
                let (enc_ciphertext, outgoing) = encryptor
                    .encrypt_to_recipient(recipient.pk_d(), &plaintext)
                    .ok_or(BuilderError::InvalidOutput)?;

                let proof = prover
                    .output_proof(&mut ctx, outgoing.esk(), recipient, output.note.rcm(), output.note.value())
                    .map_err(|e| BuilderError::OutputProofFailed(e.to_string()))?;
                let cv = proof.cv.to_bytes();

                let out_plaintext = OutgoingPlaintext::new(*recipient.pk_d(), *outgoing.esk());
                let out_ciphertext = outgoing
                    .encrypt_to_ourselves(&output.ovk, &cv, &cmu, &out_plaintext)
                    .ok_or(BuilderError::InvalidOutput)?;

                output_descs.push(OutputDescription {
                    cv,
                    cmu,
                    ephemeral_key,
                    enc_ciphertext,
                    out_ciphertext,
                    zkproof: proof.zkproof,
                });
            }

            let mut spend_descs = Vec::with_capacity(self.spends.len());
            for spend in &self.spends {
                let nk = spend.expsk.proof_generation_key().nk();
                let nullifier = spend.note.nullifier(&nk, spend.witness.position());

                let proof = prover
                    .spend_proof(
                        &mut ctx,
                        spend.expsk.proof_generation_key(),
                        spend.note.recipient().diversifier(),
                        spend.note.rcm(),
                        &spend.alpha,
                        spend.note.value(),
                        &spend.anchor,
                        &spend.witness,
                    )
                    .map_err(|e| BuilderError::SpendProofFailed(e.to_string()))?;

                spend_descs.push(SpendDescription {
                    cv: proof.cv.to_bytes(),
                    anchor: spend.anchor,
                    nullifier: nullifier.0,
                    rk: proof.rk.to_bytes(),
                    zkproof: proof.zkproof,
                    spend_auth_sig: [0u8; SIGNATURE_SIZE],
                });
            }

            let sap = self.sap_data_mut()?;
            sap.outputs = output_descs;
            sap.spends = spend_descs;
            sap.binding_sig = [0u8; SIGNATURE_SIZE];

            let sighash = signature_hash(&self.mtx, None, SIGHASH_ALL);

            let mut spend_sigs = Vec::with_capacity(self.spends.len());
            for spend in &self.spends {
                let sig = prover
                    .spend_sig(&spend.expsk.ask, &spend.alpha, &sighash)
                    .map_err(|_| BuilderError::SpendSigFailed)?;
                spend_sigs.push(sig.to_bytes());
            }
            let binding_sig = prover
                .binding_sig(&mut ctx, self.value_balance(), &sighash)
                .map_err(|_| BuilderError::BindingSigFailed)?;

            let sap = self.sap_data_mut()?;
            for (desc, sig) in sap.spends.iter_mut().zip(spend_sigs) {
                desc.spend_auth_sig = sig;
            }
            sap.binding_sig = binding_sig.to_bytes();
        }

        let keystore = self.keystore;
        match keystore {
            Some(keystore) => self.sign_transparent(SignatureCreator::Key(keystore))?,
            None if self.mtx.vin.is_empty() => {}
            None => return Err(BuilderError::SigningFailed),
        }

        self.state = BuilderState::ProvenSigned;
        info!(
            target: "sapling",
            "built transaction with {} spends, {} outputs, {} transparent inputs",
            self.spends.len(),
            self.outputs.len(),
            self.mtx.vin.len()
        );
        Ok(())
    }

    /// Drop proofs and signatures, keeping everything accumulated
    pub fn clear_proofs_and_signatures(&mut self) {
        if let Some(sap) = self.mtx.sap_data.as_mut() {
            sap.spends.clear();
            sap.outputs.clear();
            sap.binding_sig = [0u8; SIGNATURE_SIZE];
        }
        for input in &mut self.mtx.vin {
            input.script_sig = Script::new();
        }
        if self.state != BuilderState::Empty {
            self.state = BuilderState::Accumulating;
        }
    }

    /// Back to an empty transaction; the keystore and policy are kept
    pub fn clear(&mut self) {
        self.mtx = Transaction::new(self.params.tx_version(self.height));
        self.fee = None;
        self.spends.clear();
        self.outputs.clear();
        self.t_ins.clear();
        self.change = ChangeDestination::Unset;
        self.state = BuilderState::Empty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prover::MockTxProver;
    use sapling_primitives::crypto::{try_sapling_output_recovery, SpendingKey};
    use sapling_primitives::validation::{
        check_sapling_signatures, check_sapling_structure, check_transparent_signatures,
    };
    use sapling_primitives::{MerkleTree, TxId, COIN};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Funded {
        sk: SpendingKey,
        notes: Vec<Note>,
        tree: MerkleTree,
    }

    fn funded(seed: u64, values: &[Amount]) -> Funded {
        let mut rng = StdRng::seed_from_u64(seed);
        let sk = SpendingKey::random(&mut rng);
        let address = sk.default_address().unwrap();
        let notes: Vec<Note> = values
            .iter()
            .map(|v| Note::random(address, *v as u64, &mut rng))
            .collect();
        let mut leaves = vec![[1u8; 32]];
        leaves.extend(notes.iter().map(|n| n.cmu()));
        Funded {
            sk,
            notes,
            tree: MerkleTree::from_leaves(&leaves),
        }
    }

    fn recipient(seed: u64) -> PaymentAddress {
        SpendingKey::random(&mut StdRng::seed_from_u64(seed))
            .default_address()
            .unwrap()
    }

    fn builder<'a>(keystore: Option<&'a TransparentKeyStore>) -> TransactionBuilder<'a> {
        TransactionBuilder::new(ConsensusParams::default(), 10, FeePolicy::default(), keystore)
    }

    fn add_spend(builder: &mut TransactionBuilder<'_>, f: &Funded, i: usize) -> BuilderResult<()> {
        builder.add_sapling_spend(
            f.sk.expanded_spending_key(),
            f.notes[i].clone(),
            f.tree.root(),
            f.tree.witness(i as u64 + 1).unwrap(),
        )
    }

    #[test]
    fn test_anchor_mismatch_is_contract_violation() {
        let a = funded(1, &[100]);
        let b = funded(2, &[100]);
        let mut builder = builder(None);
        assert_eq!(builder.state(), BuilderState::Empty);
        add_spend(&mut builder, &a, 0).unwrap();
        assert_eq!(builder.state(), BuilderState::Accumulating);

        let err = add_spend(&mut builder, &b, 0).unwrap_err();
        assert_eq!(err, BuilderError::AnchorMismatch);
        assert!(err.is_contract_violation());
        assert_eq!(builder.value_balance(), 100);
    }

    #[test]
    fn test_pre_sapling_rejects_shielded() {
        let params = ConsensusParams {
            sapling_activation_height: 100,
            ..Default::default()
        };
        let mut builder = TransactionBuilder::new(params, 50, FeePolicy::default(), None);
        let err = builder
            .add_sapling_output(OutgoingViewingKey([0u8; 32]), recipient(3), 10, Memo::empty())
            .unwrap_err();
        assert_eq!(err, BuilderError::SaplingNotActive(50));
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_transparent_input_requires_keystore() {
        let mut builder = builder(None);
        let result = builder.add_transparent_input(
            OutPoint::new(TxId([1u8; 32]), 0),
            Script::p2pkh(&KeyId([1u8; 20])),
            COIN,
        );
        assert_eq!(result, Err(BuilderError::MissingKeystore));
        assert_eq!(
            BuilderError::MissingKeystore.to_string(),
            "Cannot add transparent inputs to a TransactionBuilder without a keystore"
        );
    }

    #[test]
    fn test_rejects_nonstandard_output_and_bad_values() {
        let mut builder = builder(None);
        assert_eq!(
            builder.add_transparent_output(Script(vec![0x51]), 10),
            Err(BuilderError::InvalidTransparentOutput)
        );
        assert_eq!(
            builder.add_transparent_output(Script::p2pkh(&KeyId([1u8; 20])), -1),
            Err(BuilderError::ValueOutOfRange)
        );
    }

    #[test]
    fn test_value_balance_tracks_spends_and_outputs() {
        let f = funded(4, &[700, 300]);
        let mut builder = builder(None);
        add_spend(&mut builder, &f, 0).unwrap();
        add_spend(&mut builder, &f, 1).unwrap();
        builder
            .add_sapling_output(OutgoingViewingKey([0u8; 32]), recipient(5), 250, Memo::empty())
            .unwrap();
        assert_eq!(builder.value_balance(), 750);
    }

    #[test]
    fn test_fee_checks() {
        let f = funded(6, &[COIN]);
        let mut builder = builder(None);
        add_spend(&mut builder, &f, 0).unwrap();
        let prover = MockTxProver::new();

        assert_eq!(builder.build(&prover, true), Err(BuilderError::FeeNotSet));
        builder.set_fee(-1);
        assert_eq!(builder.build(&prover, true), Err(BuilderError::NegativeFee));
        builder.set_fee(COIN + 1);
        assert_eq!(builder.build(&prover, true), Err(BuilderError::NegativeChange));
    }

    #[test]
    fn test_no_change_address() {
        let mut keystore = TransparentKeyStore::new();
        let id = keystore.generate();
        let mut builder = builder(Some(&keystore));
        builder
            .add_transparent_input(OutPoint::new(TxId([2u8; 32]), 0), Script::p2pkh(&id), COIN)
            .unwrap();
        builder.set_fee(10_000);
        assert_eq!(
            builder.build(&MockTxProver::new(), true),
            Err(BuilderError::NoChangeAddress)
        );
    }

    #[test]
    fn test_change_returns_to_spent_address() {
        let f = funded(7, &[10 * COIN]);
        let expsk = f.sk.expanded_spending_key();
        let mut builder = builder(None);
        add_spend(&mut builder, &f, 0).unwrap();
        builder
            .add_sapling_output(expsk.ovk, recipient(8), COIN, Memo::empty())
            .unwrap();
        builder.set_fee(10_000);
        builder.build(&MockTxProver::new(), false).unwrap();

        let tx = builder.finished_transaction().unwrap().clone();
        let sap = tx.sap_data.as_ref().unwrap();
        assert_eq!(sap.outputs.len(), 2);
        assert_eq!(sap.value_balance, 10_000);

        let change = &sap.outputs[1];
        let (note, address, memo) = try_sapling_output_recovery(
            &expsk.ovk,
            &change.cv,
            &change.cmu,
            &change.ephemeral_key,
            &change.enc_ciphertext,
            &change.out_ciphertext,
        )
        .unwrap();
        assert_eq!(address, *f.notes[0].recipient());
        assert_eq!(note.value() as Amount, 9 * COIN - 10_000);
        assert!(memo.is_empty());

        assert_eq!(check_sapling_structure(&tx), Ok(()));
        assert_eq!(check_sapling_signatures(&tx), Ok(()));
    }

    #[test]
    fn test_dust_change_folds_into_fee() {
        let f = funded(9, &[COIN]);
        let mut builder = builder(None);
        add_spend(&mut builder, &f, 0).unwrap();
        let threshold = FeePolicy::default().shielded_dust_threshold();
        let sent = COIN - 10_000 - (threshold - 1);
        builder
            .add_sapling_output(OutgoingViewingKey([0u8; 32]), recipient(10), sent, Memo::empty())
            .unwrap();
        builder.set_fee(10_000);
        builder.build(&MockTxProver::new(), true).unwrap();

        assert_eq!(builder.state(), BuilderState::DummySigned);
        assert_eq!(builder.fee(), Some(10_000 + threshold - 1));
        assert_eq!(builder.transaction().sap_data.as_ref().unwrap().outputs.len(), 1);
    }

    #[test]
    fn test_change_at_threshold_is_kept() {
        let f = funded(11, &[COIN]);
        let mut builder = builder(None);
        add_spend(&mut builder, &f, 0).unwrap();
        let threshold = FeePolicy::default().shielded_dust_threshold();
        builder
            .add_sapling_output(OutgoingViewingKey([0u8; 32]), recipient(12), COIN - 10_000 - threshold, Memo::empty())
            .unwrap();
        builder.set_fee(10_000);
        builder.build(&MockTxProver::new(), true).unwrap();

        assert_eq!(builder.fee(), Some(10_000));
        assert_eq!(builder.transaction().sap_data.as_ref().unwrap().outputs.len(), 2);
    }

    #[test]
    fn test_last_change_destination_wins() {
        let mut keystore = TransparentKeyStore::new();
        let input_key = keystore.generate();
        let change_key = keystore.generate();

        let mut builder = builder(Some(&keystore));
        builder.send_change_to_shielded(recipient(13), OutgoingViewingKey([1u8; 32]));
        builder.send_change_to_transparent(change_key);
        builder
            .add_transparent_input(OutPoint::new(TxId([3u8; 32]), 1), Script::p2pkh(&input_key), COIN)
            .unwrap();
        builder
            .add_transparent_output(Script::p2pkh(&KeyId([4u8; 20])), COIN / 2)
            .unwrap();
        builder.set_fee(10_000);
        builder.build(&MockTxProver::new(), false).unwrap();

        let tx = builder.transaction();
        assert!(!tx.is_shielded());
        assert_eq!(tx.vout.len(), 2);
        assert_eq!(tx.vout[1], TxOut::new(COIN / 2 - 10_000, Script::p2pkh(&change_key)));

        let prev = [TxOut::new(COIN, Script::p2pkh(&input_key))];
        assert_eq!(check_transparent_signatures(tx, &prev), Ok(()));
    }

    #[test]
    fn test_dummy_and_real_sizes_match() {
        let f = funded(14, &[5 * COIN]);
        let expsk = f.sk.expanded_spending_key();
        let mut keystore = TransparentKeyStore::new();
        let t_key = keystore.generate();

        let mut builder = builder(Some(&keystore));
        add_spend(&mut builder, &f, 0).unwrap();
        builder
            .add_transparent_input(OutPoint::new(TxId([5u8; 32]), 0), Script::p2pkh(&t_key), COIN)
            .unwrap();
        builder
            .add_sapling_output(expsk.ovk, recipient(15), 2 * COIN, Memo::from_bytes(b"hi").unwrap())
            .unwrap();
        builder
            .add_transparent_output(Script::p2pkh(&KeyId([6u8; 20])), COIN)
            .unwrap();
        builder.set_fee(100_000);

        builder.build(&MockTxProver::new(), true).unwrap();
        let dummy_size = builder.transaction().serialized_size().unwrap();

        builder.clear_proofs_and_signatures();
        assert_eq!(builder.state(), BuilderState::Accumulating);
        assert!(builder.finished_transaction().is_none());

        builder.prove_and_sign(&MockTxProver::new()).unwrap();
        let tx = builder.finished_transaction().unwrap();
        assert_eq!(tx.serialized_size().unwrap(), dummy_size);

        // value conservation: (t_in + shielded_in) - (t_out + shielded_out) - fee == 0
        let sap = tx.sap_data.as_ref().unwrap();
        assert_eq!(sap.value_balance, 5 * COIN - 2 * COIN - (3 * COIN - 100_000));
        assert_eq!(sap.value_balance + COIN - tx.value_out().unwrap() - builder.fee().unwrap(), 0);
    }

    #[test]
    fn test_proof_failure_aborts() {
        let f = funded(16, &[COIN]);
        let mut builder = builder(None);
        add_spend(&mut builder, &f, 0).unwrap();
        builder.set_fee(COIN);
        let err = builder.build(&MockTxProver::rejecting(), false).unwrap_err();
        assert!(matches!(err, BuilderError::SpendProofFailed(_)));
        assert!(builder.finished_transaction().is_none());
    }

    #[test]
    fn test_clear_resets() {
        let f = funded(17, &[COIN]);
        let mut builder = builder(None);
        add_spend(&mut builder, &f, 0).unwrap();
        builder.set_fee(1);
        builder.clear();
        assert_eq!(builder.state(), BuilderState::Empty);
        assert_eq!(builder.value_balance(), 0);
        assert_eq!(builder.fee(), None);
        assert!(!builder.has_sapling_data());
    }
}
