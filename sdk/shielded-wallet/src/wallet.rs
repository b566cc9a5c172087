//! In-memory wallet backing the shielded send operation
//!
//! Holds spending keys, the note commitment tree, decrypted notes with their
//! cached witness positions and nullifiers, and transparent coins. Committed
//! transactions are validated, their nullifiers recorded, and their outputs
//! scanned for anything paying back to the wallet.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info};
use rand_core::{OsRng, RngCore};

use sapling_primitives::crypto::{
    try_sapling_note_decryption, ExpandedSpendingKey, FullViewingKey, IncomingViewingKey, Memo,
    Note, Nullifier, OutgoingViewingKey, PaymentAddress, SpendingKey,
};
use sapling_primitives::script::{KeyId, Script, ScriptTemplate};
use sapling_primitives::validation::{
    check_sapling_signatures, check_sapling_structure, check_transaction_size,
    check_transparent_signatures,
};
use sapling_primitives::{
    Amount, ConsensusParams, MerklePath, MerkleTree, Money, NullifierSet, OutPoint, Transaction, TxId, TxOut,
};

use crate::backend::{
    CachedNoteData, CoinControl, NoteIndex, SaplingNoteEntry, SaplingOutPoint,
    TransactionCommitter, Utxo, UtxoSource,
};
use crate::signing::TransparentKeyStore;

struct WalletKey {
    expsk: ExpandedSpendingKey,
    fvk: FullViewingKey,
    ivk: IncomingViewingKey,
}

struct NoteRecord {
    address: PaymentAddress,
    note: Note,
    memo: Memo,
    confirmations: u32,
    witness_position: Option<u64>,
    nullifier: Option<Nullifier>,
    dirty: bool,
}

struct CoinRecord {
    txout: TxOut,
    depth: u32,
}

#[derive(Default)]
struct WalletState {
    notes: BTreeMap<SaplingOutPoint, NoteRecord>,
    /// Commitment tree leaves in insertion order
    leaves: Vec<[u8; 32]>,
    coins: BTreeMap<OutPoint, CoinRecord>,
    spent: NullifierSet,
    committed: Vec<TxId>,
    /// Source of synthetic txids for credited funds
    credits: u32,
}

impl WalletState {
    fn next_credit_txid(&mut self) -> TxId {
        self.credits += 1;
        let mut txid = [0xcc; 32];
        txid[..4].copy_from_slice(&self.credits.to_le_bytes());
        TxId(txid)
    }

    fn is_note_spent(&self, record: &NoteRecord) -> bool {
        record
            .nullifier
            .map_or(false, |nf| self.spent.contains(&nf))
    }
}

pub struct InMemoryWallet {
    keys: HashMap<[u8; 43], WalletKey>,
    keystore: TransparentKeyStore,
    change_key: Option<KeyId>,
    common_ovk: OutgoingViewingKey,
    /// Largest encoded transaction accepted by `commit_transaction`
    max_tx_size: usize,
    state: RwLock<WalletState>,
}

impl Default for InMemoryWallet {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWallet {
    /// Empty wallet with a fresh transparent change key
    pub fn new() -> Self {
        let mut keystore = TransparentKeyStore::new();
        let change_key = keystore.generate();
        let mut ovk = [0u8; 32];
        OsRng.fill_bytes(&mut ovk);

        Self {
            keys: HashMap::new(),
            keystore,
            change_key: Some(change_key),
            common_ovk: OutgoingViewingKey(ovk),
            max_tx_size: ConsensusParams::default().max_tx_size_after_sapling,
            state: RwLock::new(WalletState::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, WalletState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WalletState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `sk`; returns its default address
    pub fn add_spending_key(&mut self, sk: &SpendingKey) -> Option<PaymentAddress> {
        let address = sk.default_address()?;
        let expsk = sk.expanded_spending_key();
        let fvk = expsk.full_viewing_key();
        let ivk = fvk.in_viewing_key();
        self.keys.insert(address.to_bytes(), WalletKey { expsk, fvk, ivk });
        Some(address)
    }

    pub fn add_transparent_key(&mut self) -> KeyId {
        self.keystore.generate()
    }

    pub fn set_change_key(&mut self, key: Option<KeyId>) {
        self.change_key = key;
    }

    pub fn set_max_tx_size(&mut self, max: usize) {
        self.max_tx_size = max;
    }

    /// Credit a note to `address`, appending its commitment to the tree.
    /// The nullifier is cached when the address belongs to the wallet.
    pub fn receive_note(
        &self,
        address: PaymentAddress,
        value: u64,
        memo: Memo,
        confirmations: u32,
    ) -> SaplingOutPoint {
        let note = Note::random(address, value, &mut OsRng);
        let mut state = self.write();
        let position = state.leaves.len() as u64;
        state.leaves.push(note.cmu());

        let nullifier = self
            .keys
            .get(&address.to_bytes())
            .map(|key| note.nullifier(&key.fvk.nk, position));
        let op = SaplingOutPoint::new(state.next_credit_txid(), 0);
        state.notes.insert(
            op,
            NoteRecord {
                address,
                note,
                memo,
                confirmations,
                witness_position: Some(position),
                nullifier,
                dirty: false,
            },
        );
        op
    }

    pub fn receive_coin(&self, key_id: &KeyId, value: Amount, depth: u32) -> OutPoint {
        let mut state = self.write();
        let outpoint = OutPoint::new(state.next_credit_txid(), 0);
        state.coins.insert(
            outpoint,
            CoinRecord {
                txout: TxOut::new(value, Script::p2pkh(key_id)),
                depth,
            },
        );
        outpoint
    }

    /// Add `blocks` confirmations to every note and coin
    pub fn mine_blocks(&self, blocks: u32) {
        let mut state = self.write();
        for record in state.notes.values_mut() {
            record.confirmations = record.confirmations.saturating_add(blocks);
        }
        for coin in state.coins.values_mut() {
            coin.depth = coin.depth.saturating_add(blocks);
        }
    }

    /// Record a nullifier revealed outside this wallet
    pub fn mark_nullifier_spent(&self, nullifier: Nullifier) -> bool {
        self.write().spent.insert(nullifier).is_ok()
    }

    pub fn forget_nullifier(&self, op: &SaplingOutPoint) {
        if let Some(record) = self.write().notes.get_mut(op) {
            record.nullifier = None;
        }
    }

    pub fn drop_witness(&self, op: &SaplingOutPoint) {
        if let Some(record) = self.write().notes.get_mut(op) {
            record.witness_position = None;
        }
    }

    pub fn is_dirty(&self, op: &SaplingOutPoint) -> bool {
        self.read().notes.get(op).map_or(false, |record| record.dirty)
    }

    pub fn nullifier(&self, op: &SaplingOutPoint) -> Option<Nullifier> {
        self.read().notes.get(op).and_then(|record| record.nullifier)
    }

    /// Value of unspent notes with at least `min_depth` confirmations
    pub fn shielded_balance(&self, min_depth: u32) -> u64 {
        let state = self.read();
        state
            .notes
            .values()
            .filter(|record| record.confirmations >= min_depth && !state.is_note_spent(record))
            .filter(|record| self.keys.contains_key(&record.address.to_bytes()))
            .map(|record| record.note.value())
            .sum()
    }

    pub fn transparent_balance(&self, min_depth: u32) -> Amount {
        self.read()
            .coins
            .values()
            .filter(|coin| coin.depth >= min_depth)
            .map(|coin| coin.txout.value)
            .sum()
    }

    pub fn committed_transactions(&self) -> Vec<TxId> {
        self.read().committed.clone()
    }

    fn entry(op: &SaplingOutPoint, record: &NoteRecord) -> SaplingNoteEntry {
        SaplingNoteEntry {
            op: *op,
            address: record.address,
            note: record.note.clone(),
            memo: record.memo.clone(),
            confirmations: record.confirmations,
        }
    }

    /// Append every output commitment to the tree and keep the outputs
    /// that decrypt under one of the wallet's keys
    fn scan_transaction(&self, state: &mut WalletState, tx: &Transaction, txid: TxId) {
        if let Some(sap) = &tx.sap_data {
            for (n, output) in sap.outputs.iter().enumerate() {
                let position = state.leaves.len() as u64;
                state.leaves.push(output.cmu);

                let found = self.keys.values().find_map(|key| {
                    try_sapling_note_decryption(
                        &key.ivk,
                        &output.ephemeral_key,
                        &output.cmu,
                        &output.enc_ciphertext,
                    )
                    .map(|decrypted| (key, decrypted))
                });
                if let Some((key, (note, address, memo))) = found {
                    debug!(
                        target: "sapling",
                        "received note {}:{} worth {}",
                        txid,
                        n,
                        Money(note.value() as Amount)
                    );
                    let nullifier = note.nullifier(&key.fvk.nk, position);
                    state.notes.insert(
                        SaplingOutPoint::new(txid, n as u32),
                        NoteRecord {
                            address,
                            note,
                            memo,
                            confirmations: 0,
                            witness_position: Some(position),
                            nullifier: Some(nullifier),
                            dirty: false,
                        },
                    );
                }
            }
        }

        for (n, txout) in tx.vout.iter().enumerate() {
            if let Some(ScriptTemplate::PubKeyHash(key_id)) = txout.script_pubkey.solve() {
                if self.keystore.contains(&key_id) {
                    state.coins.insert(
                        OutPoint::new(txid, n as u32),
                        CoinRecord {
                            txout: txout.clone(),
                            depth: 0,
                        },
                    );
                }
            }
        }
    }
}

impl NoteIndex for InMemoryWallet {
    fn get_notes(&self, outpoints: &[SaplingOutPoint]) -> Vec<SaplingNoteEntry> {
        let state = self.read();
        outpoints
            .iter()
            .filter_map(|op| state.notes.get(op).map(|record| (op, record)))
            .filter(|(_, record)| !state.is_note_spent(record))
            .map(|(op, record)| Self::entry(op, record))
            .collect()
    }

    fn get_filtered_notes(&self, address: Option<&PaymentAddress>, min_depth: u32) -> Vec<SaplingNoteEntry> {
        let state = self.read();
        state
            .notes
            .iter()
            .filter(|(_, record)| record.confirmations >= min_depth)
            .filter(|(_, record)| address.map_or(true, |a| *a == record.address))
            .filter(|(_, record)| self.keys.contains_key(&record.address.to_bytes()))
            .filter(|(_, record)| !state.is_note_spent(record))
            .map(|(op, record)| Self::entry(op, record))
            .collect()
    }

    fn get_witnesses_and_anchor(&self, outpoints: &[SaplingOutPoint]) -> (Vec<Option<MerklePath>>, [u8; 32]) {
        let state = self.read();
        let tree = MerkleTree::from_leaves(&state.leaves);
        let witnesses = outpoints
            .iter()
            .map(|op| {
                state
                    .notes
                    .get(op)
                    .and_then(|record| record.witness_position)
                    .and_then(|position| tree.witness(position))
            })
            .collect();
        (witnesses, tree.root())
    }

    fn is_spent(&self, nullifier: &Nullifier) -> bool {
        self.read().spent.contains(nullifier)
    }

    fn cached_note(&self, op: &SaplingOutPoint) -> Option<CachedNoteData> {
        self.read().notes.get(op).map(|record| CachedNoteData {
            witness_position: record.witness_position,
            nullifier: record.nullifier,
        })
    }

    fn update_nullifier_cache(&self, op: &SaplingOutPoint, nullifier: Nullifier) {
        if let Some(record) = self.write().notes.get_mut(op) {
            record.nullifier = Some(nullifier);
        }
    }

    fn mark_dirty(&self, op: &SaplingOutPoint) {
        if let Some(record) = self.write().notes.get_mut(op) {
            record.dirty = true;
        }
    }

    fn spending_key_for(&self, address: &PaymentAddress) -> Option<ExpandedSpendingKey> {
        self.keys.get(&address.to_bytes()).map(|key| key.expsk.clone())
    }

    fn full_viewing_key_for(&self, address: &PaymentAddress) -> Option<FullViewingKey> {
        self.keys.get(&address.to_bytes()).map(|key| key.fvk.clone())
    }

    fn common_ovk(&self) -> OutgoingViewingKey {
        self.common_ovk
    }
}

impl UtxoSource for InMemoryWallet {
    fn available_coins(
        &self,
        from: Option<&KeyId>,
        min_depth: u32,
        coin_control: Option<&CoinControl>,
    ) -> Vec<Utxo> {
        let state = self.read();
        let to_utxo = |(outpoint, coin): (&OutPoint, &CoinRecord)| Utxo {
            outpoint: *outpoint,
            value: coin.txout.value,
            script_pubkey: coin.txout.script_pubkey.clone(),
            depth: coin.depth,
        };

        match coin_control.filter(|cc| cc.has_transparent()) {
            Some(cc) => cc
                .transparent
                .iter()
                .filter_map(|op| state.coins.get_key_value(op))
                .map(to_utxo)
                .collect(),
            None => {
                let from_script = from.map(Script::p2pkh);
                state
                    .coins
                    .iter()
                    .filter(|(_, coin)| coin.depth >= min_depth)
                    .filter(|(_, coin)| {
                        from_script
                            .as_ref()
                            .map_or(true, |script| *script == coin.txout.script_pubkey)
                    })
                    .map(to_utxo)
                    .collect()
            }
        }
    }

    fn reserve_change_key(&self) -> Option<KeyId> {
        self.change_key
    }

    fn transparent_keystore(&self) -> Option<&TransparentKeyStore> {
        Some(&self.keystore)
    }
}

impl TransactionCommitter for InMemoryWallet {
    fn commit_transaction(&self, tx: &Transaction) -> Result<(), String> {
        check_sapling_structure(tx).map_err(|e| e.to_string())?;
        check_transaction_size(tx, self.max_tx_size).map_err(|e| e.to_string())?;
        check_sapling_signatures(tx).map_err(|e| e.to_string())?;
        let txid = tx.txid().map_err(|e| e.to_string())?;

        let mut state = self.write();
        let prev_outputs = tx
            .vin
            .iter()
            .map(|txin| {
                state
                    .coins
                    .get(&txin.prevout)
                    .map(|coin| coin.txout.clone())
                    .ok_or_else(|| format!("unknown input {}:{}", txin.prevout.txid, txin.prevout.n))
            })
            .collect::<Result<Vec<_>, _>>()?;
        check_transparent_signatures(tx, &prev_outputs).map_err(|e| e.to_string())?;

        if let Some(sap) = &tx.sap_data {
            state
                .spent
                .insert_all(&sap.nullifiers())
                .map_err(|e| e.to_string())?;
        }
        for txin in &tx.vin {
            state.coins.remove(&txin.prevout);
        }
        self.scan_transaction(&mut state, tx, txid);
        state.committed.push(txid);

        info!(target: "sapling", "wallet committed transaction {}", txid);
        Ok(())
    }
}
