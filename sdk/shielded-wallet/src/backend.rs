//! Wallet-side collaborators of the shielded send operation
//!
//! The note/witness index, the transparent coin source and the commit step
//! are owned by the wallet. The operation only reads them, except for
//! caching nullifiers and marking notes dirty.

use sapling_primitives::crypto::{
    ExpandedSpendingKey, FullViewingKey, Memo, Note, Nullifier, OutgoingViewingKey, PaymentAddress,
};
use sapling_primitives::script::{KeyId, Script};
use sapling_primitives::{Amount, MerklePath, OutPoint, Transaction, TxId};

use crate::signing::TransparentKeyStore;

/// Location of a shielded output: transaction and output index
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SaplingOutPoint {
    pub txid: TxId,
    pub n: u32,
}

impl SaplingOutPoint {
    pub fn new(txid: TxId, n: u32) -> Self {
        Self { txid, n }
    }
}

/// A decrypted note the wallet can spend
#[derive(Clone, Debug)]
pub struct SaplingNoteEntry {
    pub op: SaplingOutPoint,
    pub address: PaymentAddress,
    pub note: Note,
    pub memo: Memo,
    pub confirmations: u32,
}

/// Per-note cache kept by the index
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CachedNoteData {
    /// Position of the note in the commitment tree, once witnessed
    pub witness_position: Option<u64>,
    pub nullifier: Option<Nullifier>,
}

/// A spendable transparent output
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub script_pubkey: Script,
    pub depth: u32,
}

/// Explicit funding selection overriding automatic selection
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoinControl {
    pub transparent: Vec<OutPoint>,
    pub shielded: Vec<SaplingOutPoint>,
}

impl CoinControl {
    pub fn has_transparent(&self) -> bool {
        !self.transparent.is_empty()
    }

    pub fn has_shielded(&self) -> bool {
        !self.shielded.is_empty()
    }
}

/// Note, witness and nullifier index
pub trait NoteIndex {
    /// The notes named by `outpoints`, whatever their depth
    fn get_notes(&self, outpoints: &[SaplingOutPoint]) -> Vec<SaplingNoteEntry>;

    /// Unspent notes with at least `min_depth` confirmations, optionally
    /// restricted to one address
    fn get_filtered_notes(&self, address: Option<&PaymentAddress>, min_depth: u32) -> Vec<SaplingNoteEntry>;

    /// One witness per outpoint (`None` where missing) and the anchor they share
    fn get_witnesses_and_anchor(&self, outpoints: &[SaplingOutPoint]) -> (Vec<Option<MerklePath>>, [u8; 32]);

    fn is_spent(&self, nullifier: &Nullifier) -> bool;

    fn cached_note(&self, op: &SaplingOutPoint) -> Option<CachedNoteData>;

    fn update_nullifier_cache(&self, op: &SaplingOutPoint, nullifier: Nullifier);

    /// Flag the note record for persistence; visible to subsequent reads
    fn mark_dirty(&self, op: &SaplingOutPoint);

    fn spending_key_for(&self, address: &PaymentAddress) -> Option<ExpandedSpendingKey>;

    fn full_viewing_key_for(&self, address: &PaymentAddress) -> Option<FullViewingKey>;

    /// ovk used when nothing is spent from the shielded pool
    fn common_ovk(&self) -> OutgoingViewingKey;
}

/// Transparent coins and keys
pub trait UtxoSource {
    fn available_coins(
        &self,
        from: Option<&KeyId>,
        min_depth: u32,
        coin_control: Option<&CoinControl>,
    ) -> Vec<Utxo>;

    /// A fresh key for transparent change
    fn reserve_change_key(&self) -> Option<KeyId>;

    fn transparent_keystore(&self) -> Option<&TransparentKeyStore>;
}

/// Accepts a finished transaction
pub trait TransactionCommitter {
    fn commit_transaction(&self, tx: &Transaction) -> Result<(), String>;
}
