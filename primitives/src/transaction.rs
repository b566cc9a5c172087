//! Transaction layout
//!
//! A transaction carries transparent inputs/outputs and, from the Sapling
//! version on, a shielded bundle. The borsh encoding is the wire format and
//! the size fees are computed from.

use std::fmt;
use std::io;

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};

use crate::amount::Amount;
use crate::crypto::note::Nullifier;
use crate::script::Script;
use crate::{OutputDescription, SpendDescription, SIGNATURE_SIZE};

pub const TX_VERSION_LEGACY: u16 = 1;
pub const TX_VERSION_SAPLING: u16 = 3;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub struct TxId(pub [u8; 32]);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub struct OutPoint {
    pub txid: TxId,
    pub n: u32,
}

impl OutPoint {
    pub fn new(txid: TxId, n: u32) -> Self {
        Self { txid, n }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
}

impl TxIn {
    pub fn new(prevout: OutPoint) -> Self {
        Self {
            prevout,
            script_sig: Script::new(),
            sequence: u32::MAX,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TxOut {
    pub value: Amount,
    pub script_pubkey: Script,
}

impl TxOut {
    pub fn new(value: Amount, script_pubkey: Script) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }
}

/// Shielded bundle of a Sapling-version transaction
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SaplingTxData {
    /// Net value moved from the shielded pool into the transparent pool
    pub value_balance: Amount,
    pub spends: Vec<SpendDescription>,
    pub outputs: Vec<OutputDescription>,
    pub binding_sig: [u8; SIGNATURE_SIZE],
}

impl Default for SaplingTxData {
    fn default() -> Self {
        Self {
            value_balance: 0,
            spends: Vec::new(),
            outputs: Vec::new(),
            binding_sig: [0u8; SIGNATURE_SIZE],
        }
    }
}

impl SaplingTxData {
    pub fn has_descriptions(&self) -> bool {
        !self.spends.is_empty() || !self.outputs.is_empty()
    }

    pub fn nullifiers(&self) -> Vec<Nullifier> {
        self.spends.iter().map(|s| Nullifier(s.nullifier)).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub version: u16,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub lock_time: u32,
    pub sap_data: Option<SaplingTxData>,
}

impl Transaction {
    /// Empty transaction; Sapling versions carry an empty shielded bundle
    pub fn new(version: u16) -> Self {
        Self {
            version,
            vin: Vec::new(),
            vout: Vec::new(),
            lock_time: 0,
            sap_data: (version >= TX_VERSION_SAPLING).then(SaplingTxData::default),
        }
    }

    pub fn is_sapling_version(&self) -> bool {
        self.version >= TX_VERSION_SAPLING
    }

    /// Whether the transaction has any spend or output description
    pub fn is_shielded(&self) -> bool {
        self.sap_data
            .as_ref()
            .map_or(false, SaplingTxData::has_descriptions)
    }

    pub fn value_balance(&self) -> Amount {
        self.sap_data.as_ref().map_or(0, |sap| sap.value_balance)
    }

    /// Sum of transparent output values, `None` on overflow
    pub fn value_out(&self) -> Option<Amount> {
        self.vout
            .iter()
            .try_fold(0 as Amount, |acc, out| acc.checked_add(out.value))
    }

    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        borsh::to_vec(self)
    }

    pub fn serialized_size(&self) -> io::Result<usize> {
        Ok(self.to_bytes()?.len())
    }

    /// Double SHA-256 of the encoding
    pub fn txid(&self) -> io::Result<TxId> {
        let first = Sha256::digest(self.to_bytes()?);
        let second = Sha256::digest(first);

        let mut id = [0u8; 32];
        id.copy_from_slice(&second);
        Ok(TxId(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::KeyId;
    use crate::{OUTPUT_DESCRIPTION_SIZE, SPEND_DESCRIPTION_SIZE};

    #[test]
    fn test_new_sets_bundle_by_version() {
        assert!(Transaction::new(TX_VERSION_LEGACY).sap_data.is_none());
        assert!(Transaction::new(TX_VERSION_SAPLING).sap_data.is_some());
        assert!(!Transaction::new(TX_VERSION_SAPLING).is_shielded());
    }

    #[test]
    fn test_size_grows_by_description_size() {
        let mut tx = Transaction::new(TX_VERSION_SAPLING);
        let base = tx.serialized_size().unwrap();

        let sap = tx.sap_data.as_mut().unwrap();
        sap.spends.push(SpendDescription::dummy());
        sap.outputs.push(OutputDescription::dummy());
        assert!(tx.is_shielded());
        assert_eq!(
            tx.serialized_size().unwrap(),
            base + SPEND_DESCRIPTION_SIZE + OUTPUT_DESCRIPTION_SIZE
        );
    }

    #[test]
    fn test_txid_changes_with_contents() {
        let mut tx = Transaction::new(TX_VERSION_SAPLING);
        let before = tx.txid().unwrap();
        tx.vout.push(TxOut::new(5, Script::p2pkh(&KeyId([1u8; 20]))));
        assert_ne!(tx.txid().unwrap(), before);
        assert_eq!(tx.value_out(), Some(5));
    }
}
