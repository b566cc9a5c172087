//! Transparent scripts
//!
//! Only the standard templates a shielded wallet produces are understood:
//! pay-to-pubkey-hash outputs and OP_RETURN data carriers.

use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

pub const OP_DUP: u8 = 0x76;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_RETURN: u8 = 0x6a;

/// Largest push encodable with a single length opcode
const MAX_DIRECT_PUSH: usize = 75;

/// Hash160 of a public key
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize,
)]
pub struct KeyId(pub [u8; 20]);

impl KeyId {
    /// RIPEMD160(SHA256(pubkey))
    pub fn from_pubkey(pubkey: &[u8]) -> Self {
        let sha_hash = Sha256::digest(pubkey);
        let ripe_hash = Ripemd160::digest(sha_hash);

        let mut id = [0u8; 20];
        id.copy_from_slice(&ripe_hash);
        KeyId(id)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Recognized output templates
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptTemplate {
    PubKeyHash(KeyId),
    NullData,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Script(pub Vec<u8>);

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// OP_DUP OP_HASH160 <key id> OP_EQUALVERIFY OP_CHECKSIG
    pub fn p2pkh(key_id: &KeyId) -> Self {
        let mut script = Vec::with_capacity(25);
        script.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
        script.extend_from_slice(&key_id.0);
        script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        Script(script)
    }

    /// OP_RETURN <data>; `None` if the data needs more than a direct push
    pub fn null_data(data: &[u8]) -> Option<Self> {
        if data.len() > MAX_DIRECT_PUSH {
            return None;
        }
        let mut script = vec![OP_RETURN];
        script.push(data.len() as u8);
        script.extend_from_slice(data);
        Some(Script(script))
    }

    /// Append a direct data push
    pub fn push_slice(&mut self, data: &[u8]) -> Option<()> {
        if data.len() > MAX_DIRECT_PUSH {
            return None;
        }
        self.0.push(data.len() as u8);
        self.0.extend_from_slice(data);
        Some(())
    }

    /// Split a push-only script into its pushed items
    pub fn pushes(&self) -> Option<Vec<&[u8]>> {
        let mut items = Vec::new();
        let mut rest = self.0.as_slice();
        while let Some((&len, tail)) = rest.split_first() {
            let len = usize::from(len);
            if len == 0 || len > MAX_DIRECT_PUSH || tail.len() < len {
                return None;
            }
            let (item, tail) = tail.split_at(len);
            items.push(item);
            rest = tail;
        }
        Some(items)
    }

    pub fn solve(&self) -> Option<ScriptTemplate> {
        match self.0.as_slice() {
            [OP_DUP, OP_HASH160, 20, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
                let mut id = [0u8; 20];
                id.copy_from_slice(hash);
                Some(ScriptTemplate::PubKeyHash(KeyId(id)))
            }
            [OP_RETURN, len, data @ ..] if usize::from(*len) == data.len() && data.len() <= MAX_DIRECT_PUSH => {
                Some(ScriptTemplate::NullData)
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p2pkh_solves() {
        let id = KeyId::from_pubkey(&[2u8; 33]);
        let script = Script::p2pkh(&id);
        assert_eq!(script.len(), 25);
        assert_eq!(script.solve(), Some(ScriptTemplate::PubKeyHash(id)));
    }

    #[test]
    fn test_null_data_solves() {
        let script = Script::null_data(b"hello").unwrap();
        assert_eq!(script.solve(), Some(ScriptTemplate::NullData));
        assert!(Script::null_data(&[0u8; 76]).is_none());
    }

    #[test]
    fn test_nonstandard_rejected() {
        assert_eq!(Script(vec![OP_CHECKSIG]).solve(), None);
        assert_eq!(Script::new().solve(), None);
    }

    #[test]
    fn test_pushes() {
        let mut script = Script::new();
        script.push_slice(&[1u8; 65]).unwrap();
        script.push_slice(&[2u8; 33]).unwrap();
        let items = script.pushes().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], &[1u8; 65][..]);
        assert_eq!(items[1], &[2u8; 33][..]);

        assert!(Script(vec![5, 1, 2]).pushes().is_none());
    }
}
