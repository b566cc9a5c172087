//! Nullifier Set for Double-Spend Prevention
//!
//! Once a note is spent, its nullifier is added to this set.
//! Any attempt to spend with the same nullifier is rejected.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::crypto::note::Nullifier;
use crate::error::{ValidationError, ValidationResult};

/// Sorted list of revealed nullifiers
#[derive(Clone, Debug, Default, BorshSerialize, BorshDeserialize)]
pub struct NullifierSet {
    nullifiers: Vec<Nullifier>,
}

impl NullifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a nullifier has been spent
    pub fn contains(&self, nullifier: &Nullifier) -> bool {
        self.nullifiers.binary_search(nullifier).is_ok()
    }

    /// Add a nullifier; errors if it was already revealed
    pub fn insert(&mut self, nullifier: Nullifier) -> ValidationResult<()> {
        match self.nullifiers.binary_search(&nullifier) {
            Ok(_) => Err(ValidationError::NullifierAlreadySpent),
            Err(pos) => {
                self.nullifiers.insert(pos, nullifier);
                Ok(())
            }
        }
    }

    /// Add every nullifier of one transaction, or none of them
    pub fn insert_all(&mut self, nullifiers: &[Nullifier]) -> ValidationResult<()> {
        for (i, nf) in nullifiers.iter().enumerate() {
            if self.contains(nf) {
                return Err(ValidationError::NullifierAlreadySpent);
            }
            if nullifiers[..i].contains(nf) {
                return Err(ValidationError::DuplicateNullifier);
            }
        }
        for nf in nullifiers {
            self.insert(*nf)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nullifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nullifiers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Nullifier> {
        self.nullifiers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set() {
        let set = NullifierSet::new();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_double_spend_rejected() {
        let mut set = NullifierSet::new();
        set.insert(Nullifier([2u8; 32])).unwrap();
        set.insert(Nullifier([1u8; 32])).unwrap();

        assert!(set.contains(&Nullifier([1u8; 32])));
        assert_eq!(set.insert(Nullifier([1u8; 32])), Err(ValidationError::NullifierAlreadySpent));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_insert_all_is_atomic() {
        let mut set = NullifierSet::new();
        set.insert(Nullifier([3u8; 32])).unwrap();

        let batch = [Nullifier([4u8; 32]), Nullifier([3u8; 32])];
        assert_eq!(set.insert_all(&batch), Err(ValidationError::NullifierAlreadySpent));
        assert!(!set.contains(&Nullifier([4u8; 32])));

        let dup = [Nullifier([5u8; 32]), Nullifier([5u8; 32])];
        assert_eq!(set.insert_all(&dup), Err(ValidationError::DuplicateNullifier));
        assert_eq!(set.len(), 1);
    }
}
